#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Resilience Core
//!
//! Failure protection, caching and outbound rate governing for a bot's
//! command pipeline.
//!
//! ## Components
//!
//! - **[`resilience::ResilientExecutor`]**: runs command logic behind per-label
//!   circuit breakers, applies recovery strategies and returns structured outcomes
//! - **[`cache::TieredCache`]**: local + distributed read-through cache in front
//!   of the system of record
//! - **[`cache::DistributedCache`]**: Redis-backed tier 2 that degrades to a
//!   local store when Redis is missing or down
//! - **[`outbound::RateGovernor`]**: per-endpoint `blocked_until` windows for
//!   rate-limited external APIs
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use resilience_core::cache::{DistributedCache, TieredCache};
//! use resilience_core::config::ConfigLoader;
//! use resilience_core::logging::init_structured_logging;
//! use resilience_core::outbound::RateGovernor;
//! use resilience_core::resilience::{ResilientExecutor, TracingAlertSink, TracingAuditSink};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! init_structured_logging();
//! let config = ConfigLoader::load(None)?;
//!
//! let executor = Arc::new(ResilientExecutor::new(
//!     config.executor.clone(),
//!     Arc::new(TracingAuditSink),
//!     Arc::new(TracingAlertSink),
//! ));
//! let _spike_monitor = executor.spawn_spike_monitor();
//!
//! let tier2 = DistributedCache::new(config.distributed_cache.clone());
//! tier2.connect().await;
//! let cache = Arc::new(TieredCache::new(config.tiered_cache.clone(), tier2));
//! let _purger = cache.spawn_purge_task();
//!
//! let governor = RateGovernor::new(config.rate_governor.clone());
//! # let _ = governor;
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - `cache-redis` (default): Redis backend for the distributed cache
//! - `postgres` (default): [`resilience::PgAuditSink`] writing to `error_logs`
//! - `test-services`: tests that need a live Redis at `REDIS_URL`

pub mod cache;
pub mod config;
pub mod error;
pub mod logging;
pub mod outbound;
pub mod resilience;

pub use cache::{CacheError, CacheOptions, CacheStats, DistributedCache, TieredCache};
pub use config::{ConfigLoader, ConfigurationError, ResilienceConfig};
pub use error::{ResilienceError, Result};
pub use outbound::{OutboundError, RateGovernor, RateLimitSignal};
pub use resilience::{
    CircuitState, ErrorKind, ExecutionOutcome, ExecutorError, ExecutorStats, OperationError,
    RecoveryStrategy, ResilientExecutor,
};
