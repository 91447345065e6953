//! # Resilience Module
//!
//! Failure protection for command and feature code. A [`ResilientExecutor`]
//! runs each unit of work behind a per-label circuit breaker, records and
//! audits failures, applies pattern-matched recovery strategies and maps
//! whatever is left to a small set of user-facing messages.
//!
//! ## Architecture
//!
//! - **Circuit Breakers**: one per label, created on first failure
//! - **Recovery Strategies**: ordered handlers that may request one retry
//! - **Error History**: bounded failure log feeding spike detection
//! - **Sinks**: audit rows and operator alerts, both best effort
//!
//! ## Usage
//!
//! ```rust,no_run
//! use resilience_core::config::ExecutorConfig;
//! use resilience_core::resilience::{
//!     ChannelAlertSink, OperationError, ResilientExecutor, TracingAuditSink,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() {
//! let (alerts, mut alert_rx) = ChannelAlertSink::new();
//! let executor = Arc::new(ResilientExecutor::new(
//!     ExecutorConfig::default(),
//!     Arc::new(TracingAuditSink),
//!     Arc::new(alerts),
//! ));
//! let _monitor = executor.spawn_spike_monitor();
//!
//! let outcome = executor
//!     .wrap(
//!         "ban_command",
//!         || async { Err::<(), _>(OperationError::from("Missing permission: BAN_MEMBERS")) },
//!         None,
//!     )
//!     .await;
//! assert!(!outcome.is_success());
//! # }
//! ```

pub mod alerts;
pub mod audit;
pub mod circuit_breaker;
pub mod classification;
pub mod executor;
pub mod history;
pub mod manager;
pub mod metrics;
pub mod recovery;

pub use alerts::{AlertError, AlertSink, ChannelAlertSink, TracingAlertSink};
#[cfg(feature = "postgres")]
pub use audit::PgAuditSink;
pub use audit::{AuditEntry, AuditError, AuditSink, TracingAuditSink};
pub use circuit_breaker::{
    Admission, CircuitBreaker, CircuitBreakerConfig, CircuitState, ProbeGuard,
};
pub use classification::{
    ErrorClass, ErrorKind, OperationError, CIRCUIT_OPEN_MESSAGE, GENERIC_MESSAGE,
    NOT_FOUND_MESSAGE, PERMISSION_MESSAGE, RATE_LIMIT_MESSAGE, STORAGE_BUSY_MESSAGE,
    TIMEOUT_MESSAGE,
};
pub use executor::{ExecutionOutcome, ExecutorError, ResilientExecutor};
pub use history::{ErrorHistory, ErrorRecord, SpikeReport};
pub use manager::CircuitBreakerRegistry;
pub use metrics::{CircuitBreakerMetrics, ExecutorStats};
pub use recovery::{
    default_strategies, MatchPattern, RecoveryContext, RecoveryHandler, RecoveryOutcome,
    RecoveryStrategy,
};
