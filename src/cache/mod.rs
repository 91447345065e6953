//! # Cache Module
//!
//! Two-tier read-through caching for domain reads.
//!
//! ## Architecture
//!
//! ```text
//! TieredCache                    <- tier 1: moka cache of JSON values
//!   └── DistributedCache         <- tier 2: Redis with local fallback
//!         ├── RedisCacheService  <- multiplexed async connection (cache-redis)
//!         └── LocalCacheStore    <- moka store with per-entry ttl, always written
//! ```
//!
//! ## Failure Behaviour
//!
//! - **Source-of-truth errors propagate**: a failing fetch is returned to the caller
//! - **Backend errors never do**: Redis problems degrade to the local store
//! - **Bounded reconnection**: capped backoff, then local-only for the process lifetime

pub mod accessors;
pub mod distributed;
pub mod errors;
mod expiry;
pub mod providers;
pub mod tiered;
pub mod traits;

pub use distributed::DistributedCache;
pub use errors::{CacheError, CacheResult};
pub use providers::LocalCacheStore;
pub use tiered::{CacheOptions, CacheStats, TieredCache};
pub use traits::CacheService;

#[cfg(feature = "cache-redis")]
pub use providers::RedisCacheService;
