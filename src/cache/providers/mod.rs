//! Cache provider implementations

pub mod local;
#[cfg(feature = "cache-redis")]
pub mod redis;

pub use local::LocalCacheStore;
#[cfg(feature = "cache-redis")]
pub use self::redis::{redact_url, RedisCacheService};
