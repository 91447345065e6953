//! Cache service trait definition

use super::errors::CacheResult;
use std::time::Duration;

/// Key/value operations shared by the Redis backend and the local fallback store
///
/// Values are opaque strings; typed encoding happens in the tiered cache.
pub trait CacheService: Send + Sync {
    /// Returns `Ok(Some(value))` on hit, `Ok(None)` on miss
    fn get(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = CacheResult<Option<String>>> + Send;

    /// Set a value that expires after `ttl`
    fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> impl std::future::Future<Output = CacheResult<()>> + Send;

    fn delete(&self, key: &str) -> impl std::future::Future<Output = CacheResult<()>> + Send;

    fn exists(&self, key: &str) -> impl std::future::Future<Output = CacheResult<bool>> + Send;

    /// Remove every key
    fn flush(&self) -> impl std::future::Future<Output = CacheResult<()>> + Send;

    /// Check if the cache backend is healthy
    fn health_check(&self) -> impl std::future::Future<Output = CacheResult<bool>> + Send;

    /// Get the name of the cache provider
    fn provider_name(&self) -> &'static str;
}
