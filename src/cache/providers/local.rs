//! Process-local cache store using Moka
//!
//! Backs the distributed cache adapter when Redis is unavailable. Each entry
//! expires after the ttl it was written with; a rewrite restarts its clock.
//! Expired entries are never returned, and moka's housekeeping reclaims them.

use crate::cache::errors::CacheResult;
use crate::cache::expiry::{ttl_cache, Expiring};
use crate::cache::traits::CacheService;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_LOCAL_CAPACITY: u64 = 10_000;

#[derive(Clone)]
pub struct LocalCacheStore {
    cache: moka::future::Cache<String, Expiring<String>>,
}

impl std::fmt::Debug for LocalCacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalCacheStore")
            .field("max_capacity", &self.cache.policy().max_capacity())
            .field("entry_count", &self.cache.entry_count())
            .finish()
    }
}

impl Default for LocalCacheStore {
    fn default() -> Self {
        Self::new(DEFAULT_LOCAL_CAPACITY)
    }
}

impl LocalCacheStore {
    pub fn new(max_capacity: u64) -> Self {
        debug!(max_capacity = max_capacity, "Local cache store created");
        Self {
            cache: ttl_cache(max_capacity),
        }
    }

    pub async fn lookup(&self, key: &str) -> Option<String> {
        self.cache.get(key).await.map(|entry| entry.value)
    }

    /// Store `value` for `ttl`; a zero ttl removes the key instead
    pub async fn insert(&self, key: &str, value: &str, ttl: Duration) {
        if ttl.is_zero() {
            self.cache.invalidate(key).await;
            return;
        }
        self.cache
            .insert(key.to_string(), Expiring::new(value.to_string(), ttl))
            .await;
    }

    pub async fn remove(&self, key: &str) {
        self.cache.invalidate(key).await;
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.cache.get(key).await.is_some()
    }

    pub async fn clear(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
    }

    /// Live entry count, after applying pending evictions
    pub async fn len(&self) -> u64 {
        self.cache.run_pending_tasks().await;
        self.cache.entry_count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl CacheService for LocalCacheStore {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        Ok(self.lookup(key).await)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        self.insert(key, value, ttl).await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.remove(key).await;
        Ok(())
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        Ok(self.contains(key).await)
    }

    async fn flush(&self) -> CacheResult<()> {
        self.clear().await;
        Ok(())
    }

    async fn health_check(&self) -> CacheResult<bool> {
        Ok(true)
    }

    fn provider_name(&self) -> &'static str {
        "local"
    }
}
