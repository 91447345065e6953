//! # Distributed Cache Adapter
//!
//! Tier-2 storage for the tiered cache. Writes always land in a local
//! fallback store and, while Redis is connected, in Redis too. Reads prefer
//! Redis and fall back to the local store on any backend error.
//!
//! Backend failures never reach callers. A lost connection flips the adapter
//! into degraded mode and starts a bounded reconnect loop; once that loop
//! gives up the adapter stays local-only for the rest of the process.

use crate::cache::providers::LocalCacheStore;
#[cfg(feature = "cache-redis")]
use crate::cache::providers::{redact_url, RedisCacheService};
use crate::cache::traits::CacheService;
#[cfg(feature = "cache-redis")]
use crate::cache::CacheError;
use crate::config::DistributedCacheConfig;
#[cfg(feature = "cache-redis")]
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
#[cfg(feature = "cache-redis")]
use tracing::error;

#[derive(Debug)]
struct AdapterInner {
    config: DistributedCacheConfig,
    local: LocalCacheStore,
    #[cfg(feature = "cache-redis")]
    backend: RwLock<Option<RedisCacheService>>,
    enabled: AtomicBool,
    reconnecting: AtomicBool,
    reconnect_attempts: AtomicU32,
    /// Set once reconnection gave up or `disconnect` was called
    permanently_degraded: AtomicBool,
}

#[derive(Debug, Clone)]
pub struct DistributedCache {
    inner: Arc<AdapterInner>,
}

impl DistributedCache {
    pub fn new(config: DistributedCacheConfig) -> Self {
        let local = LocalCacheStore::new(config.local_max_entries);
        Self {
            inner: Arc::new(AdapterInner {
                config,
                local,
                #[cfg(feature = "cache-redis")]
                backend: RwLock::new(None),
                enabled: AtomicBool::new(false),
                reconnecting: AtomicBool::new(false),
                reconnect_attempts: AtomicU32::new(0),
                permanently_degraded: AtomicBool::new(false),
            }),
        }
    }

    /// Adapter that never talks to Redis
    pub fn local_only() -> Self {
        Self::new(DistributedCacheConfig::default())
    }

    /// Connect to Redis when a URL is configured; returns whether the adapter
    /// is now backed by Redis. A missing URL is not an error.
    pub async fn connect(&self) -> bool {
        let Some(url) = self.inner.config.url.clone() else {
            info!("No distributed cache endpoint configured, running in local-only mode");
            return false;
        };
        self.inner.permanently_degraded.store(false, Ordering::SeqCst);
        self.connect_to(&url).await
    }

    #[cfg(feature = "cache-redis")]
    async fn connect_to(&self, url: &str) -> bool {
        match RedisCacheService::connect(url, self.inner.config.connect_timeout()).await {
            Ok(service) => {
                *self.inner.backend.write() = Some(service);
                self.inner.reconnect_attempts.store(0, Ordering::SeqCst);
                self.inner.enabled.store(true, Ordering::SeqCst);
                info!(url = %redact_url(url), "Distributed cache connected");
                true
            }
            Err(e) => {
                warn!(url = %redact_url(url), error = %e, "Distributed cache unavailable, using local fallback");
                self.mark_disconnected();
                self.schedule_reconnect();
                false
            }
        }
    }

    #[cfg(not(feature = "cache-redis"))]
    async fn connect_to(&self, _url: &str) -> bool {
        warn!("Distributed cache URL configured but built without the cache-redis feature, using local fallback");
        false
    }

    /// Drop the Redis connection and stop reconnecting
    pub async fn disconnect(&self) {
        self.inner.permanently_degraded.store(true, Ordering::SeqCst);
        self.mark_disconnected();
        debug!("Distributed cache disconnected");
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    /// True once reconnection has given up (or after `disconnect`)
    pub fn is_permanently_degraded(&self) -> bool {
        self.inner.permanently_degraded.load(Ordering::SeqCst)
    }

    pub fn provider_name(&self) -> &'static str {
        #[cfg(feature = "cache-redis")]
        {
            if self.is_enabled() {
                return "redis";
            }
        }
        self.inner.local.provider_name()
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        #[cfg(feature = "cache-redis")]
        {
            if let Some(backend) = self.backend() {
                match backend.get(key).await {
                    Ok(value) => return value,
                    Err(e) => self.handle_backend_error("get", key, e),
                }
            }
        }
        self.inner.local.lookup(key).await
    }

    /// Local write always happens; Redis write is best effort
    pub async fn set(&self, key: &str, value: &str, ttl: Duration) {
        self.inner.local.insert(key, value, ttl).await;

        #[cfg(feature = "cache-redis")]
        {
            if let Some(backend) = self.backend() {
                if let Err(e) = backend.set(key, value, ttl).await {
                    self.handle_backend_error("set", key, e);
                }
            }
        }
    }

    pub async fn del(&self, key: &str) {
        #[cfg(feature = "cache-redis")]
        {
            if let Some(backend) = self.backend() {
                if let Err(e) = backend.delete(key).await {
                    self.handle_backend_error("del", key, e);
                }
            }
        }
        self.inner.local.remove(key).await;
    }

    pub async fn exists(&self, key: &str) -> bool {
        #[cfg(feature = "cache-redis")]
        {
            if let Some(backend) = self.backend() {
                match backend.exists(key).await {
                    Ok(found) => return found,
                    Err(e) => self.handle_backend_error("exists", key, e),
                }
            }
        }
        self.inner.local.contains(key).await
    }

    pub async fn flush(&self) {
        #[cfg(feature = "cache-redis")]
        {
            if let Some(backend) = self.backend() {
                if let Err(e) = backend.flush().await {
                    self.handle_backend_error("flush", "*", e);
                }
            }
        }
        self.inner.local.clear().await;
    }

    /// PING the backend; the local store is always healthy
    pub async fn health_check(&self) -> bool {
        #[cfg(feature = "cache-redis")]
        {
            if let Some(backend) = self.backend() {
                return match backend.health_check().await {
                    Ok(healthy) => healthy,
                    Err(e) => {
                        self.handle_backend_error("health_check", "-", e);
                        false
                    }
                };
            }
        }
        true
    }

    /// Entries held by the local fallback store
    pub async fn local_len(&self) -> u64 {
        self.inner.local.len().await
    }

    fn mark_disconnected(&self) {
        self.inner.enabled.store(false, Ordering::SeqCst);
        #[cfg(feature = "cache-redis")]
        {
            *self.inner.backend.write() = None;
        }
    }

    #[cfg(feature = "cache-redis")]
    fn backend(&self) -> Option<RedisCacheService> {
        if !self.is_enabled() {
            return None;
        }
        self.inner.backend.read().clone()
    }

    #[cfg(feature = "cache-redis")]
    fn handle_backend_error(&self, operation: &str, key: &str, err: CacheError) {
        if err.is_connection_loss() {
            warn!(operation = operation, key = key, error = %err, "Distributed cache connection lost, degrading to local store");
            self.mark_disconnected();
            self.schedule_reconnect();
        } else {
            debug!(operation = operation, key = key, error = %err, "Distributed cache operation failed, using local store");
        }
    }

    #[cfg(feature = "cache-redis")]
    fn schedule_reconnect(&self) {
        if self.is_permanently_degraded() {
            return;
        }
        if self.inner.reconnecting.swap(true, Ordering::SeqCst) {
            return;
        }

        let adapter = self.clone();
        tokio::spawn(async move {
            adapter.reconnect_loop().await;
            adapter.inner.reconnecting.store(false, Ordering::SeqCst);
        });
    }

    #[cfg(feature = "cache-redis")]
    async fn reconnect_loop(&self) {
        let Some(url) = self.inner.config.url.clone() else {
            return;
        };
        let max_attempts = self.inner.config.max_reconnect_attempts;

        loop {
            if self.is_permanently_degraded() || self.is_enabled() {
                return;
            }

            let attempt = self.inner.reconnect_attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt > max_attempts {
                self.inner.permanently_degraded.store(true, Ordering::SeqCst);
                error!(
                    attempts = max_attempts,
                    "Distributed cache reconnection abandoned, staying in local-only mode"
                );
                return;
            }

            let delay = self.inner.config.reconnect_delay(attempt);
            debug!(attempt = attempt, delay_ms = delay.as_millis() as u64, "Distributed cache reconnect scheduled");
            tokio::time::sleep(delay).await;

            match RedisCacheService::connect(&url, self.inner.config.connect_timeout()).await {
                Ok(service) => {
                    if self.is_permanently_degraded() {
                        return;
                    }
                    *self.inner.backend.write() = Some(service);
                    self.inner.reconnect_attempts.store(0, Ordering::SeqCst);
                    self.inner.enabled.store(true, Ordering::SeqCst);
                    info!(attempt = attempt, "Distributed cache reconnected");
                    return;
                }
                Err(e) => {
                    warn!(attempt = attempt, error = %e, "Distributed cache reconnect failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_only_set_get_respects_ttl() {
        let cache = DistributedCache::local_only();
        assert!(!cache.connect().await);
        assert!(!cache.is_enabled());
        assert_eq!(cache.provider_name(), "local");

        cache.set("user:1:2", "level-7", Duration::from_secs(1)).await;
        assert_eq!(cache.get("user:1:2").await.as_deref(), Some("level-7"));
        assert!(cache.exists("user:1:2").await);

        tokio::time::sleep(Duration::from_millis(1_100)).await;
        assert_eq!(cache.get("user:1:2").await, None);
        assert!(!cache.exists("user:1:2").await);
    }

    #[tokio::test]
    async fn test_del_and_flush_hit_local_store() {
        let cache = DistributedCache::local_only();
        cache.set("a", "1", Duration::from_secs(60)).await;
        cache.set("b", "2", Duration::from_secs(60)).await;

        cache.del("a").await;
        assert_eq!(cache.get("a").await, None);
        assert_eq!(cache.local_len().await, 1);

        cache.flush().await;
        assert_eq!(cache.local_len().await, 0);
        assert!(cache.health_check().await);
    }

    #[cfg(feature = "cache-redis")]
    #[tokio::test]
    async fn test_unreachable_backend_degrades() {
        let cache = DistributedCache::new(DistributedCacheConfig {
            url: Some("redis://127.0.0.1:1".to_string()),
            connect_timeout_ms: 500,
            max_reconnect_attempts: 0,
            ..DistributedCacheConfig::default()
        });

        assert!(!cache.connect().await);
        assert!(!cache.is_enabled());

        cache.set("config:42", "{}", Duration::from_secs(30)).await;
        assert_eq!(cache.get("config:42").await.as_deref(), Some("{}"));

        // Zero attempts allowed: the reconnect loop gives up immediately
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(cache.is_permanently_degraded());
    }

    #[tokio::test]
    async fn test_hot_key_rewrites_do_not_accumulate() {
        let cache = DistributedCache::local_only();
        for n in 0..10_000 {
            cache
                .set("meta:42", &n.to_string(), Duration::from_secs(1_800))
                .await;
        }
        assert_eq!(cache.local_len().await, 1);
        assert_eq!(cache.get("meta:42").await.as_deref(), Some("9999"));
    }

    #[tokio::test]
    async fn test_disconnect_is_permanent_until_connect() {
        let cache = DistributedCache::local_only();
        cache.disconnect().await;
        assert!(cache.is_permanently_degraded());
        assert!(!cache.is_enabled());
    }
}
