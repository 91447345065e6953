//! # Tiered Cache Coordinator
//!
//! Read-through cache in front of a system of record. Tier 1 is a bounded
//! moka cache of JSON values with per-entry ttl; tier 2 is the
//! [`DistributedCache`].
//! A miss on both tiers calls the caller's fetch function, whose error is
//! returned untouched.

use crate::cache::expiry::{ttl_cache, Expiring};
use crate::cache::DistributedCache;
use crate::config::TieredCacheConfig;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// Per-call cache settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheOptions {
    pub ttl: Duration,
    pub use_second_tier: bool,
}

impl CacheOptions {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            use_second_tier: true,
        }
    }

    /// Skip the distributed tier for this call
    pub fn tier1_only(ttl: Duration) -> Self {
        Self {
            ttl,
            use_second_tier: false,
        }
    }
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self::new(Duration::from_secs(300))
    }
}

/// Hit/miss counters split by tier
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub tier1_hits: u64,
    pub tier2_hits: u64,
    pub misses: u64,
    pub tier1_entries: u64,
    /// Hits over lookups, 0.0 before the first lookup
    pub hit_rate: f64,
}

#[derive(Debug, Default)]
struct CacheCounters {
    tier1_hits: AtomicU64,
    tier2_hits: AtomicU64,
    misses: AtomicU64,
}

pub struct TieredCache {
    config: TieredCacheConfig,
    tier1: moka::future::Cache<String, Expiring<serde_json::Value>>,
    tier2: DistributedCache,
    counters: CacheCounters,
}

impl std::fmt::Debug for TieredCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TieredCache")
            .field("config", &self.config)
            .field("tier1_entries", &self.tier1.entry_count())
            .field("tier2", &self.tier2)
            .finish_non_exhaustive()
    }
}

impl TieredCache {
    pub fn new(config: TieredCacheConfig, tier2: DistributedCache) -> Self {
        Self {
            tier1: ttl_cache(config.max_entries),
            config,
            tier2,
            counters: CacheCounters::default(),
        }
    }

    /// Options using the configured default ttl
    pub fn default_options(&self) -> CacheOptions {
        CacheOptions {
            ttl: self.config.default_ttl(),
            use_second_tier: self.config.use_second_tier,
        }
    }

    pub fn second_tier(&self) -> &DistributedCache {
        &self.tier2
    }

    /// Look `key` up in tier 1, then tier 2, then call `fetch`.
    ///
    /// `Ok(None)` from `fetch` is returned as-is and never cached.
    pub async fn get<T, E, F, Fut>(
        &self,
        key: &str,
        fetch: F,
        options: CacheOptions,
    ) -> Result<Option<T>, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        if let Some(value) = self.tier1_get::<T>(key).await {
            self.counters.tier1_hits.fetch_add(1, Ordering::Relaxed);
            debug!(key = key, "Tier-1 hit");
            return Ok(Some(value));
        }

        let use_second_tier = options.use_second_tier && self.config.use_second_tier;

        if use_second_tier {
            if let Some(raw) = self.tier2.get(key).await {
                match serde_json::from_str::<serde_json::Value>(&raw) {
                    Ok(json) => match serde_json::from_value::<T>(json.clone()) {
                        Ok(value) => {
                            self.tier1_put(key, json, options.ttl).await;
                            self.counters.tier2_hits.fetch_add(1, Ordering::Relaxed);
                            debug!(key = key, "Tier-2 hit");
                            return Ok(Some(value));
                        }
                        Err(e) => {
                            warn!(key = key, error = %e, "Tier-2 value has unexpected shape, treating as miss")
                        }
                    },
                    Err(e) => warn!(key = key, error = %e, "Tier-2 value is not valid JSON, treating as miss"),
                }
            }
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        debug!(key = key, "Cache miss, fetching from source");

        let fetched = fetch().await?;
        let Some(value) = fetched else {
            return Ok(None);
        };

        match serde_json::to_value(&value) {
            Ok(json) => {
                if use_second_tier {
                    match serde_json::to_string(&json) {
                        Ok(raw) => self.tier2.set(key, &raw, options.ttl).await,
                        Err(e) => warn!(key = key, error = %e, "Failed to encode tier-2 value"),
                    }
                }
                self.tier1_put(key, json, options.ttl).await;
            }
            Err(e) => warn!(key = key, error = %e, "Fetched value not cacheable"),
        }

        Ok(Some(value))
    }

    async fn tier1_get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let entry = self.tier1.get(key).await?;
        match serde_json::from_value(entry.value) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!(key = key, error = %e, "Tier-1 value has unexpected shape, evicting");
                self.tier1.invalidate(key).await;
                None
            }
        }
    }

    async fn tier1_put(&self, key: &str, value: serde_json::Value, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }
        self.tier1
            .insert(key.to_string(), Expiring::new(value, ttl))
            .await;
    }

    /// Remove `key` from tier 1 and, best effort, tier 2
    pub async fn invalidate(&self, key: &str) {
        self.tier1.invalidate(key).await;
        self.tier2.del(key).await;
        debug!(key = key, "Cache invalidated");
    }

    /// Remove every tier-1 key containing `pattern`.
    ///
    /// Tier 2 is not scanned; matching entries there age out by ttl.
    pub async fn invalidate_pattern(&self, pattern: &str) -> usize {
        let keys: Vec<Arc<String>> = self
            .tier1
            .iter()
            .filter(|(key, _)| key.contains(pattern))
            .map(|(key, _)| key)
            .collect();

        for key in &keys {
            self.tier1.invalidate(key.as_str()).await;
        }
        debug!(pattern = pattern, removed = keys.len(), "Cache pattern invalidated");
        keys.len()
    }

    /// Reclaim expired tier-1 entries; returns the live entry count afterwards
    pub async fn purge_expired(&self) -> u64 {
        self.tier1.run_pending_tasks().await;
        self.tier1.entry_count()
    }

    /// Empty tier 1
    pub async fn clear(&self) {
        self.tier1.invalidate_all();
        self.tier1.run_pending_tasks().await;
    }

    /// Counters plus the current tier-1 size
    pub async fn stats(&self) -> CacheStats {
        let tier1_entries = self.purge_expired().await;
        let tier1_hits = self.counters.tier1_hits.load(Ordering::Relaxed);
        let tier2_hits = self.counters.tier2_hits.load(Ordering::Relaxed);
        let misses = self.counters.misses.load(Ordering::Relaxed);
        let lookups = tier1_hits + tier2_hits + misses;

        CacheStats {
            tier1_hits,
            tier2_hits,
            misses,
            tier1_entries,
            hit_rate: if lookups > 0 {
                (tier1_hits + tier2_hits) as f64 / lookups as f64
            } else {
                0.0
            },
        }
    }

    /// Purge expired tier-1 entries on the configured interval until the
    /// cache is dropped
    pub fn spawn_purge_task(self: &Arc<Self>) -> JoinHandle<()> {
        let cache: Weak<Self> = Arc::downgrade(self);
        let period = self.config.purge_interval().max(Duration::from_secs(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else {
                    break;
                };
                let live = cache.purge_expired().await;
                debug!(tier1_entries = live, "Tier-1 maintenance pass");
            }
        })
    }
}
