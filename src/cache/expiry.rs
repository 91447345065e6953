//! Per-entry time-to-live for the in-process moka caches.
//!
//! Moka's builder-level `time_to_live` applies one ttl to every entry; the
//! cache tiers here need the ttl chosen by each write, so values carry it.

use moka::Expiry;
use std::time::{Duration, Instant};

/// A cached value together with the ttl it was written with
#[derive(Debug, Clone)]
pub(crate) struct Expiring<V> {
    pub value: V,
    pub ttl: Duration,
}

impl<V> Expiring<V> {
    pub fn new(value: V, ttl: Duration) -> Self {
        Self { value, ttl }
    }
}

/// Expires each entry `ttl` after its most recent write
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct PerEntryTtl;

impl<K, V> Expiry<K, Expiring<V>> for PerEntryTtl {
    fn expire_after_create(&self, _key: &K, value: &Expiring<V>, _created_at: Instant) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &K,
        value: &Expiring<V>,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Build a bounded moka cache that honours [`Expiring::ttl`]
pub(crate) fn ttl_cache<V>(max_capacity: u64) -> moka::future::Cache<String, Expiring<V>>
where
    V: Clone + Send + Sync + 'static,
{
    moka::future::Cache::builder()
        .max_capacity(max_capacity)
        .expire_after(PerEntryTtl)
        .build()
}
