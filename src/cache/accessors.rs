//! Fixed-ttl accessors for the data the command layer reads most often.
//!
//! Each accessor is `get` with a canonical key and a ttl matched to how
//! quickly that data changes.

use crate::cache::{CacheOptions, TieredCache};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::time::Duration;

pub const GUILD_CONFIG_TTL: Duration = Duration::from_secs(600);
pub const USER_DATA_TTL: Duration = Duration::from_secs(180);
pub const SECURITY_CONFIG_TTL: Duration = Duration::from_secs(900);
pub const VOLATILE_COUNTER_TTL: Duration = Duration::from_secs(60);
pub const METADATA_TTL: Duration = Duration::from_secs(1800);

pub fn guild_config_key(guild_id: &str) -> String {
    format!("config:{guild_id}")
}

pub fn user_data_key(guild_id: &str, user_id: &str) -> String {
    format!("user:{guild_id}:{user_id}")
}

pub fn security_config_key(guild_id: &str) -> String {
    format!("security:{guild_id}")
}

pub fn volatile_counter_key(name: &str) -> String {
    format!("counter:{name}")
}

pub fn metadata_key(guild_id: &str) -> String {
    format!("meta:{guild_id}")
}

impl TieredCache {
    /// Guild configuration snapshot
    pub async fn guild_config<T, E, F, Fut>(&self, guild_id: &str, fetch: F) -> Result<Option<T>, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        self.get(&guild_config_key(guild_id), fetch, CacheOptions::new(GUILD_CONFIG_TTL))
            .await
    }

    /// Per-member data such as levels and warning counts
    pub async fn user_data<T, E, F, Fut>(
        &self,
        guild_id: &str,
        user_id: &str,
        fetch: F,
    ) -> Result<Option<T>, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        self.get(
            &user_data_key(guild_id, user_id),
            fetch,
            CacheOptions::new(USER_DATA_TTL),
        )
        .await
    }

    pub async fn security_config<T, E, F, Fut>(
        &self,
        guild_id: &str,
        fetch: F,
    ) -> Result<Option<T>, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        self.get(
            &security_config_key(guild_id),
            fetch,
            CacheOptions::new(SECURITY_CONFIG_TTL),
        )
        .await
    }

    /// Short-lived counters, kept out of the distributed tier
    pub async fn volatile_counter<T, E, F, Fut>(&self, name: &str, fetch: F) -> Result<Option<T>, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        self.get(
            &volatile_counter_key(name),
            fetch,
            CacheOptions::tier1_only(VOLATILE_COUNTER_TTL),
        )
        .await
    }

    pub async fn metadata<T, E, F, Fut>(&self, guild_id: &str, fetch: F) -> Result<Option<T>, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        self.get(&metadata_key(guild_id), fetch, CacheOptions::new(METADATA_TTL))
            .await
    }

    /// Drop every cached entry scoped to a guild.
    ///
    /// Fixed keys are removed from both tiers; per-member entries are
    /// removed from tier 1 only.
    pub async fn invalidate_guild(&self, guild_id: &str) -> usize {
        self.invalidate(&guild_config_key(guild_id)).await;
        self.invalidate(&security_config_key(guild_id)).await;
        self.invalidate(&metadata_key(guild_id)).await;
        self.invalidate_pattern(&format!("user:{guild_id}:")).await
    }
}
