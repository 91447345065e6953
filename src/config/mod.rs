//! # Resilience Configuration
//!
//! Every knob the executor, caches and rate governor read lives here. All
//! sections are defaulted, so an empty file (or no file at all) yields a
//! working configuration; [`ConfigLoader`] layers a TOML file and
//! `RESILIENCE__*` environment variables on top of those defaults.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use resilience_core::config::ConfigLoader;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigLoader::load(Some(Path::new("config/resilience.toml")))?;
//! let threshold = config.executor.failure_threshold;
//! let reset = config.executor.reset_timeout();
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigLoader;

/// Root configuration for the resilience subsystem
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ResilienceConfig {
    /// Circuit breaker, recovery and error-spike settings
    pub executor: ExecutorConfig,

    /// Tier-1 cache settings
    pub tiered_cache: TieredCacheConfig,

    /// Tier-2 (Redis with local fallback) settings
    pub distributed_cache: DistributedCacheConfig,

    /// Outbound rate governor settings
    pub rate_governor: RateGovernorConfig,
}

impl ResilienceConfig {
    /// Validate every section, returning the first violation found
    pub fn validate(&self) -> ConfigResult<()> {
        self.executor.validate()?;
        self.tiered_cache.validate()?;
        self.distributed_cache.validate()?;
        self.rate_governor.validate()?;
        Ok(())
    }
}

/// Resilient executor configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Consecutive failures before a label's circuit opens
    pub failure_threshold: u32,

    /// Time an open circuit waits (from the last failure) before a half-open probe
    pub reset_timeout_ms: u64,

    /// Successful calls slower than this are logged as slow operations
    pub slow_operation_threshold_ms: u64,

    /// Errors inside the spike window above this count trigger an operator alert
    pub spike_threshold: usize,

    /// Trailing window the spike check counts errors in
    pub spike_window_seconds: u64,

    /// How often the background spike monitor runs
    pub spike_check_interval_seconds: u64,

    /// Maximum error records retained for spike detection
    pub error_history_capacity: usize,

    /// Register the built-in recovery strategies on construction
    pub register_default_strategies: bool,

    /// Delay before retrying a storage-busy failure
    pub storage_busy_retry_delay_ms: u64,

    /// Delay before retrying a network-reset or upstream 5xx failure
    pub transient_retry_delay_ms: u64,
}

impl ExecutorConfig {
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }

    pub fn slow_operation_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_operation_threshold_ms)
    }

    pub fn spike_window(&self) -> Duration {
        Duration::from_secs(self.spike_window_seconds)
    }

    pub fn spike_check_interval(&self) -> Duration {
        Duration::from_secs(self.spike_check_interval_seconds)
    }

    pub fn storage_busy_retry_delay(&self) -> Duration {
        Duration::from_millis(self.storage_busy_retry_delay_ms)
    }

    pub fn transient_retry_delay(&self) -> Duration {
        Duration::from_millis(self.transient_retry_delay_ms)
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> ConfigResult<()> {
        if self.failure_threshold == 0 || self.failure_threshold > 100 {
            return Err(ConfigurationError::invalid_value(
                "executor.failure_threshold",
                self.failure_threshold.to_string(),
                "must be between 1 and 100",
            ));
        }

        if self.reset_timeout_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "executor.reset_timeout_ms",
                "0",
                "must be greater than 0",
            ));
        }

        if self.spike_check_interval_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "executor.spike_check_interval_seconds",
                "0",
                "must be greater than 0",
            ));
        }

        if self.error_history_capacity == 0 {
            return Err(ConfigurationError::invalid_value(
                "executor.error_history_capacity",
                "0",
                "must be greater than 0",
            ));
        }

        Ok(())
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout_ms: 60_000,
            slow_operation_threshold_ms: 3_000,
            spike_threshold: 10,
            spike_window_seconds: 300,
            spike_check_interval_seconds: 300,
            error_history_capacity: 1_000,
            register_default_strategies: true,
            storage_busy_retry_delay_ms: 100,
            transient_retry_delay_ms: 500,
        }
    }
}

/// Tier-1 (process-local) cache configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TieredCacheConfig {
    /// TTL used by `TieredCache::default_options`
    pub default_ttl_seconds: u64,

    /// Whether the distributed tier is consulted when callers don't say otherwise
    pub use_second_tier: bool,

    /// Interval of the background sweep removing expired tier-1 entries
    pub purge_interval_seconds: u64,

    /// Tier-1 capacity; least recently used entries are evicted beyond it
    pub max_entries: u64,
}

impl TieredCacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_seconds)
    }

    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.purge_interval_seconds)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.default_ttl_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "tiered_cache.default_ttl_seconds",
                "0",
                "must be greater than 0",
            ));
        }
        if self.purge_interval_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "tiered_cache.purge_interval_seconds",
                "0",
                "must be greater than 0",
            ));
        }
        if self.max_entries == 0 {
            return Err(ConfigurationError::invalid_value(
                "tiered_cache.max_entries",
                "0",
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}

impl Default for TieredCacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_seconds: 300,
            use_second_tier: true,
            purge_interval_seconds: 60,
            max_entries: 10_000,
        }
    }
}

/// Distributed cache adapter configuration
///
/// `url` is the only required input for distributed operation. When it is
/// absent the adapter stays in degraded (local-only) mode for its lifetime.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DistributedCacheConfig {
    /// Redis connection URL, e.g. `redis://localhost:6379/0`
    pub url: Option<String>,

    /// Per-attempt connection timeout
    pub connect_timeout_ms: u64,

    /// Reconnection attempts after a connection error before giving up for good
    pub max_reconnect_attempts: u32,

    /// Backoff step added per reconnection attempt
    pub reconnect_base_delay_ms: u64,

    /// Backoff cap
    pub reconnect_max_delay_ms: u64,

    /// Capacity of the local fallback store
    pub local_max_entries: u64,
}

impl DistributedCacheConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Capped linear backoff for the given (1-based) reconnection attempt
    pub fn reconnect_delay(&self, attempt: u32) -> Duration {
        let delay = self
            .reconnect_base_delay_ms
            .saturating_mul(u64::from(attempt))
            .min(self.reconnect_max_delay_ms);
        Duration::from_millis(delay)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(url) = &self.url {
            if url.trim().is_empty() {
                return Err(ConfigurationError::invalid_value(
                    "distributed_cache.url",
                    "",
                    "must not be empty when set; omit it to run in local-only mode",
                ));
            }
        }
        if self.connect_timeout_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "distributed_cache.connect_timeout_ms",
                "0",
                "must be greater than 0",
            ));
        }
        if self.reconnect_base_delay_ms > self.reconnect_max_delay_ms {
            return Err(ConfigurationError::invalid_value(
                "distributed_cache.reconnect_base_delay_ms",
                self.reconnect_base_delay_ms.to_string(),
                "must not exceed reconnect_max_delay_ms",
            ));
        }
        if self.local_max_entries == 0 {
            return Err(ConfigurationError::invalid_value(
                "distributed_cache.local_max_entries",
                "0",
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}

impl Default for DistributedCacheConfig {
    fn default() -> Self {
        Self {
            url: None,
            connect_timeout_ms: 5_000,
            max_reconnect_attempts: 10,
            reconnect_base_delay_ms: 50,
            reconnect_max_delay_ms: 2_000,
            local_max_entries: 10_000,
        }
    }
}

/// Outbound rate governor configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RateGovernorConfig {
    /// Wait applied when a rate-limited response carries no retry-after hint
    pub default_wait_ms: u64,
}

impl RateGovernorConfig {
    pub fn default_wait(&self) -> Duration {
        Duration::from_millis(self.default_wait_ms)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.default_wait_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "rate_governor.default_wait_ms",
                "0",
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}

impl Default for RateGovernorConfig {
    fn default() -> Self {
        Self {
            default_wait_ms: 5_000,
        }
    }
}
