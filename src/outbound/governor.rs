//! # Outbound Rate Governor
//!
//! Tracks a `blocked_until` deadline per endpoint key. Calls made while an
//! endpoint is blocked wait for the deadline; a rate-limited response sets
//! the deadline, waits it out once and retries once.
//!
//! There is no queue: concurrent callers on the same key each observe the
//! shared deadline independently. Deadlines only ever move forward.

use crate::config::RateGovernorConfig;
use crate::outbound::RateLimitSignal;
use dashmap::DashMap;
use std::fmt::Display;
use std::future::Future;
use tokio::time::Instant;
use tracing::{debug, warn};

#[derive(Debug)]
pub struct RateGovernor {
    config: RateGovernorConfig,
    windows: DashMap<String, Instant>,
}

impl RateGovernor {
    pub fn new(config: RateGovernorConfig) -> Self {
        Self {
            config,
            windows: DashMap::new(),
        }
    }

    /// Run `operation` against `endpoint`, honouring and maintaining its rate window
    pub async fn execute<T, E, F, Fut>(&self, endpoint: &str, operation: F) -> Result<T, E>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: RateLimitSignal + Display,
    {
        self.wait_for_window(endpoint).await;

        let error = match operation().await {
            Ok(value) => {
                self.clear_window(endpoint);
                return Ok(value);
            }
            Err(e) if e.is_rate_limited() => e,
            Err(e) => return Err(e),
        };

        let wait = error.retry_after().unwrap_or_else(|| self.config.default_wait());
        let until = self.extend_window(endpoint, Instant::now() + wait);
        warn!(
            endpoint = endpoint,
            wait_ms = wait.as_millis() as u64,
            error = %error,
            "Rate limited, waiting before single retry"
        );
        tokio::time::sleep_until(until).await;

        match operation().await {
            Ok(value) => {
                self.clear_window(endpoint);
                Ok(value)
            }
            Err(e) => {
                warn!(endpoint = endpoint, error = %e, "Retry after rate limit failed");
                Err(e)
            }
        }
    }

    async fn wait_for_window(&self, endpoint: &str) {
        let Some(until) = self.blocked_until(endpoint) else {
            return;
        };
        if until > Instant::now() {
            debug!(
                endpoint = endpoint,
                wait_ms = (until - Instant::now()).as_millis() as u64,
                "Endpoint blocked, waiting"
            );
            tokio::time::sleep_until(until).await;
        }
    }

    /// Move the endpoint's deadline to `until` unless it is already later;
    /// returns the deadline now in effect
    fn extend_window(&self, endpoint: &str, until: Instant) -> Instant {
        let mut entry = self
            .windows
            .entry(endpoint.to_string())
            .or_insert(until);
        if until > *entry {
            *entry = until;
        }
        *entry
    }

    /// Drop the window once it has passed; a deadline set by a concurrent
    /// caller that is still in the future is kept
    fn clear_window(&self, endpoint: &str) {
        let now = Instant::now();
        self.windows.remove_if(endpoint, |_, until| *until <= now);
    }

    /// Current deadline for an endpoint, if one is recorded
    pub fn blocked_until(&self, endpoint: &str) -> Option<Instant> {
        self.windows.get(endpoint).map(|entry| *entry.value())
    }

    pub fn is_blocked(&self, endpoint: &str) -> bool {
        self.blocked_until(endpoint)
            .is_some_and(|until| until > Instant::now())
    }

    /// Endpoints whose deadline is still in the future
    pub fn active_windows(&self) -> usize {
        let now = Instant::now();
        self.windows
            .iter()
            .filter(|entry| *entry.value() > now)
            .count()
    }
}

impl Default for RateGovernor {
    fn default() -> Self {
        Self::new(RateGovernorConfig::default())
    }
}
