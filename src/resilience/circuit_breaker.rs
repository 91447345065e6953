//! # Circuit Breaker Implementation
//!
//! One breaker per command/feature label. Three states:
//! Closed (normal operation), Open (failing fast), and Half-Open (one probe
//! call decides whether to close or re-open).
//!
//! The reset timeout is measured from the most recent failure, so a breaker
//! that keeps failing while half-open pushes its next probe further out.
//!
//! A probe holds a [`ProbeGuard`]. Dropping the guard before the probe's
//! result is recorded (the caller timed out or was aborted) reopens the
//! circuit. A probe still running after a full reset timeout no longer
//! blocks the next one.

use crate::config::ExecutorConfig;
use crate::resilience::CircuitBreakerMetrics;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Circuit breaker states representing the current operational mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation - all calls are allowed through
    Closed,
    /// Failure mode - all calls fail fast without executing
    Open,
    /// Testing recovery - a single probe call is allowed through
    HalfOpen,
}

/// Configuration for a single circuit breaker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening circuit
    pub failure_threshold: u32,

    /// Time since the last failure before an open circuit admits a probe
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
        }
    }
}

impl From<&ExecutorConfig> for CircuitBreakerConfig {
    fn from(config: &ExecutorConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold,
            reset_timeout: config.reset_timeout(),
        }
    }
}

/// Admission decision for a call
#[derive(Debug)]
pub enum Admission {
    /// Run the unit of work; `probe` is set for the half-open trial call
    Allowed { probe: Option<ProbeGuard> },
    /// Fail fast; `retry_in` is the remaining reset timeout
    Rejected { retry_in: Duration },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed { .. })
    }

    pub fn is_probe(&self) -> bool {
        matches!(self, Admission::Allowed { probe: Some(_) })
    }
}

/// Holds the half-open probe slot until the probe's result is recorded
#[derive(Debug)]
pub struct ProbeGuard {
    breaker: Arc<CircuitBreaker>,
    id: u64,
}

impl Drop for ProbeGuard {
    fn drop(&mut self) {
        self.breaker.abandon_probe(self.id);
    }
}

#[derive(Debug, Clone, Copy)]
struct ProbeSlot {
    id: u64,
    started_at: Instant,
}

/// Mutable breaker state; every transition happens under one lock so
/// "read failure count, compare, write state" cannot interleave.
#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    last_failure_at: Option<Instant>,
    probe: Option<ProbeSlot>,
    next_probe_id: u64,
}

impl BreakerState {
    fn start_probe(&mut self) -> u64 {
        self.next_probe_id = self.next_probe_id.wrapping_add(1);
        self.probe = Some(ProbeSlot {
            id: self.next_probe_id,
            started_at: Instant::now(),
        });
        self.next_probe_id
    }
}

/// Lock-free counters for the metrics snapshot
#[derive(Debug, Default)]
struct AtomicCounters {
    total_calls: AtomicU64,
    success_count: AtomicU64,
    failure_count: AtomicU64,
    rejected_count: AtomicU64,
    success_duration_nanos: AtomicU64,
    total_duration_nanos: AtomicU64,
}

/// Per-label circuit breaker
#[derive(Debug)]
pub struct CircuitBreaker {
    /// Label for logging and metrics
    name: String,

    config: CircuitBreakerConfig,

    inner: Mutex<BreakerState>,

    counters: AtomicCounters,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given label and configuration
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let name = name.into();
        debug!(
            component = %name,
            failure_threshold = config.failure_threshold,
            reset_timeout_ms = config.reset_timeout.as_millis() as u64,
            "Circuit breaker initialized"
        );

        Self {
            name,
            config,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure_at: None,
                probe: None,
                next_probe_id: 0,
            }),
            counters: AtomicCounters::default(),
        }
    }

    /// Get current circuit state
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Current consecutive failure count
    pub fn failure_count(&self) -> u32 {
        self.inner.lock().failure_count
    }

    /// Get the breaker's label
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Decide whether a call may run, moving Open to HalfOpen once the reset timeout elapsed
    pub fn try_acquire(self: &Arc<Self>) -> Admission {
        let mut inner = self.inner.lock();
        let state = inner.state;
        let probe_id = match state {
            CircuitState::Closed => return Admission::Allowed { probe: None },
            CircuitState::Open => {
                let elapsed = inner
                    .last_failure_at
                    .map(|at| at.elapsed())
                    .unwrap_or(self.config.reset_timeout);

                if elapsed < self.config.reset_timeout {
                    drop(inner);
                    return self.reject(self.config.reset_timeout - elapsed);
                }

                inner.state = CircuitState::HalfOpen;
                info!(
                    component = %self.name,
                    failure_count = inner.failure_count,
                    "Circuit breaker half-open (probing)"
                );
                inner.start_probe()
            }
            CircuitState::HalfOpen => {
                let probe = inner.probe;
                match probe {
                    Some(slot) if slot.started_at.elapsed() < self.config.reset_timeout => {
                        let retry_in = self
                            .config
                            .reset_timeout
                            .saturating_sub(slot.started_at.elapsed());
                        drop(inner);
                        return self.reject(retry_in);
                    }
                    Some(slot) => {
                        warn!(
                            component = %self.name,
                            stalled_ms = slot.started_at.elapsed().as_millis() as u64,
                            "Half-open probe stalled, admitting a new probe"
                        );
                        inner.start_probe()
                    }
                    None => inner.start_probe(),
                }
            }
        };

        Admission::Allowed {
            probe: Some(ProbeGuard {
                breaker: Arc::clone(self),
                id: probe_id,
            }),
        }
    }

    fn reject(&self, retry_in: Duration) -> Admission {
        self.counters.rejected_count.fetch_add(1, Ordering::Relaxed);
        Admission::Rejected { retry_in }
    }

    /// Reopen the circuit if probe `id` ended without recording a result
    fn abandon_probe(&self, id: u64) {
        let mut inner = self.inner.lock();
        let current = inner.probe.is_some_and(|slot| slot.id == id);
        if inner.state == CircuitState::HalfOpen && current {
            inner.state = CircuitState::Open;
            inner.last_failure_at = Some(Instant::now());
            inner.probe = None;
            warn!(component = %self.name, "Half-open probe abandoned, circuit reopened");
        }
    }

    /// Record a successful operation
    pub fn record_success(&self, duration: Duration) {
        self.counters.total_calls.fetch_add(1, Ordering::Relaxed);
        self.counters.success_count.fetch_add(1, Ordering::Relaxed);
        self.counters
            .success_duration_nanos
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
        self.counters
            .total_duration_nanos
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);

        let mut inner = self.inner.lock();
        let state = inner.state;
        match state {
            CircuitState::Closed => {
                inner.failure_count = 0;
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Closed;
                inner.failure_count = 0;
                inner.probe = None;
                info!(component = %self.name, "Circuit breaker closed (recovered)");
            }
            CircuitState::Open => {
                // Open only leaves via a half-open probe
                warn!(component = %self.name, "Success recorded while circuit is open");
            }
        }
    }

    /// Record a failed operation; returns true when this failure opened the circuit
    pub fn record_failure(&self, duration: Duration) -> bool {
        self.counters.total_calls.fetch_add(1, Ordering::Relaxed);
        self.counters.failure_count.fetch_add(1, Ordering::Relaxed);
        self.counters
            .total_duration_nanos
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);

        let mut inner = self.inner.lock();
        inner.failure_count = inner.failure_count.saturating_add(1);
        inner.last_failure_at = Some(Instant::now());

        let opened = match inner.state {
            CircuitState::Closed => inner.failure_count >= self.config.failure_threshold,
            CircuitState::HalfOpen => true,
            CircuitState::Open => false,
        };

        if opened {
            inner.state = CircuitState::Open;
            inner.probe = None;
            error!(
                component = %self.name,
                failure_count = inner.failure_count,
                failure_threshold = self.config.failure_threshold,
                reset_timeout_ms = self.config.reset_timeout.as_millis() as u64,
                "Circuit breaker opened (failing fast)"
            );
        }

        opened
    }

    /// Force circuit to open state (for emergency situations)
    pub fn force_open(&self) {
        warn!(component = %self.name, "Circuit breaker forced open");
        let mut inner = self.inner.lock();
        inner.state = CircuitState::Open;
        inner.last_failure_at = Some(Instant::now());
        inner.probe = None;
    }

    /// Force circuit to closed state (for emergency recovery)
    pub fn force_closed(&self) {
        warn!(component = %self.name, "Circuit breaker forced closed");
        let mut inner = self.inner.lock();
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.probe = None;
    }

    /// Get current metrics snapshot
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let (state, consecutive_failures, since_last_failure) = {
            let inner = self.inner.lock();
            (
                inner.state,
                inner.failure_count,
                inner.last_failure_at.map(|at| at.elapsed()),
            )
        };

        let total_calls = self.counters.total_calls.load(Ordering::Relaxed);
        let success_count = self.counters.success_count.load(Ordering::Relaxed);
        let failure_count = self.counters.failure_count.load(Ordering::Relaxed);
        let success_nanos = self.counters.success_duration_nanos.load(Ordering::Relaxed);
        let total_nanos = self.counters.total_duration_nanos.load(Ordering::Relaxed);

        let failure_rate = if total_calls > 0 {
            failure_count as f64 / total_calls as f64
        } else {
            0.0
        };
        let average_duration = if success_count > 0 {
            Duration::from_nanos(success_nanos / success_count)
        } else {
            Duration::ZERO
        };

        CircuitBreakerMetrics {
            total_calls,
            success_count,
            failure_count,
            rejected_count: self.counters.rejected_count.load(Ordering::Relaxed),
            consecutive_failures,
            total_duration: Duration::from_nanos(total_nanos),
            current_state: state,
            since_last_failure,
            failure_rate,
            average_duration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(threshold: u32, reset_ms: u64) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: threshold,
            reset_timeout: Duration::from_millis(reset_ms),
        }
    }

    #[tokio::test]
    async fn test_opens_at_threshold() {
        let breaker = Arc::new(CircuitBreaker::new("ban_command", config(3, 1_000)));

        assert!(!breaker.record_failure(Duration::ZERO));
        assert!(!breaker.record_failure(Duration::ZERO));
        assert_eq!(breaker.state(), CircuitState::Closed);

        assert!(breaker.record_failure(Duration::ZERO));
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.try_acquire().is_allowed());
        assert_eq!(breaker.metrics().rejected_count, 1);
    }

    #[tokio::test]
    async fn test_success_resets_failure_count() {
        let breaker = Arc::new(CircuitBreaker::new("kick_command", config(3, 1_000)));

        breaker.record_failure(Duration::ZERO);
        breaker.record_failure(Duration::ZERO);
        breaker.record_success(Duration::from_millis(5));
        assert_eq!(breaker.failure_count(), 0);

        breaker.record_failure(Duration::ZERO);
        breaker.record_failure(Duration::ZERO);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_probe_closes_on_success() {
        let breaker = Arc::new(CircuitBreaker::new("warn_command", config(1, 100)));
        breaker.record_failure(Duration::ZERO);
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_millis(101)).await;

        let probe = breaker.try_acquire();
        assert!(probe.is_probe());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        // Only one probe at a time
        assert!(!breaker.try_acquire().is_allowed());

        breaker.record_success(Duration::ZERO);
        drop(probe);
        assert_eq!(breaker.state(), CircuitState::Closed);
        let admission = breaker.try_acquire();
        assert!(admission.is_allowed() && !admission.is_probe());
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens() {
        let breaker = Arc::new(CircuitBreaker::new("mute_command", config(2, 100)));
        breaker.record_failure(Duration::ZERO);
        breaker.record_failure(Duration::ZERO);

        tokio::time::advance(Duration::from_millis(150)).await;
        let probe = breaker.try_acquire();
        assert!(probe.is_probe());

        assert!(breaker.record_failure(Duration::ZERO));
        drop(probe);
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(breaker.failure_count(), 3);

        // Timeout restarts from the probe failure
        tokio::time::advance(Duration::from_millis(50)).await;
        assert!(!breaker.try_acquire().is_allowed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_probe_reopens_circuit() {
        let breaker = Arc::new(CircuitBreaker::new("ban_command", config(1, 100)));
        breaker.record_failure(Duration::ZERO);
        tokio::time::advance(Duration::from_millis(100)).await;

        let probe = breaker.try_acquire();
        assert!(probe.is_probe());
        tokio::time::advance(Duration::from_millis(30)).await;
        drop(probe);

        assert_eq!(breaker.state(), CircuitState::Open);
        // The timeout restarts from the abandoned probe
        tokio::time::advance(Duration::from_millis(80)).await;
        assert!(!breaker.try_acquire().is_allowed());
        tokio::time::advance(Duration::from_millis(20)).await;
        assert!(breaker.try_acquire().is_probe());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_probe_does_not_block_forever() {
        let breaker = Arc::new(CircuitBreaker::new("kick_command", config(1, 100)));
        breaker.record_failure(Duration::ZERO);
        tokio::time::advance(Duration::from_millis(100)).await;

        let stalled = breaker.try_acquire();
        assert!(stalled.is_probe());

        tokio::time::advance(Duration::from_millis(99)).await;
        assert!(!breaker.try_acquire().is_allowed());

        tokio::time::advance(Duration::from_millis(1)).await;
        let fresh = breaker.try_acquire();
        assert!(fresh.is_probe());

        // The stale guard no longer owns the slot
        drop(stalled);
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        breaker.record_success(Duration::ZERO);
        drop(fresh);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_success_while_open_does_not_close() {
        let breaker = Arc::new(CircuitBreaker::new("purge_command", config(1, 10_000)));
        breaker.record_failure(Duration::ZERO);
        breaker.record_success(Duration::ZERO);
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_force_operations() {
        let breaker = Arc::new(CircuitBreaker::new("test", config(1, 1_000)));

        breaker.force_open();
        assert_eq!(breaker.state(), CircuitState::Open);

        breaker.force_closed();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.failure_count(), 0);
    }
}
