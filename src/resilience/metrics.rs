//! # Circuit Breaker Metrics
//!
//! Snapshot types for per-label breakers and the executor as a whole.

use crate::resilience::CircuitState;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Metrics for a single label's circuit breaker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerMetrics {
    /// Calls that reached the unit of work
    pub total_calls: u64,

    /// Number of successful calls
    pub success_count: u64,

    /// Number of failed calls
    pub failure_count: u64,

    /// Calls rejected while the circuit was open
    pub rejected_count: u64,

    /// Current consecutive failure count
    pub consecutive_failures: u32,

    /// Total duration of all executed calls
    pub total_duration: Duration,

    /// Current circuit breaker state
    pub current_state: CircuitState,

    /// Time since the most recent failure, if any
    pub since_last_failure: Option<Duration>,

    /// Calculated failure rate (0.0 to 1.0)
    pub failure_rate: f64,

    /// Average duration of successful calls
    pub average_duration: Duration,
}

impl CircuitBreakerMetrics {
    /// Check if metrics indicate healthy operation
    pub fn is_healthy(&self) -> bool {
        match self.current_state {
            CircuitState::Closed => self.failure_rate < 0.1,
            CircuitState::Open => false,
            CircuitState::HalfOpen => true,
        }
    }

    /// Get human-readable state description
    pub fn state_description(&self) -> &'static str {
        match self.current_state {
            CircuitState::Closed => "Healthy - Normal operation",
            CircuitState::Open => "Failing - Rejecting all calls",
            CircuitState::HalfOpen => "Recovering - Probing with a single call",
        }
    }

    /// Format metrics for logging
    pub fn format_summary(&self) -> String {
        format!(
            "State: {} | Calls: {} | Failures: {} | Rejected: {} | Avg Duration: {}ms",
            self.state_description(),
            self.total_calls,
            self.failure_count,
            self.rejected_count,
            self.average_duration.as_millis()
        )
    }
}

/// Executor-wide statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorStats {
    /// `wrap` invocations, including fail-fast rejections
    pub total_executions: u64,

    /// Invocations that ended in a failure outcome
    pub total_failures: u64,

    /// Invocations that succeeded after a recovery strategy's retry
    pub total_recovered: u64,

    /// Labels whose circuit is currently open
    pub open_circuits: Vec<String>,

    /// Error records inside the spike window
    pub recent_errors: usize,

    /// Per-label breaker metrics
    pub circuit_breakers: HashMap<String, CircuitBreakerMetrics>,
}

impl ExecutorStats {
    /// Get count of circuit breakers by state
    pub fn count_by_state(&self) -> HashMap<CircuitState, usize> {
        let mut counts = HashMap::new();
        for metrics in self.circuit_breakers.values() {
            *counts.entry(metrics.current_state).or_insert(0) += 1;
        }
        counts
    }

    /// Fraction of breakers that are healthy (1.0 when none exist)
    pub fn health_score(&self) -> f64 {
        if self.circuit_breakers.is_empty() {
            return 1.0;
        }
        let healthy = self
            .circuit_breakers
            .values()
            .filter(|m| m.is_healthy())
            .count();
        healthy as f64 / self.circuit_breakers.len() as f64
    }
}
