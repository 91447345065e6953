//! # Resilient Executor
//!
//! Runs a labelled unit of work behind a per-label circuit breaker. Failures
//! are recorded, audited and offered to the recovery strategies; whatever
//! happens, the caller gets an [`ExecutionOutcome`] rather than a raw error.
//!
//! ```rust,no_run
//! use resilience_core::resilience::{
//!     OperationError, ResilientExecutor, TracingAlertSink, TracingAuditSink,
//! };
//! use resilience_core::config::ExecutorConfig;
//! use std::sync::Arc;
//!
//! # async fn example() {
//! let executor = ResilientExecutor::new(
//!     ExecutorConfig::default(),
//!     Arc::new(TracingAuditSink),
//!     Arc::new(TracingAlertSink),
//! );
//!
//! let outcome = executor
//!     .wrap("ban_command", || async { Ok::<_, OperationError>("banned") }, None)
//!     .await;
//! assert!(outcome.is_success());
//! # }
//! ```

use crate::config::ExecutorConfig;
use crate::logging::log_resilience_event;
use crate::resilience::{
    default_strategies, Admission, AlertSink, AuditEntry, AuditSink, CircuitBreaker,
    CircuitBreakerConfig, CircuitBreakerRegistry, CircuitState, ErrorHistory, ExecutorStats,
    OperationError, RecoveryContext, RecoveryStrategy, SpikeReport, CIRCUIT_OPEN_MESSAGE,
};
use parking_lot::RwLock;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Error)]
pub enum ExecutorError {
    /// The label's circuit is open; the unit of work was not invoked
    #[error("Circuit open for '{label}', next probe in {retry_in:?}")]
    CircuitOpen { label: String, retry_in: Duration },

    #[error(transparent)]
    Operation(#[from] OperationError),
}

impl ExecutorError {
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, ExecutorError::CircuitOpen { .. })
    }
}

/// Structured result of [`ResilientExecutor::wrap`]
#[derive(Debug, Clone)]
pub struct ExecutionOutcome<T> {
    pub result: Result<T, ExecutorError>,
    /// Non-technical message for the end user
    pub user_message: Option<String>,
    /// True when a recovery strategy's retry produced the result
    pub recovered: bool,
}

impl<T> ExecutionOutcome<T> {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn value(&self) -> Option<&T> {
        self.result.as_ref().ok()
    }

    pub fn error(&self) -> Option<&ExecutorError> {
        self.result.as_ref().err()
    }

    pub fn into_result(self) -> Result<T, ExecutorError> {
        self.result
    }
}

#[derive(Debug, Default)]
struct ExecutorCounters {
    total_executions: AtomicU64,
    total_failures: AtomicU64,
    total_recovered: AtomicU64,
}

pub struct ResilientExecutor {
    config: ExecutorConfig,
    breakers: CircuitBreakerRegistry,
    history: ErrorHistory,
    strategies: RwLock<Vec<RecoveryStrategy>>,
    audit: Arc<dyn AuditSink>,
    alerts: Arc<dyn AlertSink>,
    counters: ExecutorCounters,
}

impl std::fmt::Debug for ResilientExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientExecutor")
            .field("config", &self.config)
            .field("breakers", &self.breakers.len())
            .field("strategies", &self.strategies.read().len())
            .finish_non_exhaustive()
    }
}

impl ResilientExecutor {
    pub fn new(
        config: ExecutorConfig,
        audit: Arc<dyn AuditSink>,
        alerts: Arc<dyn AlertSink>,
    ) -> Self {
        let strategies = if config.register_default_strategies {
            default_strategies(&config)
        } else {
            Vec::new()
        };

        info!(
            failure_threshold = config.failure_threshold,
            reset_timeout_ms = config.reset_timeout_ms,
            strategies = strategies.len(),
            "Resilient executor initialized"
        );

        Self {
            breakers: CircuitBreakerRegistry::new(CircuitBreakerConfig::from(&config)),
            history: ErrorHistory::new(config.error_history_capacity),
            strategies: RwLock::new(strategies),
            audit,
            alerts,
            counters: ExecutorCounters::default(),
            config,
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Append a strategy; strategies are evaluated in registration order
    pub fn register_strategy(&self, strategy: RecoveryStrategy) {
        debug!(strategy = strategy.name(), pattern = %strategy.pattern(), "Registered recovery strategy");
        self.strategies.write().push(strategy);
    }

    /// Run `op` under the label's circuit breaker.
    ///
    /// `op` is invoked at most twice: once normally and once more if a
    /// matching recovery strategy asks for a retry.
    pub async fn wrap<T, E, F, Fut>(
        &self,
        label: &str,
        op: F,
        context: Option<serde_json::Value>,
    ) -> ExecutionOutcome<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<OperationError>,
    {
        self.counters.total_executions.fetch_add(1, Ordering::Relaxed);

        // Breakers only exist once a label has failed. A half-open probe
        // keeps its guard until the first attempt's result is recorded.
        let mut probe = None;
        if let Some(breaker) = self.breakers.get(label) {
            match breaker.try_acquire() {
                Admission::Allowed { probe: guard } => probe = guard,
                Admission::Rejected { retry_in } => {
                    self.counters.total_failures.fetch_add(1, Ordering::Relaxed);
                    debug!(label = %label, retry_in_ms = retry_in.as_millis() as u64, "Circuit open, failing fast");
                    return ExecutionOutcome {
                        result: Err(ExecutorError::CircuitOpen {
                            label: label.to_string(),
                            retry_in,
                        }),
                        user_message: Some(CIRCUIT_OPEN_MESSAGE.to_string()),
                        recovered: false,
                    };
                }
            }
        }

        let start = Instant::now();
        let error: OperationError = match op().await {
            Ok(value) => {
                self.on_success(label, start.elapsed());
                drop(probe);
                return ExecutionOutcome {
                    result: Ok(value),
                    user_message: None,
                    recovered: false,
                };
            }
            Err(err) => err.into(),
        };

        let breaker = self.on_failure(label, &error, start.elapsed()).await;
        drop(probe);

        let strategy = self.find_strategy(&error);
        self.audit_failure(label, &error, context.as_ref(), strategy.is_some())
            .await;

        let Some(strategy) = strategy else {
            return self.failed(label, error, None);
        };

        let recovery = strategy
            .handle(
                &error,
                &RecoveryContext {
                    label,
                    context: context.as_ref(),
                },
            )
            .await;

        if !(recovery.recovered && recovery.retry) {
            debug!(label = %label, strategy = strategy.name(), "Recovery declined retry");
            return self.failed(label, error, recovery.user_message);
        }

        info!(label = %label, strategy = strategy.name(), "Retrying after recovery");
        let retry_start = Instant::now();
        match op().await {
            Ok(value) => {
                let elapsed = retry_start.elapsed();
                self.warn_if_slow(label, elapsed);
                if breaker.state() != CircuitState::Open {
                    breaker.record_success(elapsed);
                }
                self.counters.total_recovered.fetch_add(1, Ordering::Relaxed);
                log_resilience_event("executor", label, "recovered", Some(strategy.name()));
                ExecutionOutcome {
                    result: Ok(value),
                    user_message: recovery.user_message,
                    recovered: true,
                }
            }
            Err(err) => {
                let retry_error: OperationError = err.into();
                warn!(
                    label = %label,
                    strategy = strategy.name(),
                    error = %retry_error,
                    "Retry after recovery failed"
                );
                self.failed(label, retry_error, recovery.user_message)
            }
        }
    }

    fn on_success(&self, label: &str, elapsed: Duration) {
        self.warn_if_slow(label, elapsed);
        if let Some(breaker) = self.breakers.get(label) {
            breaker.record_success(elapsed);
        }
    }

    fn warn_if_slow(&self, label: &str, elapsed: Duration) {
        if elapsed > self.config.slow_operation_threshold() {
            warn!(
                label = %label,
                duration_ms = elapsed.as_millis() as u64,
                threshold_ms = self.config.slow_operation_threshold_ms,
                "Slow operation"
            );
        }
    }

    /// Record the failure in history and on the breaker; alert if it opened
    async fn on_failure(
        &self,
        label: &str,
        error: &OperationError,
        elapsed: Duration,
    ) -> Arc<CircuitBreaker> {
        let record = self
            .history
            .record(label, error.message(), error.stack_trace());

        let breaker = self.breakers.get_or_create(label);
        let opened = breaker.record_failure(elapsed);

        warn!(
            label = %label,
            kind = %error.kind(),
            occurrence_count = record.occurrence_count,
            failure_count = breaker.failure_count(),
            error = %error,
            "Wrapped operation failed"
        );

        if opened {
            log_resilience_event("executor", label, "circuit_opened", Some(error.message()));
            let message = format!(
                "Circuit breaker opened for '{label}' after {} failures. Last error: {}. {}",
                breaker.failure_count(),
                error.message(),
                breaker.metrics().format_summary()
            );
            if let Err(e) = self.alerts.alert(&message).await {
                error!(label = %label, error = %e, "Failed to send circuit alert");
            }
        }

        breaker
    }

    fn find_strategy(&self, error: &OperationError) -> Option<RecoveryStrategy> {
        self.strategies
            .read()
            .iter()
            .find(|strategy| strategy.matches(error))
            .cloned()
    }

    async fn audit_failure(
        &self,
        label: &str,
        error: &OperationError,
        context: Option<&serde_json::Value>,
        recovery_attempted: bool,
    ) {
        let mut entry = AuditEntry::new(label, error.message());
        entry.stack_trace = error.stack_trace().map(str::to_string);
        entry.context_json = context.cloned();
        entry.recovery_attempted = recovery_attempted;

        if let Err(e) = self.audit.record(&entry).await {
            error!(label = %label, error = %e, "Failed to persist audit entry");
        }
    }

    fn failed<T>(
        &self,
        label: &str,
        error: OperationError,
        user_message: Option<String>,
    ) -> ExecutionOutcome<T> {
        self.counters.total_failures.fetch_add(1, Ordering::Relaxed);
        let user_message = user_message.unwrap_or_else(|| error.user_message().to_string());
        debug!(label = %label, kind = %error.kind(), "Returning failure outcome");
        ExecutionOutcome {
            result: Err(ExecutorError::Operation(error)),
            user_message: Some(user_message),
            recovered: false,
        }
    }

    /// True while the label's circuit is open
    pub fn is_circuit_broken(&self, label: &str) -> bool {
        self.breakers
            .get(label)
            .is_some_and(|breaker| breaker.state() == CircuitState::Open)
    }

    pub fn circuit_state(&self, label: &str) -> Option<CircuitState> {
        self.breakers.get(label).map(|breaker| breaker.state())
    }

    /// Open a label's circuit by hand
    pub fn force_open(&self, label: &str) {
        log_resilience_event("executor", label, "forced_open", None);
        self.breakers.get_or_create(label).force_open();
    }

    /// Close a label's circuit and clear its failure count
    pub fn reset(&self, label: &str) {
        if let Some(breaker) = self.breakers.get(label) {
            log_resilience_event("executor", label, "reset", None);
            breaker.force_closed();
        }
    }

    pub fn stats(&self) -> ExecutorStats {
        ExecutorStats {
            total_executions: self.counters.total_executions.load(Ordering::Relaxed),
            total_failures: self.counters.total_failures.load(Ordering::Relaxed),
            total_recovered: self.counters.total_recovered.load(Ordering::Relaxed),
            open_circuits: self.breakers.open_labels(),
            recent_errors: self.history.recent(self.config.spike_window()).len(),
            circuit_breakers: self.breakers.metrics(),
        }
    }

    /// Alert when errors inside the spike window exceed the threshold
    pub async fn check_error_spike(&self) -> Option<SpikeReport> {
        let window = self.config.spike_window();
        self.history.prune(window);

        let report = self
            .history
            .detect_spike(window, self.config.spike_threshold)?;

        let stats = self.stats();
        let open = stats
            .count_by_state()
            .get(&CircuitState::Open)
            .copied()
            .unwrap_or(0);
        let health = stats.health_score();

        warn!(
            total_errors = report.total_errors,
            window_seconds = window.as_secs(),
            labels = report.labels.len(),
            open_circuits = open,
            health_score = health,
            "Error spike detected"
        );
        let message = format!(
            "{} Breaker health: {:.0}% ({open} of {} circuits open)",
            report.alert_message(),
            health * 100.0,
            stats.circuit_breakers.len()
        );
        if let Err(e) = self.alerts.alert(&message).await {
            error!(error = %e, "Failed to send spike alert");
        }
        Some(report)
    }

    /// Run [`check_error_spike`](Self::check_error_spike) on the configured
    /// interval until the executor is dropped
    pub fn spawn_spike_monitor(self: &Arc<Self>) -> JoinHandle<()> {
        let executor: Weak<Self> = Arc::downgrade(self);
        let period = self.config.spike_check_interval().max(Duration::from_secs(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(executor) = executor.upgrade() else {
                    debug!("Executor dropped, stopping spike monitor");
                    break;
                };
                executor.check_error_spike().await;
            }
        })
    }
}
