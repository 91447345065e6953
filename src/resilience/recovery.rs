//! # Recovery Strategies
//!
//! An ordered list of pattern-matched handlers consulted after a failure.
//! The first strategy whose pattern matches decides whether the failed unit
//! of work is retried (exactly once) and which message the caller sees.

use crate::config::ExecutorConfig;
use crate::resilience::{ErrorKind, OperationError, PERMISSION_MESSAGE};
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Decision returned by a recovery handler
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryOutcome {
    pub recovered: bool,
    pub retry: bool,
    /// Shown to the caller verbatim when present
    pub user_message: Option<String>,
}

impl RecoveryOutcome {
    /// Recovered, run the unit of work once more
    pub fn retry() -> Self {
        Self {
            recovered: true,
            retry: true,
            user_message: None,
        }
    }

    /// Not recoverable; surface `message` to the caller
    pub fn give_up(message: impl Into<String>) -> Self {
        Self {
            recovered: false,
            retry: false,
            user_message: Some(message.into()),
        }
    }

    pub fn with_user_message(mut self, message: impl Into<String>) -> Self {
        self.user_message = Some(message.into());
        self
    }
}

/// What the handler knows about the failed call
#[derive(Debug, Clone)]
pub struct RecoveryContext<'a> {
    pub label: &'a str,
    pub context: Option<&'a serde_json::Value>,
}

#[async_trait]
pub trait RecoveryHandler: Send + Sync {
    async fn handle(&self, error: &OperationError, ctx: &RecoveryContext<'_>) -> RecoveryOutcome;
}

/// How a strategy selects the errors it handles
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchPattern {
    /// Errors classified with this kind
    Kind(ErrorKind),
    /// Errors whose message or code contains this text
    Contains(String),
}

impl MatchPattern {
    pub fn matches(&self, error: &OperationError) -> bool {
        match self {
            MatchPattern::Kind(kind) => error.kind() == *kind,
            MatchPattern::Contains(pattern) => error.contains(pattern),
        }
    }
}

impl fmt::Display for MatchPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchPattern::Kind(kind) => write!(f, "kind:{kind}"),
            MatchPattern::Contains(pattern) => write!(f, "contains:{pattern}"),
        }
    }
}

#[derive(Clone)]
pub struct RecoveryStrategy {
    name: String,
    pattern: MatchPattern,
    handler: Arc<dyn RecoveryHandler>,
}

impl fmt::Debug for RecoveryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecoveryStrategy")
            .field("name", &self.name)
            .field("pattern", &self.pattern)
            .finish_non_exhaustive()
    }
}

impl RecoveryStrategy {
    pub fn new(
        name: impl Into<String>,
        pattern: MatchPattern,
        handler: Arc<dyn RecoveryHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            pattern,
            handler,
        }
    }

    /// Strategy backed by an async closure
    pub fn from_fn<F>(name: impl Into<String>, pattern: MatchPattern, f: F) -> Self
    where
        F: Fn(OperationError) -> BoxFuture<'static, RecoveryOutcome> + Send + Sync + 'static,
    {
        Self::new(name, pattern, Arc::new(FnHandler(f)))
    }

    /// Sleep for `delay`, then ask for one retry
    pub fn retry_after(name: impl Into<String>, pattern: MatchPattern, delay: Duration) -> Self {
        Self::new(name, pattern, Arc::new(DelayedRetry { delay }))
    }

    /// Never retry; always surface `message`
    pub fn terminal(
        name: impl Into<String>,
        pattern: MatchPattern,
        message: impl Into<String>,
    ) -> Self {
        Self::new(
            name,
            pattern,
            Arc::new(Terminal {
                message: message.into(),
            }),
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pattern(&self) -> &MatchPattern {
        &self.pattern
    }

    pub fn matches(&self, error: &OperationError) -> bool {
        self.pattern.matches(error)
    }

    pub async fn handle(&self, error: &OperationError, ctx: &RecoveryContext<'_>) -> RecoveryOutcome {
        self.handler.handle(error, ctx).await
    }
}

struct DelayedRetry {
    delay: Duration,
}

#[async_trait]
impl RecoveryHandler for DelayedRetry {
    async fn handle(&self, _error: &OperationError, _ctx: &RecoveryContext<'_>) -> RecoveryOutcome {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        RecoveryOutcome::retry()
    }
}

struct Terminal {
    message: String,
}

#[async_trait]
impl RecoveryHandler for Terminal {
    async fn handle(&self, _error: &OperationError, _ctx: &RecoveryContext<'_>) -> RecoveryOutcome {
        RecoveryOutcome::give_up(self.message.clone())
    }
}

struct FnHandler<F>(F);

#[async_trait]
impl<F> RecoveryHandler for FnHandler<F>
where
    F: Fn(OperationError) -> BoxFuture<'static, RecoveryOutcome> + Send + Sync + 'static,
{
    async fn handle(&self, error: &OperationError, _ctx: &RecoveryContext<'_>) -> RecoveryOutcome {
        (self.0)(error.clone()).await
    }
}

/// Built-in strategies, in evaluation order
pub fn default_strategies(config: &ExecutorConfig) -> Vec<RecoveryStrategy> {
    vec![
        RecoveryStrategy::retry_after(
            "storage_busy",
            MatchPattern::Kind(ErrorKind::StorageBusy),
            config.storage_busy_retry_delay(),
        ),
        RecoveryStrategy::retry_after(
            "network_reset",
            MatchPattern::Kind(ErrorKind::NetworkReset),
            config.transient_retry_delay(),
        ),
        RecoveryStrategy::retry_after(
            "upstream_unavailable",
            MatchPattern::Kind(ErrorKind::Upstream),
            config.transient_retry_delay(),
        ),
        // Expired interaction tokens cannot be answered again
        RecoveryStrategy::terminal(
            "unknown_interaction",
            MatchPattern::Contains("Unknown interaction".to_string()),
            "This interaction has expired. Please run the command again.",
        ),
        RecoveryStrategy::terminal(
            "missing_permissions",
            MatchPattern::Kind(ErrorKind::Permission),
            PERMISSION_MESSAGE,
        ),
    ]
}
