//! # Error Classification
//!
//! Failures are tagged with an [`ErrorKind`] when the [`OperationError`] is
//! built. Recovery strategies and user-facing messages dispatch on that tag.
//! Untyped errors (`anyhow::Error`, plain strings) are classified once, by
//! keyword, at conversion time.
//!
//! ```text
//! OperationError
//! ├── RecoverableTransient
//! │   ├── StorageBusy   - SQLITE_BUSY lock contention
//! │   ├── NetworkReset  - ECONNRESET, dropped sockets
//! │   └── Upstream      - provider 5xx
//! ├── Terminal
//! │   ├── Permission    - missing permission, access denied, 401/403
//! │   └── NotFound      - not found, unknown entity, 404
//! ├── RateLimited       - 429 / too many requests (governor territory)
//! └── Unclassified
//!     ├── Timeout
//!     ├── Database      - other database failures (busy message, no retry)
//!     └── Other
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

pub const PERMISSION_MESSAGE: &str =
    "I don't have permission to do that. Please check my role permissions and try again.";
pub const TIMEOUT_MESSAGE: &str = "That took too long and timed out. Please try again.";
pub const NOT_FOUND_MESSAGE: &str =
    "I couldn't find what you were looking for. It may have been deleted.";
pub const RATE_LIMIT_MESSAGE: &str =
    "I'm being rate limited right now. Please wait a moment and try again.";
pub const STORAGE_BUSY_MESSAGE: &str =
    "The database is busy at the moment. Please try again in a few seconds.";
pub const GENERIC_MESSAGE: &str =
    "Something went wrong while running that command. The error has been logged.";
pub const CIRCUIT_OPEN_MESSAGE: &str =
    "This feature is temporarily disabled after repeated errors. Please try again later.";

/// Tagged failure kind, assigned when an error is constructed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Permission,
    Timeout,
    NotFound,
    RateLimited,
    StorageBusy,
    Database,
    NetworkReset,
    Upstream,
    Unclassified,
}

/// Coarse handling class for an [`ErrorKind`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Eligible for exactly one retry through a matching recovery strategy
    RecoverableTransient,
    /// Mapped to a fixed message, never retried
    Terminal,
    /// Handled by the outbound rate governor
    RateLimited,
    /// Generic message, still logged and counted
    Unclassified,
}

impl ErrorKind {
    /// Classify free text by keyword.
    ///
    /// The `SQLITE_BUSY` marker wins over everything else. After that the
    /// order mirrors the user-message taxonomy: permission, timeout, not
    /// found, rate limit, database, then the transient network markers.
    pub fn classify(text: &str) -> Self {
        let lower = text.to_lowercase();

        if lower.contains("sqlite_busy") {
            ErrorKind::StorageBusy
        } else if lower.contains("permission") || lower.contains("access denied") {
            ErrorKind::Permission
        } else if lower.contains("timeout") || lower.contains("timed out") {
            ErrorKind::Timeout
        } else if lower.contains("not found") || lower.contains("unknown") {
            ErrorKind::NotFound
        } else if lower.contains("rate limit") || lower.contains("too many requests") {
            ErrorKind::RateLimited
        } else if lower.contains("database") {
            ErrorKind::Database
        } else if lower.contains("econnreset") || lower.contains("connection reset") {
            ErrorKind::NetworkReset
        } else {
            ErrorKind::Unclassified
        }
    }

    /// Classify an HTTP-style status code
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => ErrorKind::Permission,
            404 => ErrorKind::NotFound,
            408 | 504 => ErrorKind::Timeout,
            429 => ErrorKind::RateLimited,
            500..=599 => ErrorKind::Upstream,
            _ => ErrorKind::Unclassified,
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            ErrorKind::StorageBusy | ErrorKind::NetworkReset | ErrorKind::Upstream => {
                ErrorClass::RecoverableTransient
            }
            ErrorKind::Permission | ErrorKind::NotFound => ErrorClass::Terminal,
            ErrorKind::RateLimited => ErrorClass::RateLimited,
            ErrorKind::Timeout | ErrorKind::Database | ErrorKind::Unclassified => {
                ErrorClass::Unclassified
            }
        }
    }

    /// Fixed, non-technical message shown to the end user
    pub fn user_message(&self) -> &'static str {
        match self {
            ErrorKind::Permission => PERMISSION_MESSAGE,
            ErrorKind::Timeout => TIMEOUT_MESSAGE,
            ErrorKind::NotFound => NOT_FOUND_MESSAGE,
            ErrorKind::RateLimited => RATE_LIMIT_MESSAGE,
            ErrorKind::StorageBusy | ErrorKind::Database => STORAGE_BUSY_MESSAGE,
            ErrorKind::NetworkReset | ErrorKind::Upstream | ErrorKind::Unclassified => {
                GENERIC_MESSAGE
            }
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Permission => "permission",
            ErrorKind::Timeout => "timeout",
            ErrorKind::NotFound => "not_found",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::StorageBusy => "storage_busy",
            ErrorKind::Database => "database",
            ErrorKind::NetworkReset => "network_reset",
            ErrorKind::Upstream => "upstream",
            ErrorKind::Unclassified => "unclassified",
        };
        f.write_str(name)
    }
}

/// Error returned by a unit of work wrapped in the executor
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct OperationError {
    kind: ErrorKind,
    message: String,
    code: Option<String>,
    stack_trace: Option<String>,
}

impl OperationError {
    /// Build an error with an explicit kind
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            code: None,
            stack_trace: None,
        }
    }

    /// Build an error from free text, classifying it by keyword
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(ErrorKind::classify(&message), message)
    }

    /// Build an error from a provider status code
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::from_status(status), message).with_code(status.to_string())
    }

    /// Attach a machine-readable code (e.g. `SQLITE_BUSY`, `50013`).
    ///
    /// An unclassified error is re-classified against the code, and a
    /// `SQLITE_BUSY` code always marks the error as storage-busy.
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        let code = code.into();
        let coded = ErrorKind::classify(&code);
        if self.kind == ErrorKind::Unclassified || coded == ErrorKind::StorageBusy {
            self.kind = coded;
        }
        self.code = Some(code);
        self
    }

    pub fn with_stack_trace(mut self, stack_trace: impl Into<String>) -> Self {
        self.stack_trace = Some(stack_trace.into());
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn class(&self) -> ErrorClass {
        self.kind.class()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn stack_trace(&self) -> Option<&str> {
        self.stack_trace.as_deref()
    }

    /// True when `pattern` occurs in the message or the code
    pub fn contains(&self, pattern: &str) -> bool {
        self.message.contains(pattern)
            || self.code.as_deref().is_some_and(|code| code.contains(pattern))
    }

    pub fn user_message(&self) -> &'static str {
        self.kind.user_message()
    }
}

impl From<anyhow::Error> for OperationError {
    fn from(err: anyhow::Error) -> Self {
        // `{:#}` flattens the context chain so every layer is visible to the classifier
        let message = format!("{err:#}");
        Self::from_message(message).with_stack_trace(format!("{err:?}"))
    }
}

impl From<String> for OperationError {
    fn from(message: String) -> Self {
        Self::from_message(message)
    }
}

impl From<&str> for OperationError {
    fn from(message: &str) -> Self {
        Self::from_message(message)
    }
}
