//! Outbound call error types

use crate::resilience::OperationError;
use std::time::Duration;
use thiserror::Error;

/// Failure of a call to an external API
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OutboundError {
    /// The provider answered with a non-success status
    #[error("HTTP {status}: {message}")]
    Status {
        status: u16,
        message: String,
        /// Provider-supplied wait hint (e.g. `Retry-After`)
        retry_after: Option<Duration>,
    },

    /// The request never produced a response
    #[error("Transport error: {0}")]
    Transport(String),
}

impl OutboundError {
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        OutboundError::Status {
            status,
            message: message.into(),
            retry_after: None,
        }
    }

    /// A 429 response with an optional wait hint
    pub fn too_many_requests(retry_after: Option<Duration>) -> Self {
        OutboundError::Status {
            status: 429,
            message: "Too Many Requests".to_string(),
            retry_after,
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            OutboundError::Status { status, .. } => Some(*status),
            OutboundError::Transport(_) => None,
        }
    }
}

/// How the rate governor recognises a rate-limit response
pub trait RateLimitSignal {
    fn is_rate_limited(&self) -> bool;

    /// Provider wait hint, if any
    fn retry_after(&self) -> Option<Duration>;
}

impl RateLimitSignal for OutboundError {
    fn is_rate_limited(&self) -> bool {
        match self {
            OutboundError::Status {
                status, message, ..
            } => *status == 429 || message.to_lowercase().contains("too many requests"),
            OutboundError::Transport(_) => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            OutboundError::Status { retry_after, .. } => *retry_after,
            OutboundError::Transport(_) => None,
        }
    }
}

impl From<OutboundError> for OperationError {
    fn from(err: OutboundError) -> Self {
        match err {
            OutboundError::Status {
                status, message, ..
            } => OperationError::from_status(status, message),
            OutboundError::Transport(message) => OperationError::from_message(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::ErrorKind;

    #[test]
    fn test_rate_limit_detection() {
        assert!(OutboundError::too_many_requests(None).is_rate_limited());
        assert!(OutboundError::status(400, "too many requests for this route").is_rate_limited());
        assert!(!OutboundError::status(503, "unavailable").is_rate_limited());
        assert!(!OutboundError::Transport("ECONNRESET".into()).is_rate_limited());
        assert_eq!(
            OutboundError::too_many_requests(Some(Duration::from_millis(200))).retry_after(),
            Some(Duration::from_millis(200))
        );
    }

    #[test]
    fn test_conversion_into_operation_error() {
        let err: OperationError = OutboundError::status(503, "Service Unavailable").into();
        assert_eq!(err.kind(), ErrorKind::Upstream);
        assert_eq!(err.code(), Some("503"));

        let err: OperationError = OutboundError::Transport("read ECONNRESET".into()).into();
        assert_eq!(err.kind(), ErrorKind::NetworkReset);
    }
}
