//! Cache error types

use thiserror::Error;

/// Errors that can occur during cache operations
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// Failed to connect to, or lost the connection to, the cache backend
    #[error("Cache connection error: {0}")]
    ConnectionError(String),

    /// Failed to serialize or deserialize cache value
    #[error("Cache serialization error: {0}")]
    SerializationError(String),

    /// Cache operation timed out
    #[error("Cache operation timed out: {0}")]
    Timeout(String),

    /// Generic backend error
    #[error("Cache backend error: {0}")]
    BackendError(String),
}

impl CacheError {
    /// Errors after which the backend connection should be considered gone
    pub fn is_connection_loss(&self) -> bool {
        matches!(self, CacheError::ConnectionError(_) | CacheError::Timeout(_))
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::SerializationError(err.to_string())
    }
}

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;
