//! # Crate Error Types
//!
//! Each subsystem owns a focused error enum; `ResilienceError` is the umbrella
//! type for callers that compose several of them (startup wiring, config
//! tooling) and just want `?` to work.

use crate::cache::CacheError;
use crate::config::ConfigurationError;
use crate::outbound::OutboundError;
use crate::resilience::{AlertError, AuditError, ExecutorError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResilienceError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Executor error: {0}")]
    Executor(#[from] ExecutorError),

    #[error("Outbound error: {0}")]
    Outbound(#[from] OutboundError),

    #[error("Audit error: {0}")]
    Audit(#[from] AuditError),

    #[error("Alert error: {0}")]
    Alert(#[from] AlertError),
}

pub type Result<T> = std::result::Result<T, ResilienceError>;
