//! Configuration Loader
//!
//! Layers, lowest precedence first: built-in defaults, an optional TOML file,
//! then `RESILIENCE__<SECTION>__<FIELD>` environment variables.

use super::error::{ConfigResult, ConfigurationError};
use super::ResilienceConfig;
use std::path::Path;
use tracing::{debug, info};

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "RESILIENCE";

/// Separator between nested keys in environment overrides
pub const ENV_SEPARATOR: &str = "__";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from an optional file plus environment overrides, then validate
    pub fn load(path: Option<&Path>) -> ConfigResult<ResilienceConfig> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            if !path.exists() {
                return Err(ConfigurationError::FileNotFound {
                    path: path.to_path_buf(),
                });
            }
            debug!(path = %path.display(), "Adding configuration file source");
            builder = builder.add_source(config::File::from(path).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator(ENV_SEPARATOR)
                .separator(ENV_SEPARATOR)
                .try_parsing(true),
        );

        let source_name = path
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "environment".to_string());

        let layered = builder
            .build()
            .map_err(|e| ConfigurationError::load_error(source_name, e))?;

        let config: ResilienceConfig =
            layered
                .try_deserialize()
                .map_err(|e| ConfigurationError::DeserializeError {
                    error: e.to_string(),
                })?;

        config.validate()?;

        info!(
            failure_threshold = config.executor.failure_threshold,
            reset_timeout_ms = config.executor.reset_timeout_ms,
            distributed_cache = config.distributed_cache.url.is_some(),
            default_wait_ms = config.rate_governor.default_wait_ms,
            "Resilience configuration loaded"
        );

        Ok(config)
    }

    /// Parse configuration from a TOML string (no environment layering)
    pub fn from_toml_str(contents: &str) -> ConfigResult<ResilienceConfig> {
        let layered = config::Config::builder()
            .add_source(config::File::from_str(contents, config::FileFormat::Toml))
            .build()
            .map_err(|e| ConfigurationError::load_error("inline toml", e))?;

        let config: ResilienceConfig =
            layered
                .try_deserialize()
                .map_err(|e| ConfigurationError::DeserializeError {
                    error: e.to_string(),
                })?;

        config.validate()?;
        Ok(config)
    }
}
