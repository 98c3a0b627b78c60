//! Configuration loading from disk.

use super::schema::AppConfig;
use super::validation::{ValidationError, validate_config};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse and validate a TOML document.
pub fn parse_config(content: &str) -> Result<Arc<AppConfig>, ConfigError> {
    let config: AppConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(Arc::new(config))
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<Arc<AppConfig>, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_config(&content)
}

/// Load from `path` when it exists, otherwise fall back to validated defaults.
pub fn load_or_default(path: &Path) -> Result<Arc<AppConfig>, ConfigError> {
    if path.exists() {
        return load_config(path);
    }
    tracing::warn!(path = %path.display(), "Config file not found, using defaults");
    let config = AppConfig::default();
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(Arc::new(config))
}
