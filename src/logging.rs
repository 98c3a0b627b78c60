//! Tracing subscriber setup

use crate::config::LoggingConfig;
use thiserror::Error;
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    filter::ParseError,
    fmt::{self, writer::BoxMakeWriter},
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
};

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log filter: {0}")]
    Filter(#[from] ParseError),

    #[error("logging already initialized: {0}")]
    AlreadyInitialized(#[from] TryInitError),
}

/// Filter from `RUST_LOG` when set, else from `logging.level`
pub fn env_filter(config: &LoggingConfig) -> Result<EnvFilter, ParseError> {
    EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.level))
}

fn make_writer(output: &str) -> BoxMakeWriter {
    match output {
        "stderr" => BoxMakeWriter::new(std::io::stderr),
        _ => BoxMakeWriter::new(std::io::stdout),
    }
}

fn fmt_layer(config: &LoggingConfig) -> Box<dyn Layer<Registry> + Send + Sync> {
    let writer = make_writer(&config.output);
    match config.format.as_str() {
        "pretty" => fmt::layer().pretty().with_writer(writer).boxed(),
        "compact" => fmt::layer().compact().with_target(false).with_writer(writer).boxed(),
        _ => fmt::layer()
            .json()
            .with_current_span(false)
            .with_file(true)
            .with_line_number(true)
            .with_writer(writer)
            .boxed(),
    }
}

/// Install the global subscriber
///
/// Fails if a subscriber is already installed; callers that may run twice
/// can ignore `AlreadyInitialized`.
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingError> {
    let filter = env_filter(config)?;
    tracing_subscriber::registry()
        .with(fmt_layer(config))
        .with(filter)
        .try_init()?;

    tracing::debug!(
        level = %config.level,
        format = %config.format,
        output = %config.output,
        "Logging initialized"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_from_config_level() {
        let config = LoggingConfig {
            level: "keelson=debug,tower=warn".to_string(),
            ..LoggingConfig::default()
        };
        assert!(EnvFilter::try_new(&config.level).is_ok());
    }

    #[test]
    fn test_invalid_filter_is_rejected() {
        assert!(EnvFilter::try_new("keelson=loud").is_err());
    }

    #[test]
    fn test_second_init_reports_already_initialized() {
        let config = LoggingConfig {
            format: "compact".to_string(),
            output: "stderr".to_string(),
            ..LoggingConfig::default()
        };
        if init_logging(&config).is_ok() {
            assert!(matches!(
                init_logging(&config),
                Err(LoggingError::AlreadyInitialized(_))
            ));
        }
    }
}
