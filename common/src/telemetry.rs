//! Tracing initialization from engine configuration

use crate::config::{EngineConfig, LogFormat};
use std::fs::File;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Errors raised while wiring up the tracing subscriber.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The configured log level did not parse as a filter directive
    #[error("invalid log level '{0}'")]
    InvalidLevel(String),
    /// The configured log file could not be opened
    #[error("failed to open log file: {0}")]
    LogFile(#[from] std::io::Error),
    /// A global subscriber was already installed
    #[error("failed to install tracing subscriber: {0}")]
    Init(String),
}

/// Install the global tracing subscriber described by the configuration.
///
/// Level comes from `log_level` (env-filter syntax, so per-target
/// directives work too), format from `log_format`, and output goes to
/// the configured file when `log_file` is set, otherwise to stdout.
/// Call once at startup; a second call fails with [`TelemetryError::Init`].
pub fn init(config: &EngineConfig) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_new(config.log_level.to_lowercase())
        .map_err(|_| TelemetryError::InvalidLevel(config.log_level.clone()))?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let result = match (&config.log_format, &config.log_file) {
        (LogFormat::Json, Some(path)) => {
            let file = Arc::new(File::create(path)?);
            builder.json().with_writer(file).try_init()
        }
        (LogFormat::Json, None) => builder.json().try_init(),
        (LogFormat::Text, Some(path)) => {
            let file = Arc::new(File::create(path)?);
            builder.with_writer(file).try_init()
        }
        (LogFormat::Text, None) => builder.try_init(),
    };

    result.map_err(|e| TelemetryError::Init(e.to_string()))?;
    info!(log_level = %config.log_level, format = ?config.log_format, "telemetry initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_level_is_rejected() {
        let config = EngineConfig { log_level: "not-a-level!!".to_string(), ..Default::default() };
        assert!(matches!(init(&config), Err(TelemetryError::InvalidLevel(_))));
    }
}
