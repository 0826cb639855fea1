//! Configuration failures.
//!
//! `[port]` values are checked with the engine's own settings validation,
//! so a refused key carries the [`EngineError`] that refused it.

use crate::error::EngineError;
use std::path::PathBuf;
use thiserror::Error;
use tracing_subscriber::filter::ParseError;

/// Errors raised while resolving, reading, checking or saving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// `COMM_ENGINE_CONFIG` or an explicit path names a missing file.
    #[error("Config file {} does not exist", .0.display())]
    NotFound(PathBuf),

    #[error("Cannot read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Cannot encode configuration: {0}")]
    Encode(#[from] toml::ser::Error),

    #[error("Cannot write config file {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The engine refuses a `[port]` value.
    #[error("Port setting '{key}' rejected: {source}")]
    PortSetting {
        key: &'static str,
        #[source]
        source: EngineError,
    },

    /// `[logging] level` is empty or not a filter directive.
    #[error("Invalid logging level '{level}'")]
    LogLevel {
        level: String,
        #[source]
        source: Option<ParseError>,
    },

    /// A `COMM_ENGINE_*` variable holds a value of the wrong shape.
    #[error("Environment variable {var}={value:?} is not {expected}")]
    EnvOverride {
        var: String,
        value: String,
        expected: &'static str,
    },

    /// `save` on a loader that was not loaded from a file.
    #[error("No config file to save to")]
    NoPath,
}

impl ConfigError {
    pub(crate) fn port_setting(key: &'static str) -> impl FnOnce(EngineError) -> Self {
        move |source| Self::PortSetting { key, source }
    }

    pub(crate) fn env_override(
        var: impl Into<String>,
        value: impl Into<String>,
        expected: &'static str,
    ) -> Self {
        Self::EnvOverride {
            var: var.into(),
            value: value.into(),
            expected,
        }
    }
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PortErrorKind;
    use std::error::Error as _;

    #[test]
    fn test_port_setting_keeps_engine_cause() {
        let err = ConfigError::port_setting("port.rate")(EngineError::unsupported(
            "rate 14400 is not a standard rate",
        ));
        assert_eq!(
            err.to_string(),
            "Port setting 'port.rate' rejected: Unsupported operation: rate 14400 is not a standard rate"
        );

        let cause = err
            .source()
            .and_then(|e| e.downcast_ref::<EngineError>())
            .expect("engine error is the source");
        assert_eq!(cause.kind(), PortErrorKind::UnsupportedOperation);
    }

    #[test]
    fn test_env_override_message() {
        let err = ConfigError::env_override("COMM_ENGINE_PORT_RATE", "fast", "a baud rate");
        assert_eq!(
            err.to_string(),
            "Environment variable COMM_ENGINE_PORT_RATE=\"fast\" is not a baud rate"
        );
        assert!(err.source().is_none());
    }

    #[test]
    fn test_not_found_message() {
        let err = ConfigError::NotFound(PathBuf::from("/etc/comm-engine.toml"));
        assert_eq!(
            err.to_string(),
            "Config file /etc/comm-engine.toml does not exist"
        );
    }
}
