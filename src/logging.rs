//! Tracing subscriber setup for the CLI and embedding applications.
//!
//! The library itself only emits `tracing` events; installing a subscriber
//! is left to the binary. `RUST_LOG`, when set, takes precedence over the
//! configured level.

use crate::config::{LogFormat, LoggingConfig};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

/// Errors raised while installing the subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Invalid log filter '{directive}': {source}")]
    Filter {
        directive: String,
        #[source]
        source: tracing_subscriber::filter::ParseError,
    },

    #[error("Failed to open log file '{path}': {source}")]
    OpenFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A global subscriber is already installed.
    #[error("Failed to install subscriber: {0}")]
    Init(String),
}

/// Build the event filter: `RUST_LOG` if set, else the configured directive.
pub fn filter(level: &str) -> Result<EnvFilter, LoggingError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(level).map_err(|source| LoggingError::Filter {
        directive: level.to_string(),
        source,
    })
}

fn file_writer(path: &Path) -> Result<BoxMakeWriter, LoggingError> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| LoggingError::OpenFile {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(BoxMakeWriter::new(Mutex::new(file)))
}

/// Install the global fmt subscriber described by `config`.
pub fn init(config: &LoggingConfig) -> Result<(), LoggingError> {
    let filter = filter(&config.level)?;
    let (writer, ansi) = match &config.file {
        Some(path) => (file_writer(path)?, false),
        None => (BoxMakeWriter::new(std::io::stderr), true),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(ansi)
        .with_target(true);

    let installed = match config.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
    };
    installed.map_err(|e| LoggingError::Init(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_filter_from_level() {
        std::env::remove_var("RUST_LOG");
        assert!(filter("comm_port_engine=debug").is_ok());
    }

    #[test]
    fn test_log_file_in_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("engine.log");
        let err = file_writer(&path).unwrap_err();
        assert!(matches!(err, LoggingError::OpenFile { .. }));
    }

    #[test]
    fn test_log_file_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.log");
        file_writer(&path).unwrap();
        assert!(path.exists());
    }
}
