//! Configuration schema definitions.
//!
//! Every section carries `#[serde(default)]`, so a config file only needs
//! the keys it wants to change.

use super::error::{ConfigError, ConfigResult};
use crate::engine::PortOptions;
use crate::error::EngineError;
use crate::readiness::WaitTimeout;
use crate::settings::{to_native, DataBits, FlowControl, Parity, PortConfiguration, StopBits};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Root configuration structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Port opened by the CLI and its initial line settings
    pub port: PortDefaults,
    /// Readiness wait defaults
    pub readiness: ReadinessConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Config {
    /// Check that every section maps onto something the engine accepts.
    pub fn validate(&self) -> ConfigResult<()> {
        self.port.configuration()?;
        let level = self.logging.level.trim();
        let invalid = |source| ConfigError::LogLevel {
            level: level.to_string(),
            source,
        };
        if level.is_empty() {
            return Err(invalid(None));
        }
        EnvFilter::try_new(level).map_err(|e| invalid(Some(e)))?;
        Ok(())
    }
}

/// Port section: location, close behaviour and line settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortDefaults {
    /// Device location, e.g. `COMM::0` or `BTCOMM::0`
    pub location: String,
    /// Restore open-time settings when the port closes
    pub restore_settings_on_close: bool,
    /// Baud rate, applied to both directions
    pub rate: u32,
    /// Data bits per character (5-8)
    pub data_bits: u8,
    pub parity: Parity,
    /// Stop bits (1 or 2)
    pub stop_bits: u8,
    pub flow_control: FlowControl,
}

impl Default for PortDefaults {
    fn default() -> Self {
        Self {
            location: "COMM::0".to_string(),
            restore_settings_on_close: true,
            rate: 9600,
            data_bits: 8,
            parity: Parity::None,
            stop_bits: 1,
            flow_control: FlowControl::None,
        }
    }
}

impl PortDefaults {
    /// Options handed to the engine.
    pub fn port_options(&self) -> PortOptions {
        PortOptions {
            restore_settings_on_close: self.restore_settings_on_close,
        }
    }

    /// The configured line settings, checked against the native encoding.
    pub fn configuration(&self) -> ConfigResult<PortConfiguration> {
        let data_bits =
            DataBits::try_from(self.data_bits).map_err(ConfigError::port_setting("port.data_bits"))?;
        let stop_bits =
            StopBits::try_from(self.stop_bits).map_err(ConfigError::port_setting("port.stop_bits"))?;
        if self.parity == Parity::Unknown {
            return Err(ConfigError::port_setting("port.parity")(
                EngineError::unsupported("parity must be named explicitly"),
            ));
        }
        if self.flow_control == FlowControl::Unknown {
            return Err(ConfigError::port_setting("port.flow_control")(
                EngineError::unsupported("flow control must be named explicitly"),
            ));
        }

        let config = PortConfiguration {
            input_rate: self.rate,
            output_rate: self.rate,
            data_bits,
            parity: self.parity,
            stop_bits,
            flow_control: self.flow_control,
        };
        to_native(&config).map_err(ConfigError::port_setting("port.rate"))?;
        Ok(config)
    }
}

/// Readiness section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessConfig {
    /// Default wait in milliseconds; negative waits indefinitely
    pub default_timeout_ms: i64,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 1000,
        }
    }
}

impl ReadinessConfig {
    pub fn default_timeout(&self) -> WaitTimeout {
        WaitTimeout::from_millis(self.default_timeout_ms)
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, e.g. "info" or "comm_port_engine=debug"
    pub level: String,
    /// Log format: "json", "pretty", "compact"
    pub format: LogFormat,
    /// Append logs to this file instead of stderr
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            file: None,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format
    Json,
    /// Pretty format with colors
    #[default]
    Pretty,
    /// Compact format
    Compact,
}
