//! Configuration loader with file resolution and environment override support.

use super::error::{ConfigError, ConfigResult};
use super::schema::{Config, LogFormat};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, warn};

/// Environment variable prefix for overrides
const ENV_PREFIX: &str = "COMM_ENGINE";

/// Config file name
const CONFIG_FILE_NAME: &str = "comm-engine.toml";

/// Environment variable for explicit config path
const CONFIG_PATH_ENV: &str = "COMM_ENGINE_CONFIG";

/// Configuration loader with resolution and override logic.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Resolved config file path (if any)
    pub config_path: Option<PathBuf>,
    /// The loaded configuration
    pub config: Config,
}

impl ConfigLoader {
    /// Load configuration using standard resolution order.
    ///
    /// Resolution priority (highest to lowest):
    /// 1. `COMM_ENGINE_CONFIG` environment variable (explicit path)
    /// 2. `./comm-engine.toml` (current directory)
    /// 3. the platform config directory (`~/.config/comm-engine/` on Linux)
    /// 4. Built-in defaults (no file required)
    ///
    /// Environment variables can override any config file values.
    pub fn load() -> ConfigResult<Self> {
        let config_path = resolve_config_path()?;

        let mut config = match config_path {
            Some(ref path) => load_from_file(path)?,
            None => Config::default(),
        };

        apply_env_overrides(&mut config)?;

        Ok(Self {
            config_path,
            config,
        })
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(ConfigError::NotFound(path));
        }
        let mut config = load_from_file(&path)?;
        apply_env_overrides(&mut config)?;

        Ok(Self {
            config_path: Some(path),
            config,
        })
    }

    /// Create a loader with default configuration (no file).
    pub fn with_defaults() -> Self {
        let mut config = Config::default();
        // Still apply env overrides even with defaults
        if let Err(e) = apply_env_overrides(&mut config) {
            warn!(error = %e, "Ignoring invalid environment override");
        }

        Self {
            config_path: None,
            config,
        }
    }

    /// Get the loaded configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get a mutable reference to the configuration.
    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    /// Consume the loader and return the configuration.
    pub fn into_config(self) -> Config {
        self.config
    }

    /// Save the current configuration to file.
    pub fn save(&self) -> ConfigResult<()> {
        let path = self
            .config_path
            .as_ref()
            .ok_or(ConfigError::NoPath)?;

        save_to_file(&self.config, path)
    }

    /// Save the current configuration to a specific file.
    pub fn save_to(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        save_to_file(&self.config, path.as_ref())
    }

    /// Reload configuration from file (if path is set).
    pub fn reload(&mut self) -> ConfigResult<()> {
        if let Some(ref path) = self.config_path {
            self.config = load_from_file(path)?;
            apply_env_overrides(&mut self.config)?;
        }
        Ok(())
    }
}

/// Resolve the configuration file path using standard locations.
///
/// An explicit `COMM_ENGINE_CONFIG` that points nowhere is an error rather
/// than a silent fall-through to defaults.
pub fn resolve_config_path() -> ConfigResult<Option<PathBuf>> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(path);
        if !path.exists() {
            return Err(ConfigError::NotFound(path));
        }
        return Ok(Some(path));
    }

    let cwd_config = PathBuf::from(CONFIG_FILE_NAME);
    if cwd_config.exists() {
        return Ok(Some(cwd_config));
    }

    if let Some(app_config) = get_default_config_path() {
        if app_config.exists() {
            return Ok(Some(app_config));
        }
    }

    Ok(None)
}

/// Get the default config directory for creating new config files.
pub fn get_default_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "comm-engine").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the default config file path for creating new config files.
pub fn get_default_config_path() -> Option<PathBuf> {
    get_default_config_dir().map(|d| d.join(CONFIG_FILE_NAME))
}

/// Load configuration from a file.
fn load_from_file(path: &Path) -> ConfigResult<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;

    let config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), "Configuration loaded");
    Ok(config)
}

/// Save configuration to a file.
fn save_to_file(config: &Config, path: &Path) -> ConfigResult<()> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
            path: path.to_path_buf(),
            source: e,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|e| ConfigError::Write {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Read and parse `COMM_ENGINE_<key>`, if set.
fn env_override<T: FromStr>(key: &str, expected: &'static str) -> ConfigResult<Option<T>> {
    let var = format!("{ENV_PREFIX}_{key}");
    match std::env::var(&var) {
        Ok(val) => match val.trim().parse() {
            Ok(parsed) => Ok(Some(parsed)),
            Err(_) => Err(ConfigError::env_override(var, val, expected)),
        },
        Err(_) => Ok(None),
    }
}

fn parse_bool(val: &str) -> Option<bool> {
    match val.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_log_format(val: &str) -> Option<LogFormat> {
    match val.to_ascii_lowercase().as_str() {
        "json" => Some(LogFormat::Json),
        "pretty" => Some(LogFormat::Pretty),
        "compact" => Some(LogFormat::Compact),
        _ => None,
    }
}

/// Apply environment variable overrides to the configuration.
///
/// Environment variables follow the pattern: `COMM_ENGINE_<SECTION>_<KEY>`
/// For example:
/// - `COMM_ENGINE_PORT_LOCATION=BTCOMM::0`
/// - `COMM_ENGINE_PORT_RATE=115200`
/// - `COMM_ENGINE_LOGGING_FORMAT=json`
fn apply_env_overrides(config: &mut Config) -> ConfigResult<()> {
    // Port overrides
    if let Ok(val) = std::env::var(format!("{ENV_PREFIX}_PORT_LOCATION")) {
        config.port.location = val;
    }
    let var = format!("{ENV_PREFIX}_PORT_RESTORE_SETTINGS_ON_CLOSE");
    if let Ok(val) = std::env::var(&var) {
        config.port.restore_settings_on_close = parse_bool(&val)
            .ok_or_else(|| ConfigError::env_override(var, val.as_str(), "true or false"))?;
    }
    if let Some(rate) = env_override("PORT_RATE", "a baud rate")? {
        config.port.rate = rate;
    }
    if let Some(bits) = env_override("PORT_DATA_BITS", "a data bit count")? {
        config.port.data_bits = bits;
    }
    if let Some(parity) = env_override("PORT_PARITY", "a parity")? {
        config.port.parity = parity;
    }
    if let Some(bits) = env_override("PORT_STOP_BITS", "a stop bit count")? {
        config.port.stop_bits = bits;
    }
    if let Some(flow) = env_override("PORT_FLOW_CONTROL", "a flow control mode")? {
        config.port.flow_control = flow;
    }

    // Readiness overrides
    if let Some(ms) = env_override("READINESS_DEFAULT_TIMEOUT_MS", "a timeout in milliseconds")? {
        config.readiness.default_timeout_ms = ms;
    }

    // Logging overrides
    if let Ok(val) = std::env::var(format!("{ENV_PREFIX}_LOGGING_LEVEL")) {
        config.logging.level = val;
    }
    let var = format!("{ENV_PREFIX}_LOGGING_FORMAT");
    if let Ok(val) = std::env::var(&var) {
        config.logging.format = parse_log_format(&val)
            .ok_or_else(|| ConfigError::env_override(var, val.as_str(), "a log format"))?;
    }

    Ok(())
}
