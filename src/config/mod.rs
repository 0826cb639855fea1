//! Configuration for the engine and the `comm-engine` CLI.
//!
//! This module provides TOML-based configuration with environment variable overrides.
//!
//! # Configuration Resolution
//!
//! Configuration is loaded from the following locations (in order of priority):
//!
//! 1. `COMM_ENGINE_CONFIG` environment variable (explicit path)
//! 2. `./comm-engine.toml` (current directory)
//! 3. `comm-engine.toml` in the platform config directory
//! 4. Built-in defaults (no file required)
//!
//! # Environment Overrides
//!
//! Any configuration value can be overridden via environment variables.
//! The pattern is: `COMM_ENGINE_<SECTION>_<KEY>`
//!
//! Examples:
//! - `COMM_ENGINE_PORT_LOCATION=IRCOMM::0`
//! - `COMM_ENGINE_PORT_RATE=115200`
//! - `COMM_ENGINE_READINESS_DEFAULT_TIMEOUT_MS=-1`
//!
//! # Example
//!
//! ```rust,no_run
//! use comm_port_engine::config::ConfigLoader;
//!
//! let loader = ConfigLoader::load()?;
//! let config = loader.config();
//!
//! println!("Port: {}", config.port.location);
//! println!("Line: {:?}", config.port.configuration()?);
//! # Ok::<(), comm_port_engine::config::ConfigError>(())
//! ```

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{
    get_default_config_dir, get_default_config_path, resolve_config_path, ConfigLoader,
};
pub use schema::{Config, LogFormat, LoggingConfig, PortDefaults, ReadinessConfig};
