//! Comm Port Engine Library
//!
//! Exclusive-open serial port engine over a comm-server style device
//! subsystem: settings discovery and restore, portable/native settings
//! translation, signal control and a blocking readiness multiplexer.
//!
//! # Modules
//!
//! - `rates`: Standard baud rates and their native rate codes
//! - `settings`: Portable port configuration and the native settings record
//! - `device`: Comm server, device loader and device handle traits, plus a mock backend
//! - `readiness`: Blocking wait-any over read, write and timer sources
//! - `engine`: Lifecycle controller (`CommEngine`) and the `PortEngine` trait
//! - `error`: Engine error taxonomy
//! - `config`: Configuration management with TOML support
//! - `logging`: Tracing subscriber setup
//!
//! # Example
//!
//! ```
//! use comm_port_engine::device::MockCommServer;
//! use comm_port_engine::engine::{CommEngine, OpenMode, PortEngine, PortOptions};
//! use comm_port_engine::settings::{Direction, NativeSettings};
//!
//! let server = MockCommServer::new().with_device("COMM::0", NativeSettings::default());
//! let mut engine = CommEngine::with_mock(&server, PortOptions::default());
//!
//! engine.open("COMM::0", OpenMode::ReadWrite)?;
//! engine.set_rate(115200, Direction::All)?;
//! assert_eq!(engine.configuration().map(|c| c.input_rate), Some(115200));
//! engine.close();
//! # Ok::<(), comm_port_engine::EngineError>(())
//! ```

pub mod config;
pub mod device;
pub mod engine;
pub mod error;
pub mod logging;
pub mod rates;
pub mod readiness;
pub mod settings;

// Re-export commonly used types for convenience
pub use device::{CommDevice, CommServer, DeviceLoader, MockCommServer, NativeError, SignalLines};
pub use engine::{CommEngine, DataErrorPolicy, OpenMode, PortEngine, PortOptions};
pub use error::{EngineError, EngineResult, PortErrorKind};
pub use readiness::{ReadinessOutcome, ReadinessRequest, WaitTimeout};
pub use settings::{
    DataBits, Direction, FlowControl, NativeSettings, Parity, PortConfiguration, PortSetting,
    StopBits,
};

// Re-export config types
pub use config::{Config, ConfigError, ConfigLoader, ConfigResult};
