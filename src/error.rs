//! Engine error taxonomy.
//!
//! Every device failure is translated at the engine boundary into exactly
//! one [`EngineError`], and every `EngineError` belongs to exactly one
//! [`PortErrorKind`] from the port object's fixed vocabulary.

use crate::device::{CommModule, NativeError};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Error categories surfaced to the owning port object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortErrorKind {
    /// Unclassified device or subsystem failure.
    UnknownPortError,
    /// The location does not resolve to a device.
    NoSuchDeviceError,
    /// Access or exclusive lock denied.
    PermissionDeniedError,
    /// The requested value or combination is not representable on the device.
    UnsupportedOperation,
    /// A read or write transfer failed.
    IoError,
}

impl fmt::Display for PortErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::UnknownPortError => "unknown port error",
            Self::NoSuchDeviceError => "no such device",
            Self::PermissionDeniedError => "permission denied",
            Self::UnsupportedOperation => "unsupported operation",
            Self::IoError => "i/o error",
        };
        f.write_str(name)
    }
}

/// Errors returned by engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The device loader could not bring the comm subsystem up.
    #[error("Communication subsystem is not available")]
    SubsystemUnavailable,

    /// Connecting to the comm server failed.
    #[error("Failed to connect to the comm server: {0}")]
    Connect(#[source] NativeError),

    /// The comm module serving the location could not be loaded.
    #[error("Failed to load comm module {module}: {source}")]
    LoadModule {
        module: CommModule,
        #[source]
        source: NativeError,
    },

    /// The location does not name a device.
    #[error("No such device: {location}")]
    NoSuchDevice {
        location: String,
        #[source]
        source: NativeError,
    },

    /// The device exists but exclusive access was refused.
    #[error("Access to {location} denied: {source}")]
    PermissionDenied {
        location: String,
        #[source]
        source: NativeError,
    },

    /// Opening the device failed for another reason.
    #[error("Failed to open {location}: {source}")]
    Open {
        location: String,
        #[source]
        source: NativeError,
    },

    /// The native configuration could not be read back after open.
    #[error("Failed to read device configuration: {0}")]
    ReadConfig(#[source] NativeError),

    /// The engine already owns an open device.
    #[error("Port is already open")]
    AlreadyOpen,

    /// The operation requires an open device.
    #[error("Port is not open")]
    NotOpen,

    /// A value or operation the device cannot represent.
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// The device refused a configuration that passed validation.
    #[error("Device rejected configuration: {0}")]
    Rejected(#[source] NativeError),

    /// A short device request (signals, buffers) failed.
    #[error("Device request failed: {0}")]
    Device(#[source] NativeError),

    /// A transfer or readiness watch failed.
    #[error("I/O error: {0}")]
    Io(#[source] NativeError),

    /// The readiness runtime could not be created.
    #[error("Failed to create readiness runtime: {0}")]
    Runtime(#[source] std::io::Error),

    /// A blocking readiness wait was requested from inside an async runtime.
    #[error("Readiness wait called from inside an async runtime")]
    NestedRuntime,
}

impl EngineError {
    /// Create an `Unsupported` error from a message.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported(message.into())
    }

    /// The port-level category of this error.
    pub fn kind(&self) -> PortErrorKind {
        match self {
            Self::NoSuchDevice { .. } => PortErrorKind::NoSuchDeviceError,
            Self::PermissionDenied { .. } => PortErrorKind::PermissionDeniedError,
            Self::Unsupported(_) | Self::Rejected(_) => PortErrorKind::UnsupportedOperation,
            Self::Io(_) => PortErrorKind::IoError,
            Self::SubsystemUnavailable
            | Self::Connect(_)
            | Self::LoadModule { .. }
            | Self::Open { .. }
            | Self::ReadConfig(_)
            | Self::AlreadyOpen
            | Self::NotOpen
            | Self::Device(_)
            | Self::Runtime(_)
            | Self::NestedRuntime => PortErrorKind::UnknownPortError,
        }
    }
}

/// Result alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
