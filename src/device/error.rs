//! Native device error classes.
//!
//! These are the failures a comm server or device handle reports. The
//! engine translates them into [`EngineError`](crate::error::EngineError)
//! at its boundary and never shows them to the port object directly.

use thiserror::Error;

/// Errors reported by the comm server or an open device.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NativeError {
    /// No device or module with that name exists.
    #[error("Not found")]
    NotFound,

    /// The caller lacks the capability to use the device.
    #[error("Permission denied")]
    PermissionDenied,

    /// The device refused access.
    #[error("Access denied")]
    AccessDenied,

    /// The device is locked by another client.
    #[error("Locked")]
    Locked,

    /// The device or request slot is already in use.
    #[error("In use")]
    InUse,

    /// The request is not supported by the driver.
    #[error("Not supported")]
    NotSupported,

    /// The request did not complete in time.
    #[error("Timed out")]
    TimedOut,

    /// The request was cancelled before it completed.
    #[error("Cancelled")]
    Cancelled,

    /// The device went away.
    #[error("Disconnected")]
    Disconnected,

    /// Any other driver error code.
    #[error("Device error code {0}")]
    General(i32),
}

impl NativeError {
    /// Whether the error means access to an existing device was refused.
    pub fn is_access_class(&self) -> bool {
        matches!(
            self,
            Self::PermissionDenied | Self::AccessDenied | Self::Locked | Self::InUse
        )
    }

    /// Whether the error means the device is not present.
    pub fn is_absent_class(&self) -> bool {
        matches!(self, Self::NotFound | Self::Disconnected)
    }
}
