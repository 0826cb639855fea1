use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::device::{CommDevice, SignalLines};
use crate::settings::{from_native, NativeSettings, PortConfiguration};

/// Options supplied by the owning port object.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortOptions {
    /// Write the settings captured at open time back to the device on close.
    #[serde(default = "default_restore_settings_on_close")]
    pub restore_settings_on_close: bool,
}

/// Default for [`PortOptions::restore_settings_on_close`] (true).
pub fn default_restore_settings_on_close() -> bool {
    true
}

impl Default for PortOptions {
    fn default() -> Self {
        Self {
            restore_settings_on_close: default_restore_settings_on_close(),
        }
    }
}

/// Requested open mode. Advisory: devices are always opened read/write.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OpenMode {
    ReadOnly,
    WriteOnly,
    #[default]
    ReadWrite,
}

/// Per-open-port state. Created by a successful open, dropped on close;
/// dropping it releases the exclusive device handle.
#[derive(Debug)]
pub struct EngineState {
    location: String,
    pub(super) device: Box<dyn CommDevice>,
    /// Settings found on the device at open time.
    saved: NativeSettings,
    /// Settings last accepted by the device.
    current: NativeSettings,
    /// Portable shadow of `current`.
    detected: PortConfiguration,
    last_lines: SignalLines,
    opened_at: Instant,
}

impl EngineState {
    pub(super) fn new(location: &str, device: Box<dyn CommDevice>, saved: NativeSettings) -> Self {
        Self {
            location: location.to_string(),
            device,
            saved,
            current: saved,
            detected: from_native(&saved),
            last_lines: SignalLines::empty(),
            opened_at: Instant::now(),
        }
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn saved(&self) -> &NativeSettings {
        &self.saved
    }

    pub fn current(&self) -> &NativeSettings {
        &self.current
    }

    pub fn detected(&self) -> &PortConfiguration {
        &self.detected
    }

    /// Signal mask from the most recent successful line query.
    pub fn last_lines(&self) -> SignalLines {
        self.last_lines
    }

    pub fn opened_at(&self) -> Instant {
        self.opened_at
    }

    /// Record settings the device has accepted.
    pub(super) fn commit(&mut self, settings: NativeSettings) {
        self.current = settings;
        self.detected = from_native(&settings);
    }

    pub(super) fn set_last_lines(&mut self, lines: SignalLines) {
        self.last_lines = lines;
    }
}
