//! Device seam: the comm server, the device loader and open device handles.
//!
//! The engine drives the OS communication subsystem exclusively through the
//! traits defined here, so a real backend and the in-crate mock can be used
//! interchangeably.

pub mod error;
pub mod mock;

pub use error::NativeError;
pub use mock::{DeviceFaults, MockCommServer, MockDeviceHandle};

use crate::settings::NativeSettings;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::oneshot;

/// Comm module that serves a family of device locations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommModule {
    /// Plain UART-backed RS-232.
    Rs232,
    Bluetooth,
    Infrared,
    /// USB CDC-ACM serial.
    UsbAcm,
}

impl CommModule {
    /// Classify a device location by the module identifier it contains.
    pub fn for_location(location: &str) -> Self {
        if location.contains("BTCOMM") {
            Self::Bluetooth
        } else if location.contains("IRCOMM") {
            Self::Infrared
        } else if location.contains("ACM") {
            Self::UsbAcm
        } else {
            Self::Rs232
        }
    }

    /// Name the comm server loads the module by.
    pub fn module_name(&self) -> &'static str {
        match self {
            Self::Rs232 => "ECUART",
            Self::Bluetooth => "BTCOMM",
            Self::Infrared => "IRCOMM",
            Self::UsbAcm => "ECACM",
        }
    }
}

impl fmt::Display for CommModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.module_name())
    }
}

bitflags! {
    /// Raw signal state as reported by the device.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct NativeSignals: u32 {
        const CTS = 1 << 0;
        const DSR = 1 << 1;
        const DCD = 1 << 2;
        const RNG = 1 << 3;
        const RTS = 1 << 4;
        const DTR = 1 << 5;
        /// Break condition; not surfaced as a line.
        const BREAK = 1 << 6;
    }
}

bitflags! {
    /// RS-232 control lines visible to the port object.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct SignalLines: u32 {
        const CTS = 1 << 0;
        const DSR = 1 << 1;
        const DCD = 1 << 2;
        const RI = 1 << 3;
        const RTS = 1 << 4;
        const DTR = 1 << 5;
    }
}

impl From<NativeSignals> for SignalLines {
    fn from(native: NativeSignals) -> Self {
        let mut lines = SignalLines::empty();
        lines.set(SignalLines::CTS, native.contains(NativeSignals::CTS));
        lines.set(SignalLines::DSR, native.contains(NativeSignals::DSR));
        lines.set(SignalLines::DCD, native.contains(NativeSignals::DCD));
        lines.set(SignalLines::RI, native.contains(NativeSignals::RNG));
        lines.set(SignalLines::RTS, native.contains(NativeSignals::RTS));
        lines.set(SignalLines::DTR, native.contains(NativeSignals::DTR));
        lines
    }
}

bitflags! {
    /// Which driver buffers a reset discards.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ResetBuffers: u32 {
        const RX = 1 << 0;
        const TX = 1 << 1;
    }
}

// ========== Asynchronous watches ==========

/// One-shot completion of an asynchronous device notification.
///
/// A `Watch` is a future that resolves once the device completes the
/// notification (data available, output empty), or with
/// [`NativeError::Cancelled`] if the device drops it.
#[derive(Debug)]
pub struct Watch {
    rx: oneshot::Receiver<Result<(), NativeError>>,
}

/// Device-side half of a [`Watch`].
#[derive(Debug)]
pub struct WatchCompleter {
    tx: oneshot::Sender<Result<(), NativeError>>,
}

/// Create a pending watch and the completer that resolves it.
pub fn watch() -> (WatchCompleter, Watch) {
    let (tx, rx) = oneshot::channel();
    (WatchCompleter { tx }, Watch { rx })
}

impl WatchCompleter {
    /// Resolve the watch. A watch nobody waits on anymore is ignored.
    pub fn complete(self, result: Result<(), NativeError>) {
        let _ = self.tx.send(result);
    }
}

impl Watch {
    /// A watch that is already resolved.
    pub fn ready(result: Result<(), NativeError>) -> Self {
        let (completer, watch) = watch();
        completer.complete(result);
        watch
    }

    /// Non-blocking check: `Some` once the watch has resolved.
    pub fn try_take(&mut self) -> Option<Result<(), NativeError>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(NativeError::Cancelled)),
        }
    }
}

impl Future for Watch {
    type Output = Result<(), NativeError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(NativeError::Cancelled)))
    }
}

// ========== Collaborator traits ==========

/// Brings the OS communication subsystem up.
pub trait DeviceLoader: Send + Sync {
    /// Load drivers and start the comm server if needed.
    ///
    /// Must be idempotent; returns `false` if the subsystem cannot be made
    /// ready.
    fn ensure_device_subsystem_ready(&self) -> bool;
}

/// Connection point to the OS communication server.
pub trait CommServer: Send + Sync {
    /// Connect to the comm server.
    fn connect(&self) -> Result<(), NativeError>;

    /// Load the module serving a family of locations.
    fn load_comm_module(&self, module: CommModule) -> Result<(), NativeError>;

    /// Open a device by name with exclusive access.
    ///
    /// The device is always opened for both reading and writing. Dropping
    /// the returned handle releases the exclusive lock.
    fn open_exclusive(&self, name: &str) -> Result<Box<dyn CommDevice>, NativeError>;
}

/// An exclusively owned open device.
///
/// Every method is a short blocking device call except `read`, `write` and
/// the two notifications, whose watches complete asynchronously.
pub trait CommDevice: Send + fmt::Debug {
    /// Read the current native settings.
    fn config(&self) -> Result<NativeSettings, NativeError>;

    /// Replace the native settings in one call.
    fn set_config(&mut self, settings: &NativeSettings) -> Result<(), NativeError>;

    /// Query raw signal state.
    fn signals(&self) -> Result<NativeSignals, NativeError>;

    /// Drive the given output signals high.
    fn set_signals_to_mark(&mut self, signals: NativeSignals) -> Result<(), NativeError>;

    /// Drive the given output signals low.
    fn set_signals_to_space(&mut self, signals: NativeSignals) -> Result<(), NativeError>;

    /// Discard buffered data.
    fn reset_buffers(&mut self, which: ResetBuffers) -> Result<(), NativeError>;

    /// Bytes waiting in the driver's receive buffer.
    fn query_receive_buffer(&self) -> Result<usize, NativeError>;

    /// Read into `buffer`, waiting at most `timeout` for data.
    ///
    /// With a zero timeout this returns whatever is already buffered.
    fn read(&mut self, buffer: &mut [u8], timeout: Duration) -> Result<usize, NativeError>;

    /// Write all of `data`, blocking until the transfer completes.
    fn write(&mut self, data: &[u8]) -> Result<usize, NativeError>;

    /// Arm a watch that completes when receive data is available.
    fn notify_data_available(&mut self) -> Watch;

    /// Cancel a pending data-available watch.
    fn cancel_data_available(&mut self);

    /// Arm a watch that completes when the transmit buffer is empty.
    fn notify_output_empty(&mut self) -> Watch;

    /// Cancel a pending output-empty watch.
    fn cancel_output_empty(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_classification() {
        assert_eq!(CommModule::for_location("BTCOMM::0"), CommModule::Bluetooth);
        assert_eq!(CommModule::for_location("IRCOMM::1"), CommModule::Infrared);
        assert_eq!(CommModule::for_location("ACM::0"), CommModule::UsbAcm);
        assert_eq!(CommModule::for_location("COMM::0"), CommModule::Rs232);
        assert_eq!(CommModule::for_location(""), CommModule::Rs232);
    }

    #[test]
    fn test_module_names() {
        assert_eq!(CommModule::Rs232.to_string(), "ECUART");
        assert_eq!(CommModule::UsbAcm.module_name(), "ECACM");
    }

    #[test]
    fn test_signal_translation() {
        let native = NativeSignals::CTS | NativeSignals::RNG | NativeSignals::BREAK;
        let lines = SignalLines::from(native);
        assert_eq!(lines, SignalLines::CTS | SignalLines::RI);

        let all = NativeSignals::all();
        assert_eq!(SignalLines::from(all), SignalLines::all());
        assert_eq!(SignalLines::from(NativeSignals::empty()), SignalLines::empty());
    }

    #[test]
    fn test_watch_completion() {
        let (completer, mut watch) = watch();
        assert!(watch.try_take().is_none());
        completer.complete(Ok(()));
        assert_eq!(watch.try_take(), Some(Ok(())));
    }

    #[test]
    fn test_dropped_completer_cancels_watch() {
        let (completer, mut watch) = watch();
        drop(completer);
        assert_eq!(watch.try_take(), Some(Err(NativeError::Cancelled)));
    }

    #[test]
    fn test_ready_watch() {
        let mut watch = Watch::ready(Err(NativeError::InUse));
        assert_eq!(watch.try_take(), Some(Err(NativeError::InUse)));
    }
}
