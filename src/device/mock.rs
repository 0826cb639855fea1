//! Mock comm server for testing.
//!
//! `MockCommServer` simulates the OS communication subsystem without any
//! hardware: a set of named devices with native settings, signal lines, a
//! receive queue and a transmit buffer. Tests (or another thread) drive the
//! simulated far end through a [`MockDeviceHandle`], e.g. injecting receive
//! data while the engine is blocked in a readiness wait.

use super::{
    watch, CommDevice, CommModule, CommServer, DeviceLoader, NativeError, NativeSignals,
    ResetBuffers, Watch, WatchCompleter,
};
use crate::settings::NativeSettings;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

/// Injected device failures. `None` means the call succeeds.
#[derive(Debug, Clone, Default)]
pub struct DeviceFaults {
    pub config_read: Option<NativeError>,
    pub set_config: Option<NativeError>,
    pub signals_query: Option<NativeError>,
    pub signals_set: Option<NativeError>,
    pub reset: Option<NativeError>,
    pub read: Option<NativeError>,
    pub write: Option<NativeError>,
}

/// Simulated state of one device.
#[derive(Debug)]
struct MockDeviceState {
    config: NativeSettings,
    signals: NativeSignals,
    rx: VecDeque<u8>,
    tx_log: Vec<Vec<u8>>,
    /// Bytes written but not yet "transmitted".
    tx_pending: usize,
    /// Keep written bytes pending until `drain_output` is called.
    hold_output: bool,
    open: bool,
    data_waiter: Option<WatchCompleter>,
    output_waiter: Option<WatchCompleter>,
    data_watches_armed: usize,
    output_watches_armed: usize,
    cancellations: usize,
    set_config_calls: usize,
    resets: usize,
    faults: DeviceFaults,
}

impl MockDeviceState {
    fn new(config: NativeSettings) -> Self {
        Self {
            config,
            signals: NativeSignals::empty(),
            rx: VecDeque::new(),
            tx_log: Vec::new(),
            tx_pending: 0,
            hold_output: false,
            open: false,
            data_waiter: None,
            output_waiter: None,
            data_watches_armed: 0,
            output_watches_armed: 0,
            cancellations: 0,
            set_config_calls: 0,
            resets: 0,
            faults: DeviceFaults::default(),
        }
    }

    fn fire_data_waiter(&mut self) {
        if !self.rx.is_empty() {
            if let Some(waiter) = self.data_waiter.take() {
                waiter.complete(Ok(()));
            }
        }
    }

    fn fire_output_waiter(&mut self) {
        if self.tx_pending == 0 {
            if let Some(waiter) = self.output_waiter.take() {
                waiter.complete(Ok(()));
            }
        }
    }
}

/// Simulated comm subsystem.
#[derive(Debug)]
struct MockServerState {
    subsystem_ready: bool,
    readiness_checks: usize,
    connect_error: Option<NativeError>,
    module_error: Option<NativeError>,
    open_error: Option<NativeError>,
    loaded_modules: Vec<CommModule>,
    devices: HashMap<String, MockDeviceState>,
}

/// Mock comm server and device loader.
///
/// Clones share the same simulated subsystem.
///
/// # Example
/// ```
/// use comm_port_engine::device::{CommServer, MockCommServer};
/// use comm_port_engine::settings::NativeSettings;
///
/// let server = MockCommServer::new().with_device("COMM::0", NativeSettings::default());
/// let device = server.open_exclusive("COMM::0").unwrap();
///
/// // A second exclusive open is refused while the first handle lives.
/// assert!(server.open_exclusive("COMM::0").is_err());
/// drop(device);
/// assert!(server.open_exclusive("COMM::0").is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct MockCommServer {
    state: Arc<Mutex<MockServerState>>,
}

impl Default for MockCommServer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCommServer {
    /// Create a ready subsystem with no devices.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockServerState {
                subsystem_ready: true,
                readiness_checks: 0,
                connect_error: None,
                module_error: None,
                open_error: None,
                loaded_modules: Vec::new(),
                devices: HashMap::new(),
            })),
        }
    }

    /// Builder form of [`add_device`](Self::add_device).
    pub fn with_device(self, name: impl Into<String>, config: NativeSettings) -> Self {
        self.add_device(name, config);
        self
    }

    /// Register a device with its power-on settings.
    pub fn add_device(&self, name: impl Into<String>, config: NativeSettings) -> MockDeviceHandle {
        let name = name.into();
        self.state
            .lock()
            .devices
            .insert(name.clone(), MockDeviceState::new(config));
        MockDeviceHandle {
            name,
            state: Arc::clone(&self.state),
        }
    }

    /// Handle to a registered device.
    pub fn device(&self, name: &str) -> Option<MockDeviceHandle> {
        self.state
            .lock()
            .devices
            .contains_key(name)
            .then(|| MockDeviceHandle {
                name: name.to_string(),
                state: Arc::clone(&self.state),
            })
    }

    /// Whether `ensure_device_subsystem_ready` succeeds.
    pub fn set_subsystem_ready(&self, ready: bool) {
        self.state.lock().subsystem_ready = ready;
    }

    /// Make `connect` fail with `error`, or succeed again with `None`.
    pub fn set_connect_error(&self, error: Option<NativeError>) {
        self.state.lock().connect_error = error;
    }

    /// Make `load_comm_module` fail with `error`, or succeed again with `None`.
    pub fn set_module_error(&self, error: Option<NativeError>) {
        self.state.lock().module_error = error;
    }

    /// Make `open_exclusive` fail with `error` for any registered device,
    /// or succeed again with `None`. Unknown names still report `NotFound`.
    pub fn set_open_error(&self, error: Option<NativeError>) {
        self.state.lock().open_error = error;
    }

    /// Modules loaded so far, in load order.
    pub fn loaded_modules(&self) -> Vec<CommModule> {
        self.state.lock().loaded_modules.clone()
    }

    /// How many times the loader was asked to bring the subsystem up.
    pub fn readiness_checks(&self) -> usize {
        self.state.lock().readiness_checks
    }
}

impl DeviceLoader for MockCommServer {
    fn ensure_device_subsystem_ready(&self) -> bool {
        let mut state = self.state.lock();
        state.readiness_checks += 1;
        state.subsystem_ready
    }
}

impl CommServer for MockCommServer {
    fn connect(&self) -> Result<(), NativeError> {
        match self.state.lock().connect_error.clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn load_comm_module(&self, module: CommModule) -> Result<(), NativeError> {
        let mut state = self.state.lock();
        if let Some(e) = state.module_error.clone() {
            return Err(e);
        }
        if !state.loaded_modules.contains(&module) {
            state.loaded_modules.push(module);
        }
        Ok(())
    }

    fn open_exclusive(&self, name: &str) -> Result<Box<dyn CommDevice>, NativeError> {
        let mut state = self.state.lock();
        let open_error = state.open_error.clone();
        let device = state.devices.get_mut(name).ok_or(NativeError::NotFound)?;
        if let Some(e) = open_error {
            return Err(e);
        }
        if device.open {
            return Err(NativeError::InUse);
        }
        device.open = true;
        Ok(Box::new(MockDevice {
            name: name.to_string(),
            state: Arc::clone(&self.state),
        }))
    }
}

/// Test-side view of one simulated device.
#[derive(Debug, Clone)]
pub struct MockDeviceHandle {
    name: String,
    state: Arc<Mutex<MockServerState>>,
}

impl MockDeviceHandle {
    fn with<R: Default>(&self, f: impl FnOnce(&mut MockDeviceState) -> R) -> R {
        let mut state = self.state.lock();
        state.devices.get_mut(&self.name).map(f).unwrap_or_default()
    }

    /// Device name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether a handle to the device is currently open.
    pub fn is_open(&self) -> bool {
        self.with(|dev| dev.open)
    }

    /// Current native settings, regardless of open state.
    pub fn config(&self) -> NativeSettings {
        let state = self.state.lock();
        state
            .devices
            .get(&self.name)
            .map(|dev| dev.config)
            .unwrap_or_default()
    }

    /// Overwrite the native settings, as another client would.
    pub fn set_config(&self, config: NativeSettings) {
        self.with(|dev| dev.config = config);
    }

    /// Current raw signal state.
    pub fn signals(&self) -> NativeSignals {
        let state = self.state.lock();
        state
            .devices
            .get(&self.name)
            .map(|dev| dev.signals)
            .unwrap_or(NativeSignals::empty())
    }

    /// Set or clear input lines driven by the far end (CTS, DSR, DCD, RNG).
    pub fn set_input_lines(&self, lines: NativeSignals, asserted: bool) {
        self.with(|dev| dev.signals.set(lines, asserted));
    }

    /// Deliver bytes from the far end; completes a pending data watch.
    pub fn inject_read(&self, data: &[u8]) {
        self.with(|dev| {
            dev.rx.extend(data);
            dev.fire_data_waiter();
        });
    }

    /// Keep written bytes in the transmit buffer until drained.
    pub fn set_hold_output(&self, hold: bool) {
        self.with(|dev| dev.hold_output = hold);
    }

    /// Finish transmitting; completes a pending output-empty watch.
    pub fn drain_output(&self) {
        self.with(|dev| {
            dev.tx_pending = 0;
            dev.fire_output_waiter();
        });
    }

    /// Install failure injection for subsequent calls.
    pub fn set_faults(&self, faults: DeviceFaults) {
        self.with(|dev| dev.faults = faults);
    }

    /// Everything written, one entry per write call.
    pub fn write_log(&self) -> Vec<Vec<u8>> {
        self.with(|dev| dev.tx_log.clone())
    }

    /// Bytes still queued for reading.
    pub fn pending_rx(&self) -> usize {
        self.with(|dev| dev.rx.len())
    }

    /// Number of data-available watches armed so far.
    pub fn data_watches_armed(&self) -> usize {
        self.with(|dev| dev.data_watches_armed)
    }

    /// Number of output-empty watches armed so far.
    pub fn output_watches_armed(&self) -> usize {
        self.with(|dev| dev.output_watches_armed)
    }

    /// Number of explicit watch cancellations.
    pub fn cancellations(&self) -> usize {
        self.with(|dev| dev.cancellations)
    }

    /// Whether any watch is still outstanding on the device.
    pub fn has_pending_watch(&self) -> bool {
        self.with(|dev| dev.data_waiter.is_some() || dev.output_waiter.is_some())
    }

    /// Number of `set_config` calls that reached the device.
    pub fn set_config_calls(&self) -> usize {
        self.with(|dev| dev.set_config_calls)
    }

    /// Number of buffer resets.
    pub fn resets(&self) -> usize {
        self.with(|dev| dev.resets)
    }
}

/// An open simulated device.
#[derive(Debug)]
struct MockDevice {
    name: String,
    state: Arc<Mutex<MockServerState>>,
}

impl MockDevice {
    fn with<R>(&self, f: impl FnOnce(&mut MockDeviceState) -> Result<R, NativeError>) -> Result<R, NativeError> {
        let mut state = self.state.lock();
        match state.devices.get_mut(&self.name) {
            Some(dev) => f(dev),
            None => Err(NativeError::Disconnected),
        }
    }
}

fn check(fault: &Option<NativeError>) -> Result<(), NativeError> {
    match fault {
        Some(e) => Err(e.clone()),
        None => Ok(()),
    }
}

impl CommDevice for MockDevice {
    fn config(&self) -> Result<NativeSettings, NativeError> {
        self.with(|dev| {
            check(&dev.faults.config_read)?;
            Ok(dev.config)
        })
    }

    fn set_config(&mut self, settings: &NativeSettings) -> Result<(), NativeError> {
        self.with(|dev| {
            dev.set_config_calls += 1;
            check(&dev.faults.set_config)?;
            dev.config = *settings;
            Ok(())
        })
    }

    fn signals(&self) -> Result<NativeSignals, NativeError> {
        self.with(|dev| {
            check(&dev.faults.signals_query)?;
            Ok(dev.signals)
        })
    }

    fn set_signals_to_mark(&mut self, signals: NativeSignals) -> Result<(), NativeError> {
        self.with(|dev| {
            check(&dev.faults.signals_set)?;
            dev.signals.insert(signals);
            Ok(())
        })
    }

    fn set_signals_to_space(&mut self, signals: NativeSignals) -> Result<(), NativeError> {
        self.with(|dev| {
            check(&dev.faults.signals_set)?;
            dev.signals.remove(signals);
            Ok(())
        })
    }

    fn reset_buffers(&mut self, which: ResetBuffers) -> Result<(), NativeError> {
        self.with(|dev| {
            check(&dev.faults.reset)?;
            if which.contains(ResetBuffers::RX) {
                dev.rx.clear();
            }
            if which.contains(ResetBuffers::TX) {
                dev.tx_pending = 0;
                dev.fire_output_waiter();
            }
            dev.resets += 1;
            Ok(())
        })
    }

    fn query_receive_buffer(&self) -> Result<usize, NativeError> {
        self.with(|dev| Ok(dev.rx.len()))
    }

    fn read(&mut self, buffer: &mut [u8], _timeout: Duration) -> Result<usize, NativeError> {
        self.with(|dev| {
            check(&dev.faults.read)?;
            let n = buffer.len().min(dev.rx.len());
            for (slot, byte) in buffer.iter_mut().zip(dev.rx.drain(..n)) {
                *slot = byte;
            }
            Ok(n)
        })
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, NativeError> {
        self.with(|dev| {
            check(&dev.faults.write)?;
            dev.tx_log.push(data.to_vec());
            if dev.hold_output {
                dev.tx_pending += data.len();
            }
            dev.fire_output_waiter();
            Ok(data.len())
        })
    }

    fn notify_data_available(&mut self) -> Watch {
        let armed = self.with(|dev| {
            dev.data_watches_armed += 1;
            if dev.data_waiter.is_some() {
                return Ok(Watch::ready(Err(NativeError::InUse)));
            }
            let (completer, pending) = watch();
            dev.data_waiter = Some(completer);
            dev.fire_data_waiter();
            Ok(pending)
        });
        armed.unwrap_or_else(|e| Watch::ready(Err(e)))
    }

    fn cancel_data_available(&mut self) {
        let _ = self.with(|dev| {
            if let Some(waiter) = dev.data_waiter.take() {
                dev.cancellations += 1;
                waiter.complete(Err(NativeError::Cancelled));
            }
            Ok(())
        });
    }

    fn notify_output_empty(&mut self) -> Watch {
        let armed = self.with(|dev| {
            dev.output_watches_armed += 1;
            if dev.output_waiter.is_some() {
                return Ok(Watch::ready(Err(NativeError::InUse)));
            }
            let (completer, pending) = watch();
            dev.output_waiter = Some(completer);
            dev.fire_output_waiter();
            Ok(pending)
        });
        armed.unwrap_or_else(|e| Watch::ready(Err(e)))
    }

    fn cancel_output_empty(&mut self) {
        let _ = self.with(|dev| {
            if let Some(waiter) = dev.output_waiter.take() {
                dev.cancellations += 1;
                waiter.complete(Err(NativeError::Cancelled));
            }
            Ok(())
        });
    }
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        if let Some(dev) = state.devices.get_mut(&self.name) {
            dev.open = false;
            dev.data_waiter = None;
            dev.output_waiter = None;
        }
    }
}
