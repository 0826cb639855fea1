//! Lifecycle controller.
//!
//! [`CommEngine`] owns at most one open device. It sequences the open
//! handshake with the comm server, keeps the native settings record and its
//! portable shadow in step, drives signal lines and buffers, and forwards
//! readiness waits to the [`ReadinessMultiplexer`].
//!
//! Every failure is returned to the caller and also recorded in the
//! engine's error sink, which the owning port object reads through
//! [`CommEngine::error`] or observes with [`CommEngine::set_error_observer`].

pub mod state;
mod traits;

pub use state::{EngineState, OpenMode, PortOptions};
pub use traits::{DataErrorPolicy, PortEngine};

use crate::device::{
    CommModule, CommServer, DeviceLoader, MockCommServer, NativeError,
    NativeSignals, ResetBuffers, SignalLines,
};
use crate::error::{EngineError, EngineResult, PortErrorKind};
use crate::readiness::{ReadinessMultiplexer, ReadinessOutcome, ReadinessRequest, SelectPhase};
use crate::settings::{
    to_native, DataBits, Direction, FlowControl, NativeSettings, Parity, PortConfiguration,
    PortSetting, StopBits,
};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Callback invoked with the category of every recorded failure.
pub type ErrorObserver = Box<dyn FnMut(PortErrorKind) + Send>;

/// Serial port engine over a comm server.
pub struct CommEngine {
    server: Arc<dyn CommServer>,
    loader: Arc<dyn DeviceLoader>,
    options: PortOptions,
    state: Option<EngineState>,
    multiplexer: ReadinessMultiplexer,
    last_error: Option<PortErrorKind>,
    observer: Option<ErrorObserver>,
}

impl CommEngine {
    /// Create a closed engine.
    pub fn new(
        server: Arc<dyn CommServer>,
        loader: Arc<dyn DeviceLoader>,
        options: PortOptions,
    ) -> Self {
        Self {
            server,
            loader,
            options,
            state: None,
            multiplexer: ReadinessMultiplexer::new(),
            last_error: None,
            observer: None,
        }
    }

    /// Create a closed engine backed by the mock subsystem.
    pub fn with_mock(server: &MockCommServer, options: PortOptions) -> Self {
        let shared = Arc::new(server.clone());
        Self::new(shared.clone(), shared, options)
    }

    pub fn options(&self) -> &PortOptions {
        &self.options
    }

    /// Per-open state, `None` while closed.
    pub fn state(&self) -> Option<&EngineState> {
        self.state.as_ref()
    }

    /// Location of the open device.
    pub fn location(&self) -> Option<&str> {
        self.state.as_ref().map(EngineState::location)
    }

    /// Portable view of the settings the device currently holds.
    pub fn configuration(&self) -> Option<&PortConfiguration> {
        self.state.as_ref().map(EngineState::detected)
    }

    pub fn readiness_phase(&self) -> SelectPhase {
        self.multiplexer.phase()
    }

    /// Category of the most recent failure.
    pub fn error(&self) -> Option<PortErrorKind> {
        self.last_error
    }

    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    /// Register a callback for every recorded failure, replacing any previous one.
    pub fn set_error_observer(&mut self, observer: impl FnMut(PortErrorKind) + Send + 'static) {
        self.observer = Some(Box::new(observer));
    }

    fn record<T>(&mut self, result: EngineResult<T>) -> EngineResult<T> {
        if let Err(e) = &result {
            let kind = e.kind();
            warn!(error = %e, %kind, "Port operation failed");
            self.last_error = Some(kind);
            if let Some(observer) = self.observer.as_mut() {
                observer(kind);
            }
        }
        result
    }

    #[instrument(skip(self), fields(module = tracing::field::Empty))]
    fn try_open(&mut self, location: &str, mode: OpenMode) -> EngineResult<()> {
        if self.state.is_some() {
            return Err(EngineError::AlreadyOpen);
        }
        if !self.loader.ensure_device_subsystem_ready() {
            return Err(EngineError::SubsystemUnavailable);
        }
        self.server.connect().map_err(EngineError::Connect)?;

        let module = CommModule::for_location(location);
        tracing::Span::current().record("module", tracing::field::display(module));
        self.server
            .load_comm_module(module)
            .map_err(|source| EngineError::LoadModule { module, source })?;

        if mode != OpenMode::ReadWrite {
            debug!(?mode, "Open mode is advisory, opening read/write");
        }
        let device = self
            .server
            .open_exclusive(location)
            .map_err(|source| classify_open_error(location, source))?;

        // An early return here drops `device`, releasing the exclusive lock.
        let saved = device.config().map_err(EngineError::ReadConfig)?;
        let state = EngineState::new(location, device, saved);
        info!(configuration = ?state.detected(), "Port opened");
        self.state = Some(state);
        Ok(())
    }

    /// Validate one edit against the current settings and push it to the device.
    ///
    /// The engine's settings change only once the device has accepted the
    /// full record.
    pub fn apply_setting(&mut self, setting: PortSetting) -> EngineResult<()> {
        let result = with_state(&mut self.state, |state| {
            let mut candidate = *state.current();
            candidate.apply(setting)?;
            push_settings(state, candidate)?;
            debug!(%setting, "Setting applied");
            Ok(())
        });
        self.record(result)
    }

    /// Replace the whole configuration with one device call.
    pub fn apply_configuration(&mut self, config: &PortConfiguration) -> EngineResult<()> {
        let result = with_state(&mut self.state, |state| {
            let candidate = to_native(config)?;
            push_settings(state, candidate)?;
            debug!(?config, "Configuration applied");
            Ok(())
        });
        self.record(result)
    }

    fn set_signal(&mut self, signal: NativeSignals, set: bool) -> EngineResult<()> {
        let result = with_state(&mut self.state, |state| {
            let outcome = if set {
                state.device.set_signals_to_mark(signal)
            } else {
                state.device.set_signals_to_space(signal)
            };
            outcome.map_err(EngineError::Device)?;
            debug!(?signal, set, "Signal changed");
            Ok(())
        });
        self.record(result)
    }

    fn unsupported<T>(&mut self, operation: &str) -> EngineResult<T> {
        self.record(Err(EngineError::unsupported(format!(
            "{operation} is not supported by this device"
        ))))
    }
}

fn with_state<T>(
    state: &mut Option<EngineState>,
    op: impl FnOnce(&mut EngineState) -> EngineResult<T>,
) -> EngineResult<T> {
    match state.as_mut() {
        Some(state) => op(state),
        None => Err(EngineError::NotOpen),
    }
}

fn push_settings(state: &mut EngineState, candidate: NativeSettings) -> EngineResult<()> {
    state
        .device
        .set_config(&candidate)
        .map_err(EngineError::Rejected)?;
    state.commit(candidate);
    Ok(())
}

fn classify_open_error(location: &str, source: NativeError) -> EngineError {
    let location = location.to_string();
    if source.is_access_class() {
        EngineError::PermissionDenied { location, source }
    } else if source.is_absent_class() {
        EngineError::NoSuchDevice { location, source }
    } else {
        EngineError::Open { location, source }
    }
}

impl PortEngine for CommEngine {
    fn open(&mut self, location: &str, mode: OpenMode) -> EngineResult<()> {
        let result = self.try_open(location, mode);
        self.record(result)
    }

    fn close(&mut self) {
        let Some(mut state) = self.state.take() else {
            return;
        };
        if self.options.restore_settings_on_close {
            let saved = *state.saved();
            match state.device.set_config(&saved) {
                Ok(()) => debug!("Open-time settings restored"),
                Err(e) => warn!(error = %e, "Failed to restore settings on close"),
            }
        }
        info!(
            location = state.location(),
            open_for = ?state.opened_at().elapsed(),
            "Port closed"
        );
    }

    fn is_open(&self) -> bool {
        self.state.is_some()
    }

    fn read(&mut self, buffer: &mut [u8]) -> EngineResult<usize> {
        let result = with_state(&mut self.state, |state| {
            state
                .device
                .read(buffer, Duration::ZERO)
                .map_err(EngineError::Io)
        });
        self.record(result)
    }

    fn write(&mut self, data: &[u8]) -> EngineResult<usize> {
        let result = with_state(&mut self.state, |state| {
            state.device.write(data).map_err(EngineError::Io)
        });
        self.record(result)
    }

    fn bytes_available(&mut self) -> EngineResult<u64> {
        let result = with_state(&mut self.state, |state| {
            let queued = state
                .device
                .query_receive_buffer()
                .map_err(EngineError::Device)?;
            Ok(queued as u64)
        });
        self.record(result)
    }

    fn bytes_to_write(&self) -> u64 {
        0
    }

    fn flush(&mut self) -> EngineResult<()> {
        self.unsupported("flush")
    }

    fn reset_buffers(&mut self) -> EngineResult<()> {
        let result = with_state(&mut self.state, |state| {
            state
                .device
                .reset_buffers(ResetBuffers::RX | ResetBuffers::TX)
                .map_err(EngineError::Device)
        });
        self.record(result)
    }

    fn send_break(&mut self, _duration: Duration) -> EngineResult<()> {
        self.unsupported("send break")
    }

    fn set_break(&mut self, _set: bool) -> EngineResult<()> {
        self.unsupported("set break")
    }

    fn set_dtr(&mut self, set: bool) -> EngineResult<()> {
        self.set_signal(NativeSignals::DTR, set)
    }

    fn set_rts(&mut self, set: bool) -> EngineResult<()> {
        self.set_signal(NativeSignals::RTS, set)
    }

    fn lines(&mut self) -> SignalLines {
        let Some(state) = self.state.as_mut() else {
            return SignalLines::empty();
        };
        match state.device.signals() {
            Ok(native) => {
                let lines = SignalLines::from(native);
                state.set_last_lines(lines);
                lines
            }
            Err(e) => {
                warn!(error = %e, "Signal query failed");
                SignalLines::empty()
            }
        }
    }

    fn set_rate(&mut self, rate: u32, direction: Direction) -> EngineResult<()> {
        self.apply_setting(PortSetting::Rate { rate, direction })
    }

    fn set_data_bits(&mut self, data_bits: DataBits) -> EngineResult<()> {
        self.apply_setting(PortSetting::DataBits(data_bits))
    }

    fn set_parity(&mut self, parity: Parity) -> EngineResult<()> {
        self.apply_setting(PortSetting::Parity(parity))
    }

    fn set_stop_bits(&mut self, stop_bits: StopBits) -> EngineResult<()> {
        self.apply_setting(PortSetting::StopBits(stop_bits))
    }

    fn set_flow_control(&mut self, flow_control: FlowControl) -> EngineResult<()> {
        self.apply_setting(PortSetting::FlowControl(flow_control))
    }

    fn set_data_error_policy(&mut self, policy: DataErrorPolicy) -> EngineResult<()> {
        match policy {
            DataErrorPolicy::Ignore => Ok(()),
            other => self.unsupported(&format!("data error policy {other:?}")),
        }
    }

    fn wait_for_readiness(&mut self, request: ReadinessRequest) -> EngineResult<ReadinessOutcome> {
        let result = match self.state.as_mut() {
            Some(state) => self.multiplexer.wait(state.device.as_mut(), request),
            None => Err(EngineError::NotOpen),
        };
        self.record(result)
    }

    fn is_read_notification_enabled(&self) -> bool {
        false
    }

    fn set_read_notification_enabled(&mut self, enable: bool) -> EngineResult<()> {
        if enable {
            return self.unsupported("read notification");
        }
        Ok(())
    }

    fn is_write_notification_enabled(&self) -> bool {
        false
    }

    fn set_write_notification_enabled(&mut self, enable: bool) -> EngineResult<()> {
        if enable {
            return self.unsupported("write notification");
        }
        Ok(())
    }

    fn process_io_errors(&mut self) -> EngineResult<()> {
        self.unsupported("I/O error processing")
    }

    fn standard_rates(&self) -> Vec<u32> {
        crate::rates::standard_rates().collect()
    }

    fn to_system_location(&self, port: &str) -> String {
        port.to_string()
    }

    fn from_system_location(&self, location: &str) -> String {
        location.to_string()
    }
}

impl Drop for CommEngine {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for CommEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommEngine")
            .field("options", &self.options)
            .field("state", &self.state)
            .field("multiplexer", &self.multiplexer)
            .field("last_error", &self.last_error)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}
