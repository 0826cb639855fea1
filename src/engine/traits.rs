//! Portable engine contract.
//!
//! `PortEngine` is the capability interface the owning port object drives.
//! Each platform provides one concrete implementation; on this platform it
//! is [`CommEngine`](super::CommEngine).

use crate::device::SignalLines;
use crate::error::EngineResult;
use crate::readiness::{ReadinessOutcome, ReadinessRequest};
use crate::settings::{DataBits, Direction, FlowControl, Parity, StopBits};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::state::OpenMode;

/// What to do with characters received with a parity or framing error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataErrorPolicy {
    Skip,
    PassZero,
    Ignore,
    StopReceiving,
}

/// Operations a platform engine offers to the port object.
///
/// All calls block the calling thread until the device request completes.
/// Failures are returned and also recorded in the engine's error sink.
pub trait PortEngine {
    /// Open `location` with exclusive access and detect its settings.
    fn open(&mut self, location: &str, mode: OpenMode) -> EngineResult<()>;

    /// Release the device, restoring the open-time settings if configured.
    fn close(&mut self);

    fn is_open(&self) -> bool;

    /// Read whatever is already buffered, up to `buffer.len()` bytes.
    fn read(&mut self, buffer: &mut [u8]) -> EngineResult<usize>;

    /// Write all of `data`, blocking until the transfer completes.
    fn write(&mut self, data: &[u8]) -> EngineResult<usize>;

    /// Bytes waiting in the driver's receive buffer.
    fn bytes_available(&mut self) -> EngineResult<u64>;

    /// Bytes waiting in the driver's transmit buffer.
    fn bytes_to_write(&self) -> u64;

    fn flush(&mut self) -> EngineResult<()>;

    /// Discard both receive and transmit buffers.
    fn reset_buffers(&mut self) -> EngineResult<()>;

    /// Alias for [`reset_buffers`](Self::reset_buffers).
    fn reset(&mut self) -> EngineResult<()> {
        self.reset_buffers()
    }

    fn send_break(&mut self, duration: Duration) -> EngineResult<()>;

    fn set_break(&mut self, set: bool) -> EngineResult<()>;

    fn set_dtr(&mut self, set: bool) -> EngineResult<()>;

    fn set_rts(&mut self, set: bool) -> EngineResult<()>;

    /// Current signal lines. Query failures yield an empty set.
    fn lines(&mut self) -> SignalLines;

    fn set_rate(&mut self, rate: u32, direction: Direction) -> EngineResult<()>;

    fn set_data_bits(&mut self, data_bits: DataBits) -> EngineResult<()>;

    fn set_parity(&mut self, parity: Parity) -> EngineResult<()>;

    fn set_stop_bits(&mut self, stop_bits: StopBits) -> EngineResult<()>;

    fn set_flow_control(&mut self, flow_control: FlowControl) -> EngineResult<()>;

    fn set_data_error_policy(&mut self, policy: DataErrorPolicy) -> EngineResult<()>;

    /// Block until read data, write capacity or the timeout.
    fn wait_for_readiness(&mut self, request: ReadinessRequest) -> EngineResult<ReadinessOutcome>;

    fn is_read_notification_enabled(&self) -> bool;

    fn set_read_notification_enabled(&mut self, enable: bool) -> EngineResult<()>;

    fn is_write_notification_enabled(&self) -> bool;

    fn set_write_notification_enabled(&mut self, enable: bool) -> EngineResult<()>;

    fn process_io_errors(&mut self) -> EngineResult<()>;

    /// Supported numeric rates, ascending.
    fn standard_rates(&self) -> Vec<u32>;

    /// Map a port name to the system location.
    fn to_system_location(&self, port: &str) -> String;

    /// Map a system location to a port name.
    fn from_system_location(&self, location: &str) -> String;
}
