//! Readiness multiplexer.
//!
//! Collapses up to three asynchronous completion sources (a timer, a
//! data-available watch and an output-empty watch) into one blocking call.
//!
//! ```text
//! Idle ──arm──> Armed ──first completion──> TimedOut | Fired{read, write} ──> Idle
//! ```
//!
//! Whatever wakes the wait, every watch still pending on the device is
//! cancelled explicitly before returning, and the timer is dropped.

use crate::device::{CommDevice, NativeError, Watch};
use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::runtime::{Builder, Handle, Runtime};
use tracing::{debug, trace};

/// How long a readiness wait may block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitTimeout {
    /// Wait at most this long. Zero polls once.
    Finite(Duration),
    /// Wait until a requested watch fires.
    Indefinite,
}

impl WaitTimeout {
    /// Millisecond form used by port objects: negative means indefinite.
    pub fn from_millis(ms: i64) -> Self {
        u64::try_from(ms)
            .map(|ms| Self::Finite(Duration::from_millis(ms)))
            .unwrap_or(Self::Indefinite)
    }
}

/// What to wait for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessRequest {
    pub timeout: WaitTimeout,
    pub want_read: bool,
    pub want_write: bool,
}

impl ReadinessRequest {
    pub fn new(timeout: WaitTimeout, want_read: bool, want_write: bool) -> Self {
        Self {
            timeout,
            want_read,
            want_write,
        }
    }

    /// Wait for receive data only.
    pub fn read(timeout: WaitTimeout) -> Self {
        Self::new(timeout, true, false)
    }

    /// Wait for the transmit buffer to empty only.
    pub fn write(timeout: WaitTimeout) -> Self {
        Self::new(timeout, false, true)
    }

    /// Sleep for `duration` without watching the device.
    pub fn sleep(duration: Duration) -> Self {
        Self::new(WaitTimeout::Finite(duration), false, false)
    }
}

/// Result of a readiness wait.
///
/// When `timed_out` is set both readiness flags are clear; otherwise at
/// least one requested flag is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReadinessOutcome {
    pub timed_out: bool,
    pub read_ready: bool,
    pub write_ready: bool,
}

impl ReadinessOutcome {
    fn timeout() -> Self {
        Self {
            timed_out: true,
            ..Default::default()
        }
    }
}

/// Multiplexer state; `Idle` whenever no wait is in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectPhase {
    Idle,
    Armed,
    TimedOut,
    Fired { read: bool, write: bool },
}

enum Wake {
    Timer,
    Read(Result<(), NativeError>),
    Write(Result<(), NativeError>),
}

/// Blocking wait-any over a device's readiness watches.
///
/// Owns a current-thread Tokio runtime, created on first use, that is only
/// driven from inside [`wait`](Self::wait) and never spawns tasks.
#[derive(Debug)]
pub struct ReadinessMultiplexer {
    runtime: Option<Runtime>,
    phase: SelectPhase,
}

impl Default for ReadinessMultiplexer {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadinessMultiplexer {
    pub fn new() -> Self {
        Self {
            runtime: None,
            phase: SelectPhase::Idle,
        }
    }

    /// Current state.
    pub fn phase(&self) -> SelectPhase {
        self.phase
    }

    fn runtime(slot: &mut Option<Runtime>) -> EngineResult<&Runtime> {
        match slot {
            Some(runtime) => Ok(&*runtime),
            None => {
                let runtime = Builder::new_current_thread()
                    .enable_time()
                    .build()
                    .map_err(EngineError::Runtime)?;
                Ok(&*slot.insert(runtime))
            }
        }
    }

    /// Block until a requested watch fires or the timeout elapses.
    ///
    /// Asking for neither read nor write with a finite timeout is a plain
    /// sleep that reports a timeout. Asking for neither with an indefinite
    /// timeout could never wake and is rejected as unsupported.
    ///
    /// The wait blocks the calling thread, so calling it from inside a Tokio
    /// async context fails with [`EngineError::NestedRuntime`] before any
    /// watch is armed.
    pub fn wait(
        &mut self,
        device: &mut dyn CommDevice,
        request: ReadinessRequest,
    ) -> EngineResult<ReadinessOutcome> {
        if !request.want_read
            && !request.want_write
            && request.timeout == WaitTimeout::Indefinite
        {
            return Err(EngineError::unsupported(
                "indefinite readiness wait with neither read nor write requested",
            ));
        }

        if Handle::try_current().is_ok() {
            return Err(EngineError::NestedRuntime);
        }
        let runtime = Self::runtime(&mut self.runtime)?;

        let mut read_watch = request.want_read.then(|| device.notify_data_available());
        let mut write_watch = request.want_write.then(|| device.notify_output_empty());
        self.phase = SelectPhase::Armed;
        debug!(?request, "Readiness wait armed");

        let started = Instant::now();
        let wake = runtime.block_on(first_completion(
            request.timeout,
            read_watch.as_mut(),
            write_watch.as_mut(),
        ));

        let (mut read_result, mut write_result) = match wake {
            Wake::Timer => (None, None),
            Wake::Read(result) => (Some(result), None),
            Wake::Write(result) => (None, Some(result)),
        };
        // A source may have completed alongside the one that woke us.
        if read_result.is_none() {
            read_result = read_watch.as_mut().and_then(Watch::try_take);
        }
        if write_result.is_none() {
            write_result = write_watch.as_mut().and_then(Watch::try_take);
        }

        if read_watch.is_some() && read_result.is_none() {
            device.cancel_data_available();
        }
        if write_watch.is_some() && write_result.is_none() {
            device.cancel_output_empty();
        }

        let outcome = resolve(read_result, write_result);
        self.phase = match &outcome {
            Ok(o) if o.timed_out => SelectPhase::TimedOut,
            Ok(o) => SelectPhase::Fired {
                read: o.read_ready,
                write: o.write_ready,
            },
            Err(_) => SelectPhase::Idle,
        };
        trace!(phase = ?self.phase, elapsed = ?started.elapsed(), "Readiness wait woke");
        self.phase = SelectPhase::Idle;

        let outcome = outcome?;
        debug!(?outcome, "Readiness wait finished");
        Ok(outcome)
    }
}

fn resolve(
    read: Option<Result<(), NativeError>>,
    write: Option<Result<(), NativeError>>,
) -> EngineResult<ReadinessOutcome> {
    if let Some(Err(e)) = &read {
        return Err(EngineError::Io(e.clone()));
    }
    if let Some(Err(e)) = &write {
        return Err(EngineError::Io(e.clone()));
    }

    let read_ready = read.is_some();
    let write_ready = write.is_some();
    if !read_ready && !write_ready {
        return Ok(ReadinessOutcome::timeout());
    }
    Ok(ReadinessOutcome {
        timed_out: false,
        read_ready,
        write_ready,
    })
}

/// Readiness sources are polled before the timer, so a zero timeout still
/// reports data that is already there.
async fn first_completion(
    timeout: WaitTimeout,
    read: Option<&mut Watch>,
    write: Option<&mut Watch>,
) -> Wake {
    let timer = async move {
        match timeout {
            WaitTimeout::Finite(duration) => tokio::time::sleep(duration).await,
            WaitTimeout::Indefinite => std::future::pending::<()>().await,
        }
    };
    let read = async move {
        match read {
            Some(watch) => watch.await,
            None => std::future::pending().await,
        }
    };
    let write = async move {
        match write {
            Some(watch) => watch.await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        biased;
        result = read => Wake::Read(result),
        result = write => Wake::Write(result),
        _ = timer => Wake::Timer,
    }
}
