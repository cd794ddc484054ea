//! Signal handling for daemon processes.
//!
//! The OS-level handler only records the signal number in a process-wide
//! bitmask. [`SignalHandler::dispatch`] turns pending signals into a request on
//! the [`TerminationFlag`]; the scheduler calls it once per iteration, so the
//! worker never sees a signal in the middle of a tick.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, error, info, warn};

use crate::error::DaemonError;

/// Signals received by the OS handler and not yet dispatched.
static PENDING: AtomicU64 = AtomicU64::new(0);

#[cfg(unix)]
const SIGINT: i32 = libc::SIGINT;
#[cfg(unix)]
const SIGTERM: i32 = libc::SIGTERM;
#[cfg(unix)]
const SIGQUIT: i32 = libc::SIGQUIT;

#[cfg(not(unix))]
const SIGINT: i32 = 2;
#[cfg(not(unix))]
const SIGTERM: i32 = 15;
#[cfg(not(unix))]
const SIGQUIT: i32 = 3;

/// A signal delivered to the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonSignal {
    /// SIGINT.
    Interrupt,
    /// SIGTERM.
    Terminate,
    /// SIGQUIT.
    Quit,
    /// Any other signal routed through the handler.
    Other(i32),
}

impl DaemonSignal {
    pub fn from_raw(signo: i32) -> Self {
        match signo {
            SIGINT => DaemonSignal::Interrupt,
            SIGTERM => DaemonSignal::Terminate,
            SIGQUIT => DaemonSignal::Quit,
            other => DaemonSignal::Other(other),
        }
    }

    pub fn as_raw(&self) -> i32 {
        match self {
            DaemonSignal::Interrupt => SIGINT,
            DaemonSignal::Terminate => SIGTERM,
            DaemonSignal::Quit => SIGQUIT,
            DaemonSignal::Other(signo) => *signo,
        }
    }

    /// Whether this is one of the signals the daemon expects to stop on.
    pub fn is_handled(&self) -> bool {
        !matches!(self, DaemonSignal::Other(_))
    }
}

impl std::fmt::Display for DaemonSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DaemonSignal::Interrupt => write!(f, "SIGINT"),
            DaemonSignal::Terminate => write!(f, "SIGTERM"),
            DaemonSignal::Quit => write!(f, "SIGQUIT"),
            DaemonSignal::Other(signo) => write!(f, "signal {}", signo),
        }
    }
}

/// Process-local "please stop" flag.
///
/// Once requested it stays requested; there is no way to clear it.
#[derive(Debug, Clone, Default)]
pub struct TerminationFlag(Arc<AtomicBool>);

impl TerminationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request termination. The loop drains at its next boundary check.
    pub fn request(&self) {
        if !self.0.swap(true, Ordering::SeqCst) {
            debug!("Termination requested");
        }
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Disposition a signal had before the daemon took it over.
#[cfg(unix)]
type SavedAction = nix::sys::signal::SigAction;
#[cfg(not(unix))]
type SavedAction = ();

/// Translates OS termination signals into the termination flag.
#[derive(Clone)]
pub struct SignalHandler {
    flag: TerminationFlag,
    previous: Arc<Mutex<Vec<(i32, SavedAction)>>>,
}

impl std::fmt::Debug for SignalHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalHandler")
            .field("flag", &self.flag)
            .finish_non_exhaustive()
    }
}

impl SignalHandler {
    /// Install handlers for SIGINT, SIGTERM and SIGQUIT.
    ///
    /// Failure to register any of them is a setup error.
    pub fn install() -> Result<Self, DaemonError> {
        Self::install_with_flag(TerminationFlag::new())
    }

    /// Like [`SignalHandler::install`], but drive an existing flag.
    ///
    /// Signals left pending by an earlier daemon in this process are discarded.
    pub fn install_with_flag(flag: TerminationFlag) -> Result<Self, DaemonError> {
        let handler = Self::unregistered(flag);
        PENDING.store(0, Ordering::SeqCst);

        for signo in [SIGINT, SIGTERM, SIGQUIT] {
            if let Err(e) = handler.trap(signo) {
                handler.restore();
                return Err(e);
            }
        }
        debug!("Signal handlers installed for SIGINT, SIGTERM and SIGQUIT");
        Ok(handler)
    }

    /// A handler that dispatches pending signals without registering any.
    pub(crate) fn unregistered(flag: TerminationFlag) -> Self {
        Self {
            flag,
            previous: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Route another signal through the same handler.
    ///
    /// It is reported as unhandled when dispatched and still stops the daemon.
    pub fn trap(&self, signo: i32) -> Result<(), DaemonError> {
        let saved = register(signo)?;
        if let Ok(mut previous) = self.previous.lock() {
            previous.push((signo, saved));
        }
        Ok(())
    }

    /// Put back the dispositions that were in place before `install`/`trap`.
    ///
    /// Calling it again is a no-op.
    pub fn restore(&self) {
        let Ok(mut previous) = self.previous.lock() else {
            return;
        };
        if previous.is_empty() {
            return;
        }

        for (signo, saved) in previous.drain(..).rev() {
            if let Err(e) = unregister(signo, saved) {
                warn!("Failed to restore handler for signal {}: {}", signo, e);
            }
        }
        debug!("Signal handlers restored");
    }

    pub fn flag(&self) -> &TerminationFlag {
        &self.flag
    }

    /// Drain pending signals and update the termination flag.
    ///
    /// Returns the signals that were pending, lowest number first.
    pub fn dispatch(&self) -> Vec<DaemonSignal> {
        let pending = PENDING.swap(0, Ordering::SeqCst);
        if pending == 0 {
            return Vec::new();
        }

        let signals: Vec<DaemonSignal> = (0..64)
            .filter(|bit| pending & (1u64 << bit) != 0)
            .map(DaemonSignal::from_raw)
            .collect();

        for signal in &signals {
            if signal.is_handled() {
                info!("Received {}, stopping", signal);
            } else {
                error!("{} is unhandled. Terminating", signal);
            }
        }

        self.flag.request();
        signals
    }
}

/// Record a signal as if the OS had delivered it.
pub(crate) fn record(signo: i32) {
    if (0..64).contains(&signo) {
        PENDING.fetch_or(1u64 << signo, Ordering::SeqCst);
    }
}

#[cfg(unix)]
extern "C" fn record_signal(signo: libc::c_int) {
    record(signo);
}

#[cfg(unix)]
fn to_signal(signo: i32) -> Result<nix::sys::signal::Signal, DaemonError> {
    nix::sys::signal::Signal::try_from(signo)
        .map_err(|e| DaemonError::SignalSetup(format!("signal {}: {}", signo, e)))
}

#[cfg(unix)]
fn register(signo: i32) -> Result<SavedAction, DaemonError> {
    use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet};

    let signal = to_signal(signo)?;

    let action = SigAction::new(
        SigHandler::Handler(record_signal),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );

    // SAFETY: the handler only performs an atomic fetch_or.
    unsafe { sigaction(signal, &action) }
        .map_err(|e| DaemonError::SignalSetup(format!("{}: {}", signal, e)))
}

#[cfg(unix)]
fn unregister(signo: i32, saved: SavedAction) -> Result<(), DaemonError> {
    let signal = to_signal(signo)?;

    // SAFETY: reinstates a disposition the kernel handed back to us.
    unsafe { nix::sys::signal::sigaction(signal, &saved) }
        .map_err(|e| DaemonError::SignalSetup(format!("{}: {}", signal, e)))?;
    Ok(())
}

#[cfg(not(unix))]
fn register(_signo: i32) -> Result<SavedAction, DaemonError> {
    Err(DaemonError::SignalSetup(
        "POSIX signals are not available on this platform".to_string(),
    ))
}

#[cfg(not(unix))]
fn unregister(_signo: i32, _saved: SavedAction) -> Result<(), DaemonError> {
    Ok(())
}

/// Ask the process `pid` to stop (SIGTERM), or kill it (SIGKILL) when `force` is set.
#[cfg(unix)]
pub fn send_to_pid(pid: u32, force: bool) -> Result<(), DaemonError> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let raw = i32::try_from(pid)
        .ok()
        .filter(|p| *p > 0)
        .ok_or_else(|| DaemonError::Config(format!("invalid pid {}", pid)))?;

    let signal = if force { Signal::SIGKILL } else { Signal::SIGTERM };
    kill(Pid::from_raw(raw), signal).map_err(|e| DaemonError::Io(e.into()))?;
    info!("Sent {} to PID {}", signal, pid);
    Ok(())
}

#[cfg(not(unix))]
pub fn send_to_pid(_pid: u32, _force: bool) -> Result<(), DaemonError> {
    Err(DaemonError::SignalSetup(
        "POSIX signals are not available on this platform".to_string(),
    ))
}

#[cfg(test)]
#[path = "signal_tests.rs"]
mod tests;
