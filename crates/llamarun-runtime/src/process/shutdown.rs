//! Graceful-then-forced termination of backend processes.
//!
//! # Strategy
//! 1. Send SIGTERM and wait up to the grace period for exit
//! 2. If still running, force kill
//! 3. Wait a second bounded period for the process to be reaped
//!
//! # Platform behavior
//! - Unix: SIGTERM via the nix crate, SIGKILL via `Child::start_kill`
//! - Other platforms: no graceful signal, the kill is sent immediately

use std::io;

#[cfg(unix)]
use nix::sys::signal::{self, Signal};
#[cfg(unix)]
use nix::unistd::Pid;

/// Result of stopping one backend. Stopping never fails; an unresponsive
/// process is reported and logged instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The process exited within the grace period.
    Graceful,
    /// The process had to be killed.
    Killed,
    /// The process was still present after the kill timeout.
    Unresponsive,
    /// There was no process to stop.
    NotRunning,
}

impl StopOutcome {
    pub const fn is_clean(self) -> bool {
        !matches!(self, Self::Unresponsive)
    }
}

/// Ask a process to terminate.
///
/// Returns `Ok(false)` if the process no longer exists.
#[cfg(unix)]
pub fn request_terminate(pid: u32) -> io::Result<bool> {
    let raw = i32::try_from(pid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;

    match signal::kill(Pid::from_raw(raw), Signal::SIGTERM) {
        Ok(()) => Ok(true),
        Err(nix::errno::Errno::ESRCH) => Ok(false),
        Err(e) => Err(io::Error::other(e)),
    }
}

/// No graceful terminate signal exists here; callers escalate to a kill.
#[cfg(not(unix))]
pub fn request_terminate(_pid: u32) -> io::Result<bool> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "graceful termination is not supported on this platform",
    ))
}
