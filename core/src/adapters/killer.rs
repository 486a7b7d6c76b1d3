//! Process termination with bounded escalation.
//!
//! The graceful kill follows this pattern:
//! 1. Send SIGTERM to request a clean shutdown
//! 2. Poll liveness for up to the grace period (3s)
//! 3. If the process is still alive, send SIGKILL exactly once
//!
//! Signal delivery sits behind [`SignalSender`] so the escalation policy can
//! be exercised without real processes.

use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::error::Result;

/// Time a process gets to exit after SIGTERM before it is force-killed.
pub const GRACE_PERIOD: Duration = Duration::from_secs(3);

/// Interval between liveness checks while waiting.
const LIVENESS_POLL: Duration = Duration::from_millis(100);

/// Time allowed for the kernel to reap a force-killed process.
const KILL_SETTLE: Duration = Duration::from_millis(500);

/// Result of delivering one signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalOutcome {
    /// The signal was delivered.
    Sent,
    /// No such process; it is already gone.
    NotFound,
}

/// Low-level signal delivery.
pub trait SignalSender: Send + Sync {
    /// Request graceful termination (SIGTERM).
    fn terminate(&self, pid: u32) -> Result<SignalOutcome>;

    /// Terminate unconditionally (SIGKILL).
    fn kill(&self, pid: u32) -> Result<SignalOutcome>;

    /// Whether the process still exists.
    fn is_running(&self, pid: u32) -> bool;
}

#[cfg(unix)]
mod unix {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    use super::{SignalOutcome, SignalSender};
    use crate::error::{Error, Result};

    /// Signal delivery through `kill(2)`.
    #[derive(Debug, Default)]
    pub struct UnixSignals;

    impl UnixSignals {
        fn send(&self, pid: u32, signal: Signal) -> Result<SignalOutcome> {
            let target = i32::try_from(pid).map_err(|_| Error::KillFailed {
                pid,
                reason: "pid out of range".to_string(),
            })?;
            match kill(Pid::from_raw(target), signal) {
                Ok(()) => Ok(SignalOutcome::Sent),
                Err(Errno::ESRCH) => Ok(SignalOutcome::NotFound),
                Err(Errno::EPERM) => Err(Error::PermissionDenied(format!(
                    "not allowed to signal PID {}",
                    pid
                ))),
                Err(e) => Err(Error::KillFailed {
                    pid,
                    reason: e.desc().to_string(),
                }),
            }
        }
    }

    impl SignalSender for UnixSignals {
        fn terminate(&self, pid: u32) -> Result<SignalOutcome> {
            self.send(pid, Signal::SIGTERM)
        }

        fn kill(&self, pid: u32) -> Result<SignalOutcome> {
            self.send(pid, Signal::SIGKILL)
        }

        fn is_running(&self, pid: u32) -> bool {
            let Ok(target) = i32::try_from(pid) else {
                return false;
            };
            // Signal 0 probes existence; EPERM still means the process exists.
            match kill(Pid::from_raw(target), None) {
                Ok(()) => true,
                Err(Errno::EPERM) => true,
                Err(_) => false,
            }
        }
    }
}

#[cfg(not(unix))]
mod unsupported {
    use super::{SignalOutcome, SignalSender};
    use crate::error::{Error, Result};

    #[derive(Debug, Default)]
    pub struct UnsupportedSignals;

    impl SignalSender for UnsupportedSignals {
        fn terminate(&self, _pid: u32) -> Result<SignalOutcome> {
            Err(Error::UnsupportedPlatform(
                "process signals are only supported on unix".to_string(),
            ))
        }

        fn kill(&self, pid: u32) -> Result<SignalOutcome> {
            self.terminate(pid)
        }

        fn is_running(&self, _pid: u32) -> bool {
            false
        }
    }
}

#[cfg(unix)]
pub use unix::UnixSignals as PlatformSignals;

#[cfg(not(unix))]
pub use unsupported::UnsupportedSignals as PlatformSignals;

/// Terminates processes by pid.
pub struct ProcessKiller<S = PlatformSignals> {
    signals: S,
    grace_period: Duration,
}

impl ProcessKiller<PlatformSignals> {
    /// Create a killer using the platform's signal delivery.
    pub fn new() -> Self {
        Self::with_signals(PlatformSignals::default())
    }
}

impl Default for ProcessKiller<PlatformSignals> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: SignalSender> ProcessKiller<S> {
    /// Create a killer on top of a custom signal sender.
    pub fn with_signals(signals: S) -> Self {
        Self {
            signals,
            grace_period: GRACE_PERIOD,
        }
    }

    /// Override the grace period.
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    /// Check if a process is still running.
    pub fn is_running(&self, pid: u32) -> bool {
        self.signals.is_running(pid)
    }

    /// Kill a process; `force` skips straight to SIGKILL.
    pub async fn kill(&self, pid: u32, force: bool) -> Result<bool> {
        if force {
            self.force_kill(pid).await
        } else {
            self.kill_gracefully(pid).await
        }
    }

    /// SIGTERM, wait up to the grace period, then SIGKILL once.
    ///
    /// Returns `Ok(true)` once the process is gone, including when it was
    /// already gone before the first signal.
    pub async fn kill_gracefully(&self, pid: u32) -> Result<bool> {
        debug!(pid, "Sending SIGTERM");
        if self.signals.terminate(pid)? == SignalOutcome::NotFound {
            debug!(pid, "Process not found, already terminated");
            return Ok(true);
        }

        if self.wait_for_exit(pid, self.grace_period).await {
            info!(pid, "Process exited after SIGTERM");
            return Ok(true);
        }

        warn!(pid, grace_secs = self.grace_period.as_secs(), "Grace period elapsed, escalating to SIGKILL");
        self.force_kill(pid).await
    }

    async fn force_kill(&self, pid: u32) -> Result<bool> {
        if self.signals.kill(pid)? == SignalOutcome::NotFound {
            return Ok(true);
        }
        let gone = self.wait_for_exit(pid, KILL_SETTLE).await;
        if gone {
            info!(pid, "Process killed");
        } else {
            warn!(pid, "Process still present after SIGKILL");
        }
        Ok(gone)
    }

    /// Poll liveness until the process exits or `limit` elapses.
    async fn wait_for_exit(&self, pid: u32, limit: Duration) -> bool {
        let deadline = Instant::now() + limit;
        loop {
            if !self.signals.is_running(pid) {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            sleep(LIVENESS_POLL.min(deadline - now)).await;
        }
    }
}
