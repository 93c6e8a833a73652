//! Pid-file liveness records and signal-based termination.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::Result;

const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Outcome of a stop request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// No live producer; nothing was signalled.
    NotRunning,
    /// SIGTERM was honoured within the grace period.
    Stopped { pid: u32 },
    /// The grace period ran out and the process was killed.
    Killed { pid: u32 },
}

/// The `producer.pid` file of one session, plus the `producer.ready` marker
/// a producer writes once it can serve the session.
#[derive(Debug, Clone)]
pub struct LivenessFile {
    path: PathBuf,
    ready: PathBuf,
}

impl LivenessFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let ready = path.with_extension("ready");
        Self { path, ready }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record the calling process as the session's producer.
    pub fn write_current(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, std::process::id().to_string())?;
        Ok(())
    }

    /// Announce that the producer is connected and serving.
    pub fn mark_ready(&self) -> Result<()> {
        fs::write(&self.ready, std::process::id().to_string())?;
        Ok(())
    }

    /// Pid of a live producer that has announced readiness.
    pub fn ready_pid(&self) -> Option<u32> {
        let pid = self.alive_pid()?;
        self.ready.exists().then_some(pid)
    }

    pub fn read_pid(&self) -> Option<u32> {
        fs::read_to_string(&self.path).ok()?.trim().parse().ok()
    }

    /// Pid of a live producer. A record naming a dead or unparsable pid is
    /// stale and gets removed.
    pub fn alive_pid(&self) -> Option<u32> {
        if !self.path.exists() {
            return None;
        }
        match self.read_pid() {
            Some(pid) if is_process_alive(pid) => Some(pid),
            _ => {
                debug!(path = %self.path.display(), "removing stale pid file");
                self.remove();
                None
            }
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive_pid().is_some()
    }

    pub fn remove(&self) {
        for path in [&self.ready, &self.path] {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => warn!(error = %err, path = %path.display(), "failed to remove liveness record"),
            }
        }
    }

    /// SIGTERM the producer and wait up to `grace` for its record to
    /// disappear, escalating to SIGKILL. A process that vanished on its own
    /// counts as stopped.
    pub async fn stop(&self, grace: Duration) -> StopOutcome {
        let Some(pid) = self.alive_pid() else {
            return StopOutcome::NotRunning;
        };
        if !send_signal(pid, libc::SIGTERM) {
            self.remove();
            return StopOutcome::NotRunning;
        }
        info!(pid, "sent SIGTERM to producer");

        let deadline = tokio::time::Instant::now() + grace;
        while tokio::time::Instant::now() < deadline {
            if !self.path.exists() || !is_process_alive(pid) {
                self.remove();
                return StopOutcome::Stopped { pid };
            }
            tokio::time::sleep(STOP_POLL_INTERVAL).await;
        }

        warn!(pid, grace_ms = grace.as_millis() as u64, "producer ignored SIGTERM; killing");
        send_signal(pid, libc::SIGKILL);
        self.remove();
        StopOutcome::Killed { pid }
    }
}

/// Check if a process is still running.
pub fn is_process_alive(pid: u32) -> bool {
    // pid_t is i32; larger values would wrap and address a process group.
    let Ok(pid_t) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if pid_t <= 0 {
        return false;
    }
    // kill(pid, 0) checks existence without delivering a signal
    unsafe { libc::kill(pid_t, 0) == 0 }
}

/// Deliver `signal`; `false` when the process does not exist.
fn send_signal(pid: u32, signal: libc::c_int) -> bool {
    let Ok(pid_t) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if pid_t <= 0 {
        return false;
    }
    unsafe { libc::kill(pid_t, signal) == 0 }
}
