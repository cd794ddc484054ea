//! Pid file guard: at most one running instance per worker id.
//!
//! The guard checks for an existing artifact when the daemon is constructed and
//! claims it with an exclusive create once the fork has been resolved, so only the
//! surviving process ever owns the file. Two instances racing past the early
//! check still cannot both claim it: the loser of the `create_new` gets
//! [`DaemonError::AlreadyRunning`].

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use minder_config::WORKER_PLACEHOLDER;

use crate::error::DaemonError;

/// Single-instance guard for one worker id.
#[derive(Debug, Clone)]
pub struct PidFileGuard {
    path: Option<PathBuf>,
}

/// What the pid file says about the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PidStatus {
    /// No pid template configured.
    Disabled,
    /// No pid file.
    NotRunning { path: PathBuf },
    /// Pid file names a live process.
    Running { path: PathBuf, pid: u32 },
    /// Pid file exists but its owner is gone or unreadable.
    Stale { path: PathBuf, pid: Option<u32> },
}

impl PidFileGuard {
    /// Substitute the worker id into a pid path template.
    pub fn resolve(template: &str, worker: &str) -> PathBuf {
        PathBuf::from(template.replace(WORKER_PLACEHOLDER, worker))
    }

    /// Create a guard for `worker`. `None` disables single-instance enforcement.
    pub fn new(template: Option<&str>, worker: &str) -> Self {
        Self {
            path: template.map(|t| Self::resolve(t, worker)),
        }
    }

    /// A guard that enforces nothing.
    pub fn disabled() -> Self {
        Self { path: None }
    }

    /// Resolved pid file path, if locking is enabled.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_enabled(&self) -> bool {
        self.path.is_some()
    }

    /// Fail with `AlreadyRunning` if a pid file is present.
    ///
    /// The file is not created here; see [`PidFileGuard::acquire`].
    pub fn check(&self) -> Result<(), DaemonError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if !path.exists() {
            debug!("No PID file at {}", path.display());
            return Ok(());
        }

        Err(Self::already_running(path))
    }

    /// Claim the pid file. Must be called by the process that runs the loop.
    pub fn acquire(&self) -> Result<LockHandle, DaemonError> {
        let Some(path) = &self.path else {
            return Ok(LockHandle::noop());
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| DaemonError::PidFileCreation {
                path: path.clone(),
                reason: format!("Failed to create parent directory: {}", e),
            })?;
        }

        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(_) => {
                debug!("PID file claimed: {}", path.display());
                Ok(LockHandle {
                    path: Some(path.clone()),
                    created: true,
                    released: false,
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(Self::already_running(path))
            }
            Err(e) => Err(DaemonError::PidFileCreation {
                path: path.clone(),
                reason: e.to_string(),
            }),
        }
    }

    /// Inspect the pid file without touching it.
    pub fn status(&self) -> Result<PidStatus, DaemonError> {
        let Some(path) = &self.path else {
            return Ok(PidStatus::Disabled);
        };

        if !path.exists() {
            return Ok(PidStatus::NotRunning { path: path.clone() });
        }

        let status = match read_owner(path)? {
            Some(pid) if is_process_alive(pid) => PidStatus::Running {
                path: path.clone(),
                pid,
            },
            pid => PidStatus::Stale {
                path: path.clone(),
                pid,
            },
        };
        Ok(status)
    }

    /// An unreadable pid file still counts as held; only the operator clears it.
    fn already_running(path: &Path) -> DaemonError {
        let pid = match read_owner(path) {
            Ok(pid) => pid,
            Err(e) => {
                warn!("{}", e);
                None
            }
        };

        match pid {
            Some(pid) if !is_process_alive(pid) => warn!(
                "PID file {} names process {} which is not alive; remove the file if the daemon is gone",
                path.display(),
                pid
            ),
            None => warn!(
                "PID file {} has no readable owner; remove it if no daemon is running",
                path.display()
            ),
            _ => {}
        }

        DaemonError::AlreadyRunning {
            path: path.to_path_buf(),
            pid,
        }
    }
}

/// Read the owner pid from an existing pid file.
///
/// Empty or malformed content yields `None`.
fn read_owner(path: &Path) -> Result<Option<u32>, DaemonError> {
    let contents = fs::read_to_string(path).map_err(|e| DaemonError::PidFileRead {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    Ok(contents.trim().parse::<u32>().ok())
}

/// Check if a process with the given PID exists.
#[cfg(unix)]
pub fn is_process_alive(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    // 0 and negative values address process groups.
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    if raw <= 0 {
        return false;
    }

    match kill(Pid::from_raw(raw), None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

#[cfg(not(unix))]
pub fn is_process_alive(_pid: u32) -> bool {
    // No cheap liveness probe; assume the recorded owner is alive.
    true
}

/// Ownership of a claimed pid file.
///
/// Dropping a held handle releases it.
#[derive(Debug)]
pub struct LockHandle {
    path: Option<PathBuf>,
    created: bool,
    released: bool,
}

impl LockHandle {
    fn noop() -> Self {
        Self {
            path: None,
            created: false,
            released: false,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Whether this process created the pid file.
    pub fn created(&self) -> bool {
        self.created
    }

    /// Persist `pid` as the owner of the artifact.
    pub fn write(&mut self, pid: u32) -> Result<(), DaemonError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let mut file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(path)
            .map_err(|e| DaemonError::PidFileCreation {
                path: path.clone(),
                reason: e.to_string(),
            })?;

        write!(file, "{}", pid).map_err(|e| DaemonError::PidFileCreation {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        info!("PID file created: {} (PID: {})", path.display(), pid);
        Ok(())
    }

    /// Delete the pid file. Failures are logged, never returned.
    pub fn release(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        if self.released || !self.created {
            return;
        }
        self.released = true;

        let Some(path) = &self.path else {
            return;
        };

        match fs::remove_file(path) {
            Ok(()) => info!("PID file removed: {}", path.display()),
            Err(e) => warn!("Failed to remove PID file {}: {}", path.display(), e),
        }
    }
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        self.remove();
    }
}

#[cfg(test)]
#[path = "pid_tests.rs"]
mod tests;
