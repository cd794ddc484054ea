//! Daemon-related errors.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during daemon operations.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// A pid file already exists for this worker.
    #[error("Daemon already running with a PID of {} (PID file: {})", display_pid(.pid), .path.display())]
    AlreadyRunning { path: PathBuf, pid: Option<u32> },

    /// Failed to create or write the PID file.
    #[error("Failed to create PID file at {path}: {reason}")]
    PidFileCreation { path: PathBuf, reason: String },

    /// Failed to read the PID file.
    #[error("Failed to read PID file at {path}: {reason}")]
    PidFileRead { path: PathBuf, reason: String },

    /// Process fork failed.
    #[error("Failed to fork process: {0}")]
    ForkFailed(String),

    /// Failed to set up signal handlers.
    #[error("Failed to set up signal handlers: {0}")]
    SignalSetup(String),

    /// Failed to build the async runtime that drives the loop.
    #[error("Failed to start runtime: {0}")]
    Runtime(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn display_pid(pid: &Option<u32>) -> String {
    pid.map(|p| p.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

impl DaemonError {
    /// Whether this error happened while setting the process up, before any
    /// loop iteration could run.
    pub fn is_setup_failure(&self) -> bool {
        matches!(
            self,
            DaemonError::ForkFailed(_) | DaemonError::SignalSetup(_) | DaemonError::Runtime(_)
        )
    }

    /// Process exit status for this error.
    ///
    /// Finding another instance is an expected outcome and exits cleanly.
    pub fn exit_code(&self) -> i32 {
        match self {
            DaemonError::AlreadyRunning { .. } => 0,
            _ => 1,
        }
    }
}

/// Lifecycle state of a daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Lock acquisition and `before` hook.
    Initializing,
    /// Iterating.
    Running,
    /// Loop left; `after` hook and lock release pending.
    Draining,
    /// Fully shut down.
    Terminated,
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleState::Initializing => write!(f, "initializing"),
            LifecycleState::Running => write!(f, "running"),
            LifecycleState::Draining => write!(f, "draining"),
            LifecycleState::Terminated => write!(f, "terminated"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_running_error() {
        let err = DaemonError::AlreadyRunning {
            path: PathBuf::from("/tmp/test.pid"),
            pid: Some(12345),
        };
        let msg = err.to_string();
        assert!(msg.contains("already running"));
        assert!(msg.contains("12345"));
        assert_eq!(err.exit_code(), 0);
    }

    #[test]
    fn test_already_running_unknown_owner() {
        let err = DaemonError::AlreadyRunning {
            path: PathBuf::from("/tmp/test.pid"),
            pid: None,
        };
        assert!(err.to_string().contains("unknown"));
    }

    #[test]
    fn test_setup_failures_exit_with_error() {
        let fork = DaemonError::ForkFailed("EAGAIN".to_string());
        assert!(fork.is_setup_failure());
        assert_eq!(fork.exit_code(), 1);

        let signal = DaemonError::SignalSetup("EINVAL".to_string());
        assert!(signal.is_setup_failure());
        assert_eq!(signal.exit_code(), 1);
    }

    #[test]
    fn test_config_error_is_not_setup_failure() {
        let err = DaemonError::Config("cleanup_every must be > 0".to_string());
        assert!(!err.is_setup_failure());
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_lifecycle_state_display() {
        assert_eq!(LifecycleState::Initializing.to_string(), "initializing");
        assert_eq!(LifecycleState::Running.to_string(), "running");
        assert_eq!(LifecycleState::Draining.to_string(), "draining");
        assert_eq!(LifecycleState::Terminated.to_string(), "terminated");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let daemon_err: DaemonError = io_err.into();
        assert!(daemon_err.to_string().contains("file not found"));
    }
}
