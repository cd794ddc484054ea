//! Optional detachment into a background process.

use tracing::{info, warn};

use crate::error::DaemonError;

/// Which side of the fork the caller is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessRole {
    /// The invoking process. It must return without running the daemon body.
    Parent { child: u32 },
    /// The process that runs the daemon body.
    Child,
}

impl ProcessRole {
    pub fn is_child(&self) -> bool {
        matches!(self, ProcessRole::Child)
    }
}

/// Decides whether and how the process is duplicated.
#[derive(Debug, Clone)]
pub struct ForkSupervisor {
    enabled: bool,
    worker: String,
}

impl ForkSupervisor {
    pub fn new(enabled: bool, worker: impl Into<String>) -> Self {
        Self {
            enabled,
            worker: worker.into(),
        }
    }

    /// Fork if enabled, otherwise play the child role directly.
    ///
    /// Must be called before any async runtime or extra thread is started.
    pub fn resolve(&self) -> Result<ProcessRole, DaemonError> {
        if !self.enabled {
            return Ok(ProcessRole::Child);
        }
        self.fork()
    }

    #[cfg(unix)]
    fn fork(&self) -> Result<ProcessRole, DaemonError> {
        use nix::unistd::{fork, setsid, ForkResult};
        use std::io::Write;

        // Buffered output would otherwise be written twice.
        let _ = std::io::stdout().flush();
        let _ = std::io::stderr().flush();

        // SAFETY: called while the process is still single-threaded.
        match unsafe { fork() } {
            Ok(ForkResult::Parent { child }) => {
                let child = child.as_raw() as u32;
                info!("Worker {} forked with a PID of {}", self.worker, child);
                println!("Process forked with a PID of {}", child);
                Ok(ProcessRole::Parent { child })
            }
            Ok(ForkResult::Child) => {
                // Leave the invoking terminal's session.
                if let Err(e) = setsid() {
                    warn!("setsid failed, staying in the parent session: {}", e);
                }
                Ok(ProcessRole::Child)
            }
            Err(e) => Err(DaemonError::ForkFailed(e.to_string())),
        }
    }

    #[cfg(not(unix))]
    fn fork(&self) -> Result<ProcessRole, DaemonError> {
        warn!(
            "Forking is not supported on this platform; worker {} runs in the foreground",
            self.worker
        );
        Ok(ProcessRole::Child)
    }
}
