//! Daemon configuration.

use std::time::Duration;

use minder_config::DaemonSection;

use crate::error::DaemonError;

/// Resolved runtime configuration of a daemon.
///
/// Built once at startup (usually from the `[daemon]` section of the config file
/// with CLI overrides applied) and never changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonConfig {
    /// Fork into the background before running the loop.
    pub fork: bool,

    /// Pid file template. `{worker}` is replaced by the worker id.
    /// `None` disables single-instance locking.
    pub pid_template: Option<String>,

    /// Worker identifier.
    pub worker: String,

    /// Exit the process with status 0 once the loop has drained.
    pub exit_on_finish: bool,

    /// Pause between iterations.
    pub sleep_interval: Duration,

    /// Iterations between housekeeping passes.
    pub cleanup_every: u64,

    /// Drain the loop when an iteration fails.
    pub break_on_error: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self::from(&DaemonSection::default())
    }
}

impl From<&DaemonSection> for DaemonConfig {
    fn from(section: &DaemonSection) -> Self {
        Self {
            fork: section.fork,
            pid_template: section.pid_template().map(str::to_string),
            worker: section.worker.trim().to_string(),
            exit_on_finish: section.exit,
            sleep_interval: Duration::from_millis(section.sleep_ms),
            cleanup_every: section.cleanup_iterations,
            break_on_error: section.break_on_error,
        }
    }
}

impl DaemonConfig {
    /// A configuration that runs in the calling process and returns when done.
    ///
    /// No fork, no pid file, no pause between iterations.
    pub fn foreground(worker: impl Into<String>) -> Self {
        Self {
            fork: false,
            pid_template: None,
            worker: worker.into(),
            exit_on_finish: false,
            sleep_interval: Duration::ZERO,
            ..Default::default()
        }
    }

    /// Set the pid file template. A blank template disables locking.
    pub fn with_pid_template(mut self, template: impl Into<String>) -> Self {
        let template = template.into();
        self.pid_template = (!template.trim().is_empty()).then_some(template);
        self
    }

    pub fn with_cleanup_every(mut self, n: u64) -> Self {
        self.cleanup_every = n;
        self
    }

    pub fn with_sleep_interval(mut self, interval: Duration) -> Self {
        self.sleep_interval = interval;
        self
    }

    pub fn with_break_on_error(mut self, break_on_error: bool) -> Self {
        self.break_on_error = break_on_error;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), DaemonError> {
        if self.cleanup_every == 0 {
            return Err(DaemonError::Config(
                "cleanup_every must be > 0".to_string(),
            ));
        }

        if self.worker.is_empty() {
            return Err(DaemonError::Config("worker id cannot be empty".to_string()));
        }

        Ok(())
    }

    /// The pid file template in effect, trimmed. Blank counts as unset.
    pub fn pid_template(&self) -> Option<&str> {
        self.pid_template
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
