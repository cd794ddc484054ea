//! Configuration schema definitions.

use std::path::PathBuf;

use serde::{Deserialize, Deserializer, Serialize};

/// Placeholder substituted with the worker id in pid path templates.
pub const WORKER_PLACEHOLDER: &str = "{worker}";

pub(crate) fn default_true() -> bool {
    true
}

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonSection,

    #[serde(default)]
    pub log: LogSection,
}

/// `[daemon]` section: lifecycle options of a worker daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonSection {
    /// Fork into the background before running.
    #[serde(default = "default_true")]
    pub fork: bool,

    /// Pid file template; `{worker}` is replaced by the worker id.
    /// An empty string disables single-instance locking.
    #[serde(default = "default_pid")]
    pub pid: String,

    /// Exit the process when the loop finishes instead of returning.
    #[serde(default = "default_true")]
    pub exit: bool,

    /// Worker identifier. Accepts a number or a string.
    #[serde(default = "default_worker", deserialize_with = "deserialize_worker")]
    pub worker: String,

    /// Pause between iterations, in milliseconds.
    #[serde(default = "default_sleep_ms")]
    pub sleep_ms: u64,

    /// Iterations between housekeeping passes.
    #[serde(default = "default_cleanup_iterations")]
    pub cleanup_iterations: u64,

    /// Stop the loop when an iteration fails.
    #[serde(default = "default_true")]
    pub break_on_error: bool,
}

fn default_pid() -> String {
    std::env::temp_dir()
        .join(format!("minder-daemon-{}.pid", WORKER_PLACEHOLDER))
        .to_string_lossy()
        .into_owned()
}

fn default_worker() -> String {
    "1".to_string()
}

fn default_sleep_ms() -> u64 {
    1000
}

fn default_cleanup_iterations() -> u64 {
    1000
}

fn deserialize_worker<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum WorkerId {
        Number(u64),
        Text(String),
    }

    Ok(match WorkerId::deserialize(deserializer)? {
        WorkerId::Number(n) => n.to_string(),
        WorkerId::Text(s) => s,
    })
}

impl Default for DaemonSection {
    fn default() -> Self {
        Self {
            fork: default_true(),
            pid: default_pid(),
            exit: default_true(),
            worker: default_worker(),
            sleep_ms: default_sleep_ms(),
            cleanup_iterations: default_cleanup_iterations(),
            break_on_error: default_true(),
        }
    }
}

impl DaemonSection {
    /// The pid template, or `None` when locking is disabled.
    pub fn pid_template(&self) -> Option<&str> {
        let trimmed = self.pid.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed)
        }
    }
}

/// `[log]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSection {
    /// Default filter directive when `RUST_LOG` is not set.
    #[serde(default = "default_level")]
    pub level: String,

    /// Directory for rolling log files.
    #[serde(default = "default_log_dir")]
    pub dir: PathBuf,

    /// Also log to the console.
    #[serde(default = "default_true")]
    pub console: bool,

    /// Number of rotated log files to keep.
    #[serde(default = "default_max_files")]
    pub max_files: usize,
}

fn default_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".minder").join("logs"))
        .unwrap_or_else(|| std::env::temp_dir().join("minder-logs"))
}

fn default_max_files() -> usize {
    14
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: default_level(),
            dir: default_log_dir(),
            console: default_true(),
            max_files: default_max_files(),
        }
    }
}

#[cfg(test)]
#[path = "schema_tests.rs"]
mod tests;
