//! CLI definitions for minder.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use minder_config::Config;

/// minder CLI.
#[derive(Parser)]
#[command(name = "minder")]
#[command(about = "Single-instance background worker daemon")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config/minder.toml", global = true)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Start the pulse worker
    Run {
        #[command(flatten)]
        daemon: DaemonArgs,

        /// Stop after this many ticks
        #[arg(long)]
        max_ticks: Option<u64>,

        /// Heartbeat file (default: next to the log files)
        #[arg(long)]
        heartbeat_file: Option<PathBuf>,
    },

    /// Show whether a worker is running
    Status {
        #[command(flatten)]
        target: TargetArgs,

        /// Print the status as JSON
        #[arg(long)]
        json: bool,
    },

    /// Stop a running worker
    Stop {
        #[command(flatten)]
        target: TargetArgs,

        /// Send SIGKILL instead of SIGTERM
        #[arg(long)]
        force: bool,

        /// Seconds to wait for the worker to exit
        #[arg(long, default_value_t = 10)]
        timeout: u64,
    },
}

/// Lifecycle overrides for `run`.
#[derive(Args, Debug, Default)]
pub(crate) struct DaemonArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Fork into the background
    #[arg(long, overrides_with = "no_fork")]
    pub fork: bool,

    /// Stay in the foreground
    #[arg(long, overrides_with = "fork")]
    pub no_fork: bool,

    /// Exit the process when the loop finishes
    #[arg(long, overrides_with = "no_exit")]
    pub exit: bool,

    /// Return instead of exiting when the loop finishes
    #[arg(long, overrides_with = "exit")]
    pub no_exit: bool,

    /// Milliseconds to sleep between iterations
    #[arg(long)]
    pub sleep_ms: Option<u64>,

    /// Iterations between cleanup passes
    #[arg(long)]
    pub cleanup_iterations: Option<u64>,

    /// Keep iterating after a failed tick
    #[arg(long)]
    pub keep_going: bool,
}

/// Which worker a command addresses.
#[derive(Args, Debug, Default)]
pub(crate) struct TargetArgs {
    /// Worker id
    #[arg(short, long)]
    pub worker: Option<String>,

    /// Pid file template (`{worker}` is replaced by the worker id, empty disables)
    #[arg(long)]
    pub pid: Option<String>,
}

impl TargetArgs {
    pub fn apply(&self, config: &mut Config) {
        if let Some(worker) = &self.worker {
            config.daemon.worker = worker.clone();
        }
        if let Some(pid) = &self.pid {
            config.daemon.pid = pid.clone();
        }
    }
}

impl DaemonArgs {
    /// Apply CLI overrides on top of the file configuration.
    pub fn apply(&self, config: &mut Config) {
        self.target.apply(config);

        if self.fork {
            config.daemon.fork = true;
        }
        if self.no_fork {
            config.daemon.fork = false;
        }
        if self.exit {
            config.daemon.exit = true;
        }
        if self.no_exit {
            config.daemon.exit = false;
        }
        if let Some(ms) = self.sleep_ms {
            config.daemon.sleep_ms = ms;
        }
        if let Some(n) = self.cleanup_iterations {
            config.daemon.cleanup_iterations = n;
        }
        if self.keep_going {
            config.daemon.break_on_error = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_overrides() {
        let cli = Cli::parse_from([
            "minder",
            "run",
            "--no-fork",
            "--worker",
            "9",
            "--sleep-ms",
            "5",
            "--cleanup-iterations",
            "3",
            "--keep-going",
            "--max-ticks",
            "4",
        ]);

        let Commands::Run {
            daemon, max_ticks, ..
        } = cli.command
        else {
            panic!("expected run");
        };
        assert_eq!(max_ticks, Some(4));

        let mut config = Config::default();
        daemon.apply(&mut config);
        assert!(!config.daemon.fork);
        assert_eq!(config.daemon.worker, "9");
        assert_eq!(config.daemon.sleep_ms, 5);
        assert_eq!(config.daemon.cleanup_iterations, 3);
        assert!(!config.daemon.break_on_error);
    }

    #[test]
    fn test_last_fork_flag_wins() {
        let cli = Cli::parse_from(["minder", "run", "--no-fork", "--fork"]);
        let Commands::Run { daemon, .. } = cli.command else {
            panic!("expected run");
        };

        let mut config = Config::default();
        config.daemon.fork = false;
        daemon.apply(&mut config);
        assert!(config.daemon.fork);
    }

    #[test]
    fn test_empty_pid_disables_locking() {
        let cli = Cli::parse_from(["minder", "status", "--pid", ""]);
        let Commands::Status { target, .. } = cli.command else {
            panic!("expected status");
        };

        let mut config = Config::default();
        target.apply(&mut config);
        assert!(config.daemon.pid_template().is_none());
    }

    #[test]
    fn test_no_flags_keep_file_values() {
        let mut config = Config::default();
        config.daemon.fork = false;
        config.daemon.exit = false;

        DaemonArgs::default().apply(&mut config);
        assert!(!config.daemon.fork);
        assert!(!config.daemon.exit);
        assert!(config.daemon.break_on_error);
    }
}
