//! minder - single-instance background worker daemon
//!
//! Main entry point for the minder CLI.

mod cli;
mod logging;
mod worker;

use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::Parser;
use tracing::{error, info, warn};

use minder_config::{Config, ConfigLoader, ConfigValidator};
use minder_daemon::pid::is_process_alive;
use minder_daemon::signal::send_to_pid;
use minder_daemon::{Daemon, DaemonConfig, DaemonError, PidFileGuard, PidStatus, RunOutcome};

use crate::cli::{Cli, Commands};
use crate::logging::init_tracing;
use crate::worker::PulseWorker;

type CliResult = Result<ExitCode, Box<dyn std::error::Error>>;

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> CliResult {
    let mut config = ConfigLoader::load_or_default(&cli.config)?;

    match cli.command {
        Commands::Run {
            daemon,
            max_ticks,
            heartbeat_file,
        } => {
            daemon.apply(&mut config);
            let sink = prepare(&config)?;

            let daemon_config = DaemonConfig::from(&config.daemon);
            let heartbeat_file = heartbeat_file.unwrap_or_else(|| {
                config
                    .log
                    .dir
                    .join(format!("pulse-{}.heartbeat", daemon_config.worker))
            });

            let worker = PulseWorker::new(heartbeat_file, max_ticks);
            let daemon = match Daemon::new(daemon_config, worker) {
                Ok(daemon) => daemon.with_sink(sink),
                Err(e) => return Ok(report(e)),
            };

            match daemon.run() {
                Ok(RunOutcome::Parent { .. }) => Ok(ExitCode::SUCCESS),
                Ok(RunOutcome::Finished(stats)) => {
                    info!(
                        "Loop finished: {} iterations, {} cleanups, {} failures ({:?})",
                        stats.iterations, stats.cleanups, stats.failures, stats.reason
                    );
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => Ok(report(e)),
            }
        }
        Commands::Status { target, json } => {
            target.apply(&mut config);
            prepare(&config)?;
            status(&config, json)
        }
        Commands::Stop {
            target,
            force,
            timeout,
        } => {
            target.apply(&mut config);
            prepare(&config)?;
            stop(&config, force, Duration::from_secs(timeout))
        }
    }
}

/// Validate the merged configuration and start logging.
fn prepare(config: &Config) -> Result<std::sync::Arc<logging::AppSink>, Box<dyn std::error::Error>> {
    let warnings = ConfigValidator::validate(config).into_result()?;
    let sink = init_tracing(&config.log)?;

    for warning in warnings {
        warn!("{}: {}", warning.path, warning.message);
    }
    Ok(sink)
}

/// Print a daemon error and map it to the process exit status.
fn report(err: DaemonError) -> ExitCode {
    match &err {
        DaemonError::AlreadyRunning { pid, .. } => {
            let owner = pid.map(|p| p.to_string()).unwrap_or_else(|| "unknown".to_string());
            info!("{}", err);
            println!("Daemon already running with a PID of {}", owner);
        }
        _ => {
            let message = failure_message(&err);
            error!("{}", message);
            eprintln!("{}", message);
        }
    }
    ExitCode::from(err.exit_code() as u8)
}

/// Fork, signal and runtime failures happen before the worker ever runs.
fn failure_message(err: &DaemonError) -> String {
    if err.is_setup_failure() {
        format!("Daemon setup failed: {}", err)
    } else {
        format!("Error: {}", err)
    }
}

fn guard_for(config: &Config) -> PidFileGuard {
    PidFileGuard::new(config.daemon.pid_template(), config.daemon.worker.trim())
}

fn status(config: &Config, json: bool) -> CliResult {
    let status = guard_for(config).status()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        match &status {
            PidStatus::Disabled => println!("Pid file disabled; status unknown"),
            PidStatus::NotRunning { path } => {
                println!("Not running (no pid file at {})", path.display())
            }
            PidStatus::Running { path, pid } => {
                println!("Running with a PID of {} ({})", pid, path.display())
            }
            PidStatus::Stale { path, pid } => println!(
                "Stale pid file {} (PID {}); remove it if no worker is running",
                path.display(),
                pid.map(|p| p.to_string()).unwrap_or_else(|| "unknown".to_string())
            ),
        }
    }

    Ok(match status {
        PidStatus::Running { .. } => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
    })
}

fn stop(config: &Config, force: bool, timeout: Duration) -> CliResult {
    let pid = match guard_for(config).status()? {
        PidStatus::Running { pid, .. } => pid,
        PidStatus::Disabled => {
            println!("Pid file disabled; cannot find the worker");
            return Ok(ExitCode::FAILURE);
        }
        PidStatus::NotRunning { .. } => {
            println!("Worker {} is not running", config.daemon.worker);
            return Ok(ExitCode::SUCCESS);
        }
        PidStatus::Stale { path, .. } => {
            println!(
                "Stale pid file {}; remove it if no worker is running",
                path.display()
            );
            return Ok(ExitCode::FAILURE);
        }
    };

    info!("Stopping worker {} (PID: {})...", config.daemon.worker, pid);
    send_to_pid(pid, force)?;

    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if !is_process_alive(pid) {
            info!("Worker {} stopped", config.daemon.worker);
            println!("Stopped PID {}", pid);
            return Ok(ExitCode::SUCCESS);
        }
        std::thread::sleep(Duration::from_millis(100));
    }

    if force {
        error!("Worker did not stop in time");
    } else {
        warn!("Worker did not stop gracefully, try --force");
    }
    Ok(ExitCode::FAILURE)
}
