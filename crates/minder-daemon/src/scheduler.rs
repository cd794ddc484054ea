//! The iteration loop.
//!
//! Each iteration:
//!
//! 1. dispatch pending signals
//! 2. drain if termination was requested
//! 3. count the iteration
//! 4. `heartbeat` (failures are logged and ignored)
//! 5. `tick` inside the failure boundary
//! 6. drain on termination, `Flow::Stop`, or a failure with `break_on_error`
//! 7. housekeeping every `cleanup_every` iterations, then reset the counter
//! 8. sleep for `sleep_interval`

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use tracing::{debug, error, warn};

use crate::config::DaemonConfig;
use crate::housekeeping::Housekeeper;
use crate::signal::SignalHandler;
use crate::worker::{Flow, Worker, WorkerContext};

/// Result of one guarded `tick`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IterationOutcome {
    Continue,
    Stop,
    /// The tick returned an error or panicked.
    Failed(String),
}

/// Why the loop stopped iterating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainReason {
    /// Termination flag (signal or `terminate()`).
    Terminated,
    /// The worker returned `Flow::Stop`.
    Stopped,
    /// A tick failed and `break_on_error` is set.
    Failed(String),
    /// The `before` hook failed; no iteration ran.
    BeforeFailed(String),
}

/// Counters of a finished loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopStats {
    pub iterations: u64,
    pub cleanups: u64,
    pub failures: u64,
    pub reason: DrainReason,
}

impl LoopStats {
    pub(crate) fn skipped(reason: DrainReason) -> Self {
        Self {
            iterations: 0,
            cleanups: 0,
            failures: 0,
            reason,
        }
    }
}

/// Drives a worker until it drains.
pub struct LoopScheduler {
    sleep_interval: Duration,
    cleanup_every: u64,
    break_on_error: bool,
    signals: SignalHandler,
    housekeeper: Housekeeper,
}

impl LoopScheduler {
    pub fn new(config: &DaemonConfig, signals: SignalHandler, housekeeper: Housekeeper) -> Self {
        Self {
            sleep_interval: config.sleep_interval,
            cleanup_every: config.cleanup_every.max(1),
            break_on_error: config.break_on_error,
            signals,
            housekeeper,
        }
    }

    /// Iterate until termination, `Flow::Stop`, or a failure with `break_on_error`.
    pub async fn run<W>(&self, worker: &mut W, ctx: &mut WorkerContext) -> LoopStats
    where
        W: Worker + ?Sized,
    {
        let mut cleanups = 0;
        let mut failures = 0;

        let reason = loop {
            self.signals.dispatch();
            if ctx.is_terminating() {
                break DrainReason::Terminated;
            }

            ctx.advance();

            if let Err(e) = worker.heartbeat(ctx).await {
                warn!(
                    "Heartbeat of worker {} failed on iteration {}: {}",
                    ctx.worker(),
                    ctx.total_iterations(),
                    e
                );
            }

            let drain = match guarded_tick(worker, ctx).await {
                IterationOutcome::Continue => None,
                IterationOutcome::Stop => Some(DrainReason::Stopped),
                IterationOutcome::Failed(reason) => {
                    failures += 1;
                    error!(
                        "Task worker {} failed on iteration {}: {}",
                        ctx.worker(),
                        ctx.total_iterations(),
                        reason
                    );
                    self.break_on_error.then_some(DrainReason::Failed(reason))
                }
            };

            if let Some(reason) = drain {
                break reason;
            }
            if ctx.is_terminating() {
                break DrainReason::Terminated;
            }

            if ctx.iteration() >= self.cleanup_every {
                self.cleanup(worker, ctx).await;
                cleanups += 1;
            }

            if !self.sleep_interval.is_zero() {
                tokio::time::sleep(self.sleep_interval).await;
            }
        };

        debug!(
            "Loop of worker {} drained after {} iterations: {:?}",
            ctx.worker(),
            ctx.total_iterations(),
            reason
        );

        LoopStats {
            iterations: ctx.total_iterations(),
            cleanups,
            failures,
            reason,
        }
    }

    async fn cleanup<W>(&self, worker: &mut W, ctx: &mut WorkerContext)
    where
        W: Worker + ?Sized,
    {
        self.housekeeper.run();

        if let Err(e) = worker.cleanup(ctx).await {
            warn!("Cleanup of worker {} failed: {}", ctx.worker(), e);
        }

        ctx.reset_iteration();
    }
}

/// Run one `tick`, turning errors and panics into `IterationOutcome::Failed`.
pub async fn guarded_tick<W>(worker: &mut W, ctx: &WorkerContext) -> IterationOutcome
where
    W: Worker + ?Sized,
{
    match AssertUnwindSafe(worker.tick(ctx)).catch_unwind().await {
        Ok(Ok(Flow::Continue)) => IterationOutcome::Continue,
        Ok(Ok(Flow::Stop)) => IterationOutcome::Stop,
        Ok(Err(e)) => IterationOutcome::Failed(e.to_string()),
        Err(panic) => IterationOutcome::Failed(panic_message(panic.as_ref())),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
