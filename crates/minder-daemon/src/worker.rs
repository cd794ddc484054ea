//! Extension points of a daemon.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::signal::TerminationFlag;

/// Error type accepted from worker hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result of a worker hook.
pub type HookResult<T = ()> = Result<T, BoxError>;

/// What the worker wants after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Run another iteration.
    Continue,
    /// Drain the loop and shut down.
    Stop,
}

impl From<bool> for Flow {
    fn from(keep_going: bool) -> Self {
        if keep_going {
            Flow::Continue
        } else {
            Flow::Stop
        }
    }
}

/// The work a daemon performs.
///
/// Only [`Worker::tick`] is required. Hooks are called in this order:
///
/// ```text
/// before
/// loop { heartbeat, tick, [cleanup every N iterations] }
/// after
/// ```
#[async_trait]
pub trait Worker: Send {
    /// Runs once after the pid file is claimed. An error skips the loop.
    async fn before(&mut self, _ctx: &WorkerContext) -> HookResult {
        Ok(())
    }

    /// Runs at the start of every iteration, before `tick`.
    async fn heartbeat(&mut self, _ctx: &WorkerContext) -> HookResult {
        Ok(())
    }

    /// One unit of work.
    async fn tick(&mut self, ctx: &WorkerContext) -> HookResult<Flow>;

    /// Extra housekeeping, run after the built-in pass.
    async fn cleanup(&mut self, _ctx: &WorkerContext) -> HookResult {
        Ok(())
    }

    /// Runs once after the loop has drained, before the pid file is released.
    async fn after(&mut self, _ctx: &WorkerContext) -> HookResult {
        Ok(())
    }
}

/// State visible to worker hooks.
#[derive(Debug, Clone)]
pub struct WorkerContext {
    worker: String,
    iteration: u64,
    total_iterations: u64,
    started_at: DateTime<Utc>,
    flag: TerminationFlag,
}

impl WorkerContext {
    pub fn new(worker: impl Into<String>, flag: TerminationFlag) -> Self {
        Self {
            worker: worker.into(),
            iteration: 0,
            total_iterations: 0,
            started_at: Utc::now(),
            flag,
        }
    }

    pub fn worker(&self) -> &str {
        &self.worker
    }

    /// Iterations since the last cleanup.
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    /// Iterations since the loop started.
    pub fn total_iterations(&self) -> u64 {
        self.total_iterations
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn uptime(&self) -> Duration {
        (Utc::now() - self.started_at).to_std().unwrap_or_default()
    }

    /// Request shutdown, exactly as a termination signal would.
    pub fn terminate(&self) {
        self.flag.request();
    }

    pub fn is_terminating(&self) -> bool {
        self.flag.is_requested()
    }

    pub(crate) fn advance(&mut self) {
        self.iteration += 1;
        self.total_iterations += 1;
    }

    pub(crate) fn reset_iteration(&mut self) {
        self.iteration = 0;
    }
}
