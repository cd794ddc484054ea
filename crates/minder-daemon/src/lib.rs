//! # Minder Daemon
//!
//! Lifecycle engine for long-running background workers.
//!
//! ## Features
//!
//! - Pid file guard (at most one instance per worker id)
//! - Signal handling (SIGINT/SIGTERM/SIGQUIT request a graceful stop)
//! - Optional fork into the background
//! - Paced work loop with periodic housekeeping and a failure policy
//!
//! ## Usage
//!
//! ```rust,ignore
//! use minder_daemon::{Daemon, DaemonConfig, Flow, HookResult, Worker, WorkerContext};
//!
//! struct Printer;
//!
//! #[async_trait::async_trait]
//! impl Worker for Printer {
//!     async fn tick(&mut self, ctx: &WorkerContext) -> HookResult<Flow> {
//!         println!("iteration {}", ctx.total_iterations());
//!         Ok(Flow::Continue)
//!     }
//! }
//!
//! let daemon = Daemon::new(DaemonConfig::default(), Printer)?;
//! daemon.run()?;
//! ```
//!
//! ## Lifecycle
//!
//! ```text
//! new()  ── install signal handlers, check pid file
//! run()  ── fork? ── parent returns
//!             └── child: acquire lock ─ before ─ loop { signals, heartbeat, tick, cleanup, sleep } ─ after ─ release
//! ```

pub mod config;
pub mod daemon;
pub mod error;
pub mod fork;
pub mod housekeeping;
pub mod pid;
pub mod scheduler;
pub mod signal;
pub mod sink;
pub mod worker;

// Re-exports
pub use config::DaemonConfig;
pub use daemon::{Daemon, DaemonHandle, RunOutcome};
pub use error::{DaemonError, LifecycleState};
pub use fork::{ForkSupervisor, ProcessRole};
pub use housekeeping::{HousekeepingReport, Housekeeper};
pub use pid::{LockHandle, PidFileGuard, PidStatus};
pub use scheduler::{DrainReason, IterationOutcome, LoopScheduler, LoopStats};
pub use signal::{DaemonSignal, SignalHandler, TerminationFlag};
pub use sink::{LogSink, StdioSink};
pub use worker::{BoxError, Flow, HookResult, Worker, WorkerContext};
