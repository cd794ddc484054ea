//! Daemon lifecycle: fork, lock, hooks, loop, shutdown.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tracing::{debug, error, info};

use crate::config::DaemonConfig;
use crate::error::{DaemonError, LifecycleState};
use crate::fork::{ForkSupervisor, ProcessRole};
use crate::housekeeping::Housekeeper;
use crate::pid::PidFileGuard;
use crate::scheduler::{DrainReason, LoopScheduler, LoopStats};
use crate::signal::{SignalHandler, TerminationFlag};
use crate::sink::{LogSink, StdioSink};
use crate::worker::{Worker, WorkerContext};

/// Lifecycle state as an atomic value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum StateValue {
    Initializing = 0,
    Running = 1,
    Draining = 2,
    Terminated = 3,
}

impl From<u8> for StateValue {
    fn from(v: u8) -> Self {
        match v {
            1 => StateValue::Running,
            2 => StateValue::Draining,
            3 => StateValue::Terminated,
            _ => StateValue::Initializing,
        }
    }
}

impl From<StateValue> for LifecycleState {
    fn from(v: StateValue) -> Self {
        match v {
            StateValue::Initializing => LifecycleState::Initializing,
            StateValue::Running => LifecycleState::Running,
            StateValue::Draining => LifecycleState::Draining,
            StateValue::Terminated => LifecycleState::Terminated,
        }
    }
}

/// How [`Daemon::run`] ended in this process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// This is the invoking process; the daemon runs in `child`.
    Parent { child: u32 },
    /// The loop ran here and has drained.
    Finished(LoopStats),
}

/// Cloneable control surface of a daemon.
#[derive(Debug, Clone)]
pub struct DaemonHandle {
    worker: String,
    flag: TerminationFlag,
    state: Arc<AtomicU8>,
}

impl DaemonHandle {
    pub fn worker(&self) -> &str {
        &self.worker
    }

    /// Request shutdown, exactly as a termination signal would.
    pub fn terminate(&self) {
        self.flag.request();
    }

    pub fn is_terminating(&self) -> bool {
        self.flag.is_requested()
    }

    pub fn state(&self) -> LifecycleState {
        StateValue::from(self.state.load(Ordering::SeqCst)).into()
    }
}

/// A single-instance background worker.
pub struct Daemon<W: Worker> {
    config: DaemonConfig,
    worker: W,
    guard: PidFileGuard,
    signals: SignalHandler,
    sink: Arc<dyn LogSink>,
    state: Arc<AtomicU8>,
}

impl<W: Worker> Daemon<W> {
    /// Validate the configuration, install signal handlers and check the pid file.
    ///
    /// Fails with [`DaemonError::AlreadyRunning`] if the pid file exists.
    pub fn new(config: DaemonConfig, worker: W) -> Result<Self, DaemonError> {
        config.validate()?;

        let signals = SignalHandler::install()?;
        let guard = PidFileGuard::new(config.pid_template(), &config.worker);
        if let Err(e) = guard.check() {
            signals.restore();
            return Err(e);
        }

        Ok(Self {
            config,
            worker,
            guard,
            signals,
            sink: Arc::new(StdioSink),
            state: Arc::new(AtomicU8::new(StateValue::Initializing as u8)),
        })
    }

    /// Flush this sink during housekeeping and at shutdown.
    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> &DaemonConfig {
        &self.config
    }

    pub fn guard(&self) -> &PidFileGuard {
        &self.guard
    }

    pub fn signals(&self) -> &SignalHandler {
        &self.signals
    }

    pub fn handle(&self) -> DaemonHandle {
        DaemonHandle {
            worker: self.config.worker.clone(),
            flag: self.signals.flag().clone(),
            state: self.state.clone(),
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.handle().state()
    }

    /// Fork if configured, then run the daemon body in the surviving process.
    ///
    /// The parent returns [`RunOutcome::Parent`] immediately. The child runs the
    /// loop to completion and then either exits with status 0
    /// (`exit_on_finish`) or returns [`RunOutcome::Finished`].
    pub fn run(self) -> Result<RunOutcome, DaemonError> {
        let supervisor = ForkSupervisor::new(self.config.fork, self.config.worker.clone());
        match supervisor.resolve() {
            Ok(ProcessRole::Child) => {}
            Ok(ProcessRole::Parent { child }) => {
                self.signals.restore();
                return Ok(RunOutcome::Parent { child });
            }
            Err(e) => {
                self.signals.restore();
                return Err(e);
            }
        }

        let exit_on_finish = self.config.exit_on_finish;

        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => {
                self.signals.restore();
                return Err(DaemonError::Runtime(e.to_string()));
            }
        };
        let stats = runtime.block_on(self.run_body())?;

        if exit_on_finish {
            std::process::exit(0);
        }
        Ok(RunOutcome::Finished(stats))
    }

    /// Lock, hooks, loop and shutdown, in the current process and runtime.
    ///
    /// Signal dispositions from before [`Daemon::new`] are back in place when
    /// this returns.
    pub async fn run_body(self) -> Result<LoopStats, DaemonError> {
        let signals = self.signals.clone();
        let result = self.drive().await;
        signals.restore();
        result
    }

    async fn drive(mut self) -> Result<LoopStats, DaemonError> {
        let worker_id = self.config.worker.clone();
        self.set_state(StateValue::Initializing);

        let mut lock = self.guard.acquire()?;
        lock.write(std::process::id())?;
        info!(
            "Task worker {} started with a PID of {}",
            worker_id,
            std::process::id()
        );

        let housekeeper = Housekeeper::new(self.sink.clone());
        let scheduler =
            LoopScheduler::new(&self.config, self.signals.clone(), housekeeper.clone());
        let mut ctx = WorkerContext::new(worker_id.clone(), self.signals.flag().clone());

        let stats = match self.worker.before(&ctx).await {
            Ok(()) => {
                self.set_state(StateValue::Running);
                scheduler.run(&mut self.worker, &mut ctx).await
            }
            Err(e) => {
                error!("Task worker {} failed before starting: {}", worker_id, e);
                LoopStats::skipped(DrainReason::BeforeFailed(e.to_string()))
            }
        };

        self.set_state(StateValue::Draining);
        if let Err(e) = self.worker.after(&ctx).await {
            error!("Task worker {} failed while finishing: {}", worker_id, e);
        }

        lock.release();
        info!("Task worker {} exiting", worker_id);
        housekeeper.flush_sink();

        self.set_state(StateValue::Terminated);
        Ok(stats)
    }

    fn set_state(&self, state: StateValue) {
        debug!("Worker {} is {}", self.config.worker, LifecycleState::from(state));
        self.state.store(state as u8, Ordering::SeqCst);
    }
}

#[cfg(all(test, unix))]
#[path = "daemon_tests.rs"]
mod tests;
