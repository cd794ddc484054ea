use super::*;
use std::sync::Arc;

use async_trait::async_trait;
use serial_test::serial;

use crate::signal::{record, DaemonSignal, TerminationFlag};
use crate::sink::StdioSink;
use crate::worker::HookResult;

#[derive(Default)]
struct ScriptedWorker {
    stop_on: Option<u64>,
    fail_on: Vec<u64>,
    panic_on: Option<u64>,
    terminate_in_heartbeat_on: Option<u64>,
    heartbeat_fails: bool,
    events: Vec<String>,
    counter_in_tick: Vec<u64>,
}

#[async_trait]
impl Worker for ScriptedWorker {
    async fn heartbeat(&mut self, ctx: &WorkerContext) -> HookResult {
        let n = ctx.total_iterations();
        self.events.push(format!("heartbeat:{}", n));
        if self.terminate_in_heartbeat_on == Some(n) {
            ctx.terminate();
        }
        if self.heartbeat_fails {
            return Err("heartbeat file not writable".into());
        }
        Ok(())
    }

    async fn tick(&mut self, ctx: &WorkerContext) -> HookResult<Flow> {
        let n = ctx.total_iterations();
        self.events.push(format!("tick:{}", n));
        self.counter_in_tick.push(ctx.iteration());

        if self.panic_on == Some(n) {
            panic!("boom");
        }
        if self.fail_on.contains(&n) {
            return Err(format!("failure on {}", n).into());
        }
        Ok(Flow::from(self.stop_on != Some(n)))
    }

    async fn cleanup(&mut self, ctx: &WorkerContext) -> HookResult {
        self.events.push(format!("cleanup:{}", ctx.total_iterations()));
        Ok(())
    }
}

fn scheduler(config: &DaemonConfig, flag: TerminationFlag) -> LoopScheduler {
    LoopScheduler::new(
        config,
        SignalHandler::unregistered(flag),
        Housekeeper::new(Arc::new(StdioSink)),
    )
}

async fn run_worker(config: DaemonConfig, worker: &mut ScriptedWorker) -> (LoopStats, WorkerContext) {
    let flag = TerminationFlag::new();
    let mut ctx = WorkerContext::new(config.worker.clone(), flag.clone());
    let stats = scheduler(&config, flag).run(worker, &mut ctx).await;
    (stats, ctx)
}

fn count(events: &[String], prefix: &str) -> usize {
    events.iter().filter(|e| e.starts_with(prefix)).count()
}

#[tokio::test]
#[serial(signals)]
async fn test_six_iterations_with_cleanup_every_three() {
    let config = DaemonConfig::foreground("1").with_cleanup_every(3);
    let mut worker = ScriptedWorker {
        stop_on: Some(6),
        ..Default::default()
    };

    let (stats, _) = run_worker(config, &mut worker).await;

    assert_eq!(stats.iterations, 6);
    assert_eq!(stats.cleanups, 1);
    assert_eq!(stats.reason, DrainReason::Stopped);
    assert_eq!(count(&worker.events, "tick:"), 6);

    let tick3 = worker.events.iter().position(|e| e == "tick:3").unwrap();
    assert_eq!(worker.events[tick3 + 1], "cleanup:3");
    assert_eq!(count(&worker.events, "cleanup:"), 1);
}

#[tokio::test]
#[serial(signals)]
async fn test_counter_is_zero_after_cleanup() {
    let config = DaemonConfig::foreground("1").with_cleanup_every(2);
    let mut worker = ScriptedWorker {
        stop_on: Some(5),
        ..Default::default()
    };

    let (_, ctx) = run_worker(config, &mut worker).await;

    // Counter seen by tick: reset to 0 after each cleanup, then incremented.
    assert_eq!(worker.counter_in_tick, vec![1, 2, 1, 2, 1]);
    assert_eq!(ctx.total_iterations(), 5);
}

#[tokio::test]
#[serial(signals)]
async fn test_heartbeat_precedes_tick() {
    let config = DaemonConfig::foreground("1");
    let mut worker = ScriptedWorker {
        stop_on: Some(2),
        ..Default::default()
    };

    run_worker(config, &mut worker).await;
    assert_eq!(
        worker.events,
        vec!["heartbeat:1", "tick:1", "heartbeat:2", "tick:2"]
    );
}

#[tokio::test]
#[serial(signals)]
async fn test_failure_with_break_on_error_drains_same_iteration() {
    let config = DaemonConfig::foreground("1").with_cleanup_every(2);
    let mut worker = ScriptedWorker {
        fail_on: vec![2],
        ..Default::default()
    };

    let (stats, _) = run_worker(config, &mut worker).await;

    assert_eq!(stats.iterations, 2);
    assert_eq!(stats.failures, 1);
    assert_eq!(stats.reason, DrainReason::Failed("failure on 2".to_string()));
    // Drained before the cleanup check of iteration 2.
    assert_eq!(count(&worker.events, "cleanup:"), 0);
}

#[tokio::test]
#[serial(signals)]
async fn test_failure_without_break_on_error_continues() {
    let config = DaemonConfig::foreground("1").with_break_on_error(false);
    let mut worker = ScriptedWorker {
        fail_on: vec![2, 3],
        stop_on: Some(4),
        ..Default::default()
    };

    let (stats, _) = run_worker(config, &mut worker).await;

    assert_eq!(stats.iterations, 4);
    assert_eq!(stats.failures, 2);
    assert_eq!(stats.reason, DrainReason::Stopped);
    assert_eq!(worker.counter_in_tick, vec![1, 2, 3, 4]);
}

#[tokio::test]
#[serial(signals)]
async fn test_panic_is_caught_by_boundary() {
    let config = DaemonConfig::foreground("1");
    let mut worker = ScriptedWorker {
        panic_on: Some(1),
        ..Default::default()
    };

    let (stats, _) = run_worker(config, &mut worker).await;

    assert_eq!(stats.iterations, 1);
    assert_eq!(stats.reason, DrainReason::Failed("panicked: boom".to_string()));
}

#[tokio::test]
#[serial(signals)]
async fn test_terminate_in_heartbeat_finishes_iteration() {
    let config = DaemonConfig::foreground("1");
    let mut worker = ScriptedWorker {
        terminate_in_heartbeat_on: Some(2),
        ..Default::default()
    };

    let (stats, ctx) = run_worker(config, &mut worker).await;

    assert_eq!(stats.iterations, 2);
    assert_eq!(stats.reason, DrainReason::Terminated);
    assert!(ctx.is_terminating());
    assert_eq!(worker.events.last().unwrap(), "tick:2");
    assert!(!worker.events.iter().any(|e| e.ends_with(":3")));
}

#[tokio::test]
#[serial(signals)]
async fn test_heartbeat_failure_does_not_halt() {
    let config = DaemonConfig::foreground("1");
    let mut worker = ScriptedWorker {
        heartbeat_fails: true,
        stop_on: Some(3),
        ..Default::default()
    };

    let (stats, _) = run_worker(config, &mut worker).await;
    assert_eq!(stats.iterations, 3);
    assert_eq!(stats.failures, 0);
}

#[tokio::test]
#[serial(signals)]
async fn test_requested_flag_prevents_first_iteration() {
    let config = DaemonConfig::foreground("1");
    let flag = TerminationFlag::new();
    flag.request();

    let mut worker = ScriptedWorker::default();
    let mut ctx = WorkerContext::new("1", flag.clone());
    let stats = scheduler(&config, flag).run(&mut worker, &mut ctx).await;

    assert_eq!(stats.iterations, 0);
    assert_eq!(stats.reason, DrainReason::Terminated);
    assert!(worker.events.is_empty());
}

#[tokio::test]
#[serial(signals)]
async fn test_pending_signal_drains_at_boundary() {
    let config = DaemonConfig::foreground("1");
    let flag = TerminationFlag::new();
    let mut worker = ScriptedWorker::default();
    let mut ctx = WorkerContext::new("1", flag.clone());

    record(DaemonSignal::Terminate.as_raw());
    let stats = scheduler(&config, flag.clone()).run(&mut worker, &mut ctx).await;

    assert_eq!(stats.iterations, 0);
    assert_eq!(stats.reason, DrainReason::Terminated);
    assert!(flag.is_requested());
}

#[tokio::test(start_paused = true)]
#[serial(signals)]
async fn test_sleep_between_iterations() {
    let config = DaemonConfig::foreground("1").with_sleep_interval(Duration::from_secs(60));
    let mut worker = ScriptedWorker {
        stop_on: Some(3),
        ..Default::default()
    };

    let start = tokio::time::Instant::now();
    run_worker(config, &mut worker).await;

    // Two pauses: after iterations 1 and 2, none after the stopping one.
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(120));
    assert!(elapsed < Duration::from_secs(180));
}

#[tokio::test]
async fn test_guarded_tick_outcomes() {
    let ctx = WorkerContext::new("1", TerminationFlag::new());

    let mut ok = ScriptedWorker::default();
    assert_eq!(guarded_tick(&mut ok, &ctx).await, IterationOutcome::Continue);

    let mut failing = ScriptedWorker {
        fail_on: vec![0],
        ..Default::default()
    };
    assert_eq!(
        guarded_tick(&mut failing, &ctx).await,
        IterationOutcome::Failed("failure on 0".to_string())
    );

    let mut stopping = ScriptedWorker {
        stop_on: Some(0),
        ..Default::default()
    };
    assert_eq!(guarded_tick(&mut stopping, &ctx).await, IterationOutcome::Stop);
}
