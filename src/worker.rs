//! The bundled pulse worker.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info};

use minder_daemon::{Flow, HookResult, Worker, WorkerContext};

/// Records a liveness timestamp every iteration and counts ticks.
pub(crate) struct PulseWorker {
    heartbeat_file: PathBuf,
    max_ticks: Option<u64>,
    ticks: u64,
}

impl PulseWorker {
    pub fn new(heartbeat_file: PathBuf, max_ticks: Option<u64>) -> Self {
        Self {
            heartbeat_file,
            max_ticks,
            ticks: 0,
        }
    }
}

#[async_trait]
impl Worker for PulseWorker {
    async fn before(&mut self, ctx: &WorkerContext) -> HookResult {
        if let Some(parent) = self.heartbeat_file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        info!(
            "Pulse worker {} writing heartbeats to {}",
            ctx.worker(),
            self.heartbeat_file.display()
        );
        Ok(())
    }

    async fn heartbeat(&mut self, ctx: &WorkerContext) -> HookResult {
        let line = format!(
            "{} pid={} iteration={}\n",
            Utc::now().to_rfc3339(),
            std::process::id(),
            ctx.total_iterations()
        );
        tokio::fs::write(&self.heartbeat_file, line).await?;
        Ok(())
    }

    async fn tick(&mut self, ctx: &WorkerContext) -> HookResult<Flow> {
        self.ticks += 1;
        debug!("Pulse {} of worker {}", self.ticks, ctx.worker());

        let done = self.max_ticks.is_some_and(|max| self.ticks >= max);
        Ok(Flow::from(!done))
    }

    async fn cleanup(&mut self, ctx: &WorkerContext) -> HookResult {
        info!(
            "Worker {} has ticked {} times in {}s",
            ctx.worker(),
            self.ticks,
            ctx.uptime().as_secs()
        );
        Ok(())
    }

    async fn after(&mut self, ctx: &WorkerContext) -> HookResult {
        info!("Worker {} finished after {} ticks", ctx.worker(), self.ticks);
        match tokio::fs::remove_file(&self.heartbeat_file).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}
