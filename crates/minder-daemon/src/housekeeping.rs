//! Periodic housekeeping run every `cleanup_every` iterations.
//!
//! This pass always runs before the worker's own `cleanup` hook.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::sink::LogSink;

/// What a housekeeping pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HousekeepingReport {
    /// Resident memory after the pass, when the platform reports it.
    pub memory_bytes: Option<u64>,
    /// Whether the allocator was asked to return free memory.
    pub trimmed: bool,
    /// Whether the log sink flushed without error.
    pub sink_flushed: bool,
}

/// Default cleanup behaviour of every daemon.
#[derive(Clone)]
pub struct Housekeeper {
    sink: Arc<dyn LogSink>,
}

impl Housekeeper {
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self { sink }
    }

    /// Flush the log sink, trim the allocator and record memory usage.
    pub fn run(&self) -> HousekeepingReport {
        let sink_flushed = self.flush_sink();
        let trimmed = trim_allocator();
        let memory_bytes = memory_usage();

        match memory_bytes {
            Some(bytes) => info!("Running cleanup. Current memory usage: {} bytes", bytes),
            None => info!("Running cleanup. Current memory usage: unknown"),
        }

        HousekeepingReport {
            memory_bytes,
            trimmed,
            sink_flushed,
        }
    }

    /// Flush the log sink. Failures are logged.
    pub fn flush_sink(&self) -> bool {
        match self.sink.flush() {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to flush log sink: {}", e);
                false
            }
        }
    }
}

#[cfg(all(target_os = "linux", target_env = "gnu"))]
fn trim_allocator() -> bool {
    // SAFETY: malloc_trim has no preconditions.
    let released = unsafe { libc::malloc_trim(0) };
    debug!("malloc_trim released memory: {}", released != 0);
    true
}

#[cfg(not(all(target_os = "linux", target_env = "gnu")))]
fn trim_allocator() -> bool {
    debug!("Allocator trim not supported on this platform");
    false
}

/// Resident set size of the current process, in bytes.
#[cfg(target_os = "linux")]
pub fn memory_usage() -> Option<u64> {
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    let pages = statm.split_whitespace().nth(1)?.parse::<u64>().ok()?;

    // SAFETY: sysconf only reads a system constant.
    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    let page_size = if page_size > 0 { page_size as u64 } else { 4096 };

    Some(pages * page_size)
}

#[cfg(not(target_os = "linux"))]
pub fn memory_usage() -> Option<u64> {
    None
}
