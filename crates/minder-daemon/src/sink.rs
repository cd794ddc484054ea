//! Logging collaborator.
//!
//! Events themselves go through `tracing`; the daemon only needs a way to push
//! buffered output to its destination during housekeeping and at shutdown.

use std::io::{self, Write};
use std::sync::Arc;

/// Flushable destination of the daemon's log output.
pub trait LogSink: Send + Sync {
    fn flush(&self) -> io::Result<()>;
}

/// Flushes stdout and stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdioSink;

impl LogSink for StdioSink {
    fn flush(&self) -> io::Result<()> {
        io::stdout().flush()?;
        io::stderr().flush()
    }
}

impl<T: LogSink + ?Sized> LogSink for Arc<T> {
    fn flush(&self) -> io::Result<()> {
        (**self).flush()
    }
}
