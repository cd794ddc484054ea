//! Tracing setup for the minder binary.
//!
//! Log lines are written synchronously: the process may fork after logging is
//! initialized, and a background writer thread would not survive into the child.

use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use tracing_appender::rolling::{RollingFileAppender, RollingWriter, Rotation};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use minder_config::LogSection;
use minder_daemon::LogSink;

/// Daily-rotated log files.
#[derive(Clone)]
pub(crate) struct LogFiles {
    appender: Arc<RollingFileAppender>,
}

impl LogFiles {
    pub fn open(dir: &Path, max_files: usize) -> Result<Self, Box<dyn std::error::Error>> {
        std::fs::create_dir_all(dir)?;

        let appender = RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix("minder")
            .filename_suffix("log")
            .max_log_files(max_files)
            .build(dir)?;

        Ok(Self {
            appender: Arc::new(appender),
        })
    }
}

impl<'a> MakeWriter<'a> for LogFiles {
    type Writer = RollingWriter<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        self.appender.make_writer()
    }
}

/// Log sink handed to the daemon: flushes the log file and the console.
pub(crate) struct AppSink {
    files: LogFiles,
    console: bool,
}

impl LogSink for AppSink {
    fn flush(&self) -> io::Result<()> {
        self.files.make_writer().flush()?;
        if self.console {
            io::stdout().flush()?;
        }
        Ok(())
    }
}

/// Install the global subscriber. `RUST_LOG` takes precedence over `log.level`.
pub(crate) fn init_tracing(config: &LogSection) -> Result<Arc<AppSink>, Box<dyn std::error::Error>> {
    let files = LogFiles::open(&config.dir, config.max_files)?;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let console_layer = config
        .console
        .then(|| fmt::layer().with_target(true).with_ansi(true));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(fmt::layer().with_writer(files.clone()).with_ansi(false))
        .try_init()?;

    Ok(Arc::new(AppSink {
        files,
        console: config.console,
    }))
}
