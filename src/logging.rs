//! Logging setup for host processes
//!
//! Console output for interactive use, daily-rotated files for deployments.
//! The host calls this once at startup; embedding code that already owns a
//! subscriber can skip it entirely.

use std::path::Path;

use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{PlcPollError, Result};

/// Initialize the global subscriber.
///
/// `level` seeds the filter when `RUST_LOG` is not set. With `log_dir` set,
/// output goes to a daily-rotated `plcpoll.log` in that directory instead of
/// the console.
pub fn init_logging(level: &str, log_dir: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("plcpoll={level}")));

    match log_dir {
        None => fmt()
            .with_env_filter(filter)
            .try_init()
            .map_err(|e| PlcPollError::internal(format!("logger init failed: {e}"))),
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = RollingFileAppender::new(Rotation::DAILY, dir, "plcpoll.log");
            fmt()
                .with_env_filter(filter)
                .with_writer(appender)
                .with_ansi(false)
                .try_init()
                .map_err(|e| PlcPollError::internal(format!("logger init failed: {e}")))
        },
    }
}
