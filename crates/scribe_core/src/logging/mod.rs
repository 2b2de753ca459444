//! Logging infrastructure for Scribe.
//!
//! This module provides:
//! - Global `tracing` subscriber setup (stderr, optional daily log file)
//! - Per-request loggers with a tool-output tail for error diagnosis
//!
//! # Example
//!
//! ```no_run
//! use scribe_core::logging::{init_tracing, LogConfig, LogLevel, RequestLogger};
//!
//! let _guard = init_tracing(LogLevel::Info, None);
//!
//! let logger = RequestLogger::new("req-42", ".logs", LogConfig::default()).unwrap();
//! logger.phase("Probing input");
//! logger.command("ffprobe -v error -show_entries format=duration ...");
//! logger.success("Transcript ready");
//! ```

mod request_logger;
mod types;

pub use request_logger::RequestLogger;
pub use types::{LogConfig, LogLevel, MessagePrefix};

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the global tracing subscriber.
///
/// - Respects RUST_LOG, falling back to `default_level`
/// - Writes to stderr
/// - When `log_dir` is given, also writes a daily-rotated `scribe.log`
///
/// Keep the returned guard alive for the lifetime of the program so the
/// file writer flushes. Should be called once at startup.
pub fn init_tracing(default_level: LogLevel, log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.as_filter_str()));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false);

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "scribe.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .init();
            None
        }
    }
}

/// Initialize tracing for tests (only logs warnings and above).
#[cfg(test)]
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("warn")
        .with_test_writer()
        .try_init();
}
