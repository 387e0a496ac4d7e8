//! Tracing subscriber setup.
//!
//! Console output always goes to stderr, filtered by `RUST_LOG` (default
//! `warn`, so command output on stdout stays clean). With a log directory,
//! a second layer appends JSON records to `toolgate.log.YYYY-MM-DD`,
//! filtered independently by `TOOLGATE_LOG` (default `info`) so policy
//! decisions and confirmation outcomes are kept even when the console is
//! quiet.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Base name of the rotated log files.
pub const LOG_FILE_NAME: &str = "toolgate.log";

/// Env var controlling the file layer's filter.
pub const FILE_FILTER_ENV: &str = "TOOLGATE_LOG";

/// Keeps the non-blocking file writer alive.
///
/// Dropping it flushes pending records, so hold it until the process exits.
pub struct LoggingGuard {
    _guard: WorkerGuard,
}

impl std::fmt::Debug for LoggingGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoggingGuard").finish_non_exhaustive()
    }
}

fn filter_from(var: &str, default: &str) -> EnvFilter {
    EnvFilter::try_from_env(var).unwrap_or_else(|_| EnvFilter::new(default))
}

/// Install the global subscriber.
///
/// Returns a guard only when `log_dir` is set.
///
/// # Errors
///
/// Returns an error if `log_dir` cannot be created or a global subscriber is
/// already installed.
pub fn init(log_dir: Option<&Path>) -> anyhow::Result<Option<LoggingGuard>> {
    let console = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(filter_from(EnvFilter::DEFAULT_ENV, "warn"));

    let (file, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(|e| {
                anyhow::anyhow!("failed to create logs directory {}: {e}", dir.display())
            })?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_NAME);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer)
                .with_filter(filter_from(FILE_FILTER_ENV, "info"));
            (Some(layer), Some(LoggingGuard { _guard: guard }))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))?;

    Ok(guard)
}
