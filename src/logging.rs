//! Logging initialisation.
//!
//! The long-running `start` subcommand logs twice: structured JSON into a
//! daily-rotated file for later inspection, and human-readable lines on
//! stderr for whoever launched the process. One-shot subcommands get the
//! stderr layer only. Verbosity comes from `RUST_LOG` in both modes,
//! falling back to `info`.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Log file prefix; the appender adds the `YYYY-MM-DD` suffix.
const LOG_FILE_PREFIX: &str = "straylight.log";

/// Keeps the background log writer alive.
///
/// File output is flushed when this is dropped, so the caller must hold
/// it until the process exits.
#[must_use = "dropping the guard stops file logging"]
pub struct LoggingGuard {
    _worker: WorkerGuard,
}

fn filter_from_env() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Set up file + stderr logging for the `start` subcommand.
///
/// Creates `logs_dir` if needed and writes JSON entries to
/// `straylight.log.YYYY-MM-DD` inside it, rotating daily, through a
/// non-blocking writer. Keep the returned [`LoggingGuard`] alive for the
/// lifetime of the process.
///
/// # Errors
///
/// Returns an error when the logs directory cannot be created.
pub fn init_production(logs_dir: &Path) -> anyhow::Result<LoggingGuard> {
    std::fs::create_dir_all(logs_dir).map_err(|e| {
        anyhow::anyhow!("failed to create logs directory {}: {e}", logs_dir.display())
    })?;

    let (writer, worker) = tracing_appender::non_blocking(tracing_appender::rolling::daily(
        logs_dir,
        LOG_FILE_PREFIX,
    ));

    tracing_subscriber::registry()
        .with(filter_from_env())
        .with(tracing_subscriber::fmt::layer().json().with_writer(writer))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    Ok(LoggingGuard { _worker: worker })
}

/// Set up stderr-only logging for one-shot subcommands.
pub fn init_cli() {
    tracing_subscriber::fmt()
        .with_env_filter(filter_from_env())
        .with_writer(std::io::stderr)
        .init();
}
