//! Tracing setup for training runs.
//!
//! Each run logs to stdout and to `cvd-forest_<timestamp>.log` in the logs
//! directory. Older run logs beyond [`MAX_RUN_LOGS`] are deleted.

use std::{
    fs::{self, OpenOptions},
    path::{Path, PathBuf},
    sync::OnceLock,
};

use time::{OffsetDateTime, UtcOffset, format_description::FormatItem, macros::format_description};
use tracing_appender::{
    non_blocking::{NonBlocking, WorkerGuard},
    rolling,
};
use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*};

/// Run logs kept after pruning, the current run included.
pub const MAX_RUN_LOGS: usize = 10;
const RUN_LOG_PREFIX: &str = "cvd-forest_";
const RUN_LOG_EXTENSION: &str = ".log";
const DEFAULT_FILTER: &str = "info";

static FILE_WRITER_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Cannot list run logs in {path}: {source}")]
    ListLogs {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Cannot delete stale run log {path}: {source}")]
    DeleteLog {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Cannot format run log timestamp: {0}")]
    Timestamp(time::error::Format),
    #[error("Cannot open run log {path}: {source}")]
    OpenLog {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("A global tracing subscriber is already installed: {0}")]
    AlreadyInstalled(tracing::subscriber::SetGlobalDefaultError),
}

/// Install the global subscriber, logging to stdout and a run log in `log_dir`.
///
/// Only the first successful call has an effect. On error the caller may
/// carry on without logging.
pub fn init(log_dir: &Path) -> Result<(), LoggingError> {
    if FILE_WRITER_GUARD.get().is_some() {
        return Ok(());
    }

    let log_path = log_dir.join(run_log_name(local_now())?);
    let (file_writer, guard) = open_run_log(&log_path)?;
    prune_run_logs(log_dir, MAX_RUN_LOGS)?;

    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    let timer = fmt::time::OffsetTime::new(offset, DISPLAY_TIME);
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let subscriber = Registry::default()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_timer(timer.clone())
                .with_writer(std::io::stdout),
        )
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_timer(timer)
                .with_writer(file_writer),
        );
    tracing::subscriber::set_global_default(subscriber).map_err(LoggingError::AlreadyInstalled)?;
    let _ = FILE_WRITER_GUARD.set(guard);

    tracing::debug!("Run log at {}", log_path.display());
    Ok(())
}

const DISPLAY_TIME: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

fn local_now() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

/// `cvd-forest_YYYY-MM-DD_HH-MM-SS.log`; names sort in run order.
fn run_log_name(at: OffsetDateTime) -> Result<String, LoggingError> {
    const STAMP: &[FormatItem<'_>] =
        format_description!("[year]-[month]-[day]_[hour]-[minute]-[second]");
    let stamp = at.format(STAMP).map_err(LoggingError::Timestamp)?;
    Ok(format!("{RUN_LOG_PREFIX}{stamp}{RUN_LOG_EXTENSION}"))
}

fn open_run_log(path: &Path) -> Result<(NonBlocking, WorkerGuard), LoggingError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| LoggingError::OpenLog {
            path: path.to_path_buf(),
            source,
        })?;
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let file_name = path.file_name().unwrap_or_default();
    Ok(tracing_appender::non_blocking(rolling::never(dir, file_name)))
}

fn is_run_log(name: &str) -> bool {
    name.starts_with(RUN_LOG_PREFIX) && name.ends_with(RUN_LOG_EXTENSION)
}

/// Delete the oldest run logs so at most `keep` remain. Other files are left alone.
fn prune_run_logs(dir: &Path, keep: usize) -> Result<(), LoggingError> {
    let listing = fs::read_dir(dir).map_err(|source| LoggingError::ListLogs {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut run_logs: Vec<PathBuf> = listing
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_ok_and(|kind| kind.is_file()))
        .filter(|entry| entry.file_name().to_str().is_some_and(is_run_log))
        .map(|entry| entry.path())
        .collect();
    run_logs.sort();

    let stale = run_logs.len().saturating_sub(keep);
    for path in run_logs.into_iter().take(stale) {
        fs::remove_file(&path).map_err(|source| LoggingError::DeleteLog { path, source })?;
    }
    Ok(())
}
