//! Tracing subscriber setup.
//!
//! Console output always, plus a daily-rolling file when a log directory is
//! configured. Timestamps are rendered in the schedule time zone so log
//! lines line up with the slots they talk about.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::Utc;
use chrono_tz::Tz;
use tracing::{debug, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::{self, format::Writer, time::FormatTime};
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{Error, Result};

/// Default log filter directive, overridden by `RUST_LOG`.
pub const DEFAULT_LOG_FILTER: &str = "outage_watch=debug,outage_sources=debug,sqlx=warn";

const LOG_FILE_PREFIX: &str = "outage-watch.log";

/// Log retention period in days.
const LOG_RETENTION_DAYS: u64 = 7;

#[derive(Debug, Clone, Copy)]
struct ZonedTimer(Tz);

impl FormatTime for ZonedTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = Utc::now().with_timezone(&self.0);
        write!(w, "{}", now.format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Installs the global subscriber.
///
/// Returns the file writer guard when file logging is on; keep it alive for
/// the lifetime of the process.
pub fn init_logging(log_dir: Option<&str>, timezone: Tz) -> Result<Option<WorkerGuard>> {
    let console = fmt::layer().with_ansi(true).with_timer(ZonedTimer(timezone));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let log_path = PathBuf::from(dir);
            std::fs::create_dir_all(&log_path)?;
            let appender = tracing_appender::rolling::daily(&log_path, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_timer(ZonedTimer(timezone))
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter())
        .with(console)
        .with(file_layer)
        .try_init()
        .map_err(|e| Error::Other(format!("Failed to set global default subscriber: {}", e)))?;

    if let Some(dir) = log_dir {
        let removed = cleanup_old_logs(Path::new(dir), LOG_RETENTION_DAYS);
        if removed > 0 {
            debug!("Removed {} expired log files", removed);
        }
    }

    Ok(guard)
}

/// Deletes rotated log files older than `retention_days`. Returns how many
/// were removed.
pub fn cleanup_old_logs(dir: &Path, retention_days: u64) -> usize {
    let Some(cutoff) =
        SystemTime::now().checked_sub(Duration::from_secs(retention_days * 24 * 60 * 60))
    else {
        return 0;
    };
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Cannot read log directory {}: {}", dir.display(), e);
            return 0;
        }
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        let is_log = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(LOG_FILE_PREFIX));
        if !is_log {
            continue;
        }
        let expired = entry
            .metadata()
            .and_then(|m| m.modified())
            .is_ok_and(|modified| modified < cutoff);
        if expired {
            match std::fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => warn!("Failed to remove log file {}: {}", path.display(), e),
            }
        }
    }
    removed
}
