//! Logging Setup
//!
//! Tracing initialization: stderr output at warn level by default, daily
//! rolling file logs under the data directory when --debug is set.

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const LOG_FILE_PREFIX: &str = "voicetide.log";

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    debug: bool,
    log_dir: PathBuf,
}

impl LogConfig {
    pub fn new() -> Self {
        Self {
            debug: false,
            log_dir: default_log_dir(),
        }
    }

    /// Enable debug mode (file logging + debug-level filter)
    pub fn with_debug_mode(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Override the log directory
    pub fn with_log_dir(mut self, dir: PathBuf) -> Self {
        self.log_dir = dir;
        self
    }

    pub fn log_dir(&self) -> &PathBuf {
        &self.log_dir
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Default log directory: `<data_local_dir>/voicetide/logs`, falling back to
/// `.voicetide/logs` in the working directory.
pub fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("voicetide").join("logs"))
        .unwrap_or_else(|| PathBuf::from(".voicetide").join("logs"))
}

/// Initialize the global tracing subscriber.
///
/// In debug mode, logs go to a daily-rolling file (the TUI owns the terminal,
/// so stdout/stderr stay quiet). Otherwise a stderr layer is installed at
/// warn level unless `RUST_LOG` says otherwise. Returns a guard that must be
/// held for the lifetime of the process so buffered file logs flush on exit.
pub fn init_logging(config: LogConfig) -> Result<Option<WorkerGuard>> {
    let default_filter = if config.debug {
        "voicetide=debug,info"
    } else {
        "voicetide=warn,warn"
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    if config.debug {
        fs::create_dir_all(&config.log_dir).with_context(|| {
            format!("Failed to create log directory: {}", config.log_dir.display())
        })?;

        let appender = tracing_appender::rolling::daily(&config.log_dir, LOG_FILE_PREFIX);
        let (writer, guard) = tracing_appender::non_blocking(appender);

        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_target(true),
            )
            .try_init()
            .context("Failed to install tracing subscriber")?;

        tracing::info!("Debug logging enabled, writing to {}", config.log_dir.display());
        Ok(Some(guard))
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
            .context("Failed to install tracing subscriber")?;
        Ok(None)
    }
}

/// Remove log files older than `max_age_days` from the default log directory.
/// Returns the number of files removed.
pub fn cleanup_old_logs(max_age_days: u64) -> Result<usize> {
    cleanup_logs_in(&default_log_dir(), max_age_days)
}

/// Internal: cleanup with configurable directory (for testing).
fn cleanup_logs_in(dir: &PathBuf, max_age_days: u64) -> Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }

    let cutoff = SystemTime::now()
        .checked_sub(Duration::from_secs(max_age_days * 24 * 60 * 60))
        .unwrap_or(SystemTime::UNIX_EPOCH);

    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let is_log = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(LOG_FILE_PREFIX));
        if !is_log {
            continue;
        }
        let modified = entry.metadata().and_then(|m| m.modified());
        if let Ok(modified) = modified
            && modified < cutoff
            && fs::remove_file(&path).is_ok()
        {
            removed += 1;
        }
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_config_builder() {
        let config = LogConfig::new()
            .with_debug_mode(true)
            .with_log_dir(PathBuf::from("/tmp/test-logs"));
        assert!(config.debug);
        assert_eq!(config.log_dir(), &PathBuf::from("/tmp/test-logs"));
    }

    #[test]
    fn test_cleanup_skips_missing_directory() {
        // Default dir may not exist in CI; cleanup must not error.
        let result = cleanup_old_logs(7);
        assert!(result.is_ok());
    }

    #[test]
    fn test_cleanup_removes_only_old_log_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log = dir.path().join(format!("{}.2020-01-01", LOG_FILE_PREFIX));
        let other = dir.path().join("unrelated.txt");
        fs::write(&log, "old").expect("write");
        fs::write(&other, "keep").expect("write");

        // Backdate the log file far past any cutoff.
        let old = SystemTime::UNIX_EPOCH + Duration::from_secs(1);
        let file = fs::File::options()
            .write(true)
            .open(&log)
            .expect("open log");
        file.set_times(fs::FileTimes::new().set_modified(old))
            .expect("set mtime");
        drop(file);

        let removed = cleanup_logs_in(&dir.path().to_path_buf(), 7).expect("cleanup");
        assert_eq!(removed, 1);
        assert!(!log.exists());
        assert!(other.exists());
    }
}
