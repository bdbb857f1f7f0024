//! Structured logging setup with console and file output.
//!
//! - Daily rotating log files under `<data_dir>/logs`
//! - Build-type conditional log levels
//! - Console-only fallback when file logging fails
//! - Environment variable override via `PGPANEL_LOG` or `RUST_LOG`
//!
//! Passwords never reach a log line: request and intent types redact them in
//! their `Debug` output, and services log names and ids only.

use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

/// Environment variable checked before `RUST_LOG`.
pub const LOG_ENV: &str = "PGPANEL_LOG";

/// Logging configuration.
pub struct LogConfig {
    /// Directory for log files
    pub log_dir: PathBuf,
    /// Whether running in a PTY (affects output formatting)
    pub is_pty: bool,
    /// Optional custom log filter
    pub log_filter: Option<String>,
}

impl LogConfig {
    /// Log into `<data_dir>/logs`.
    pub fn new(data_dir: &Path) -> Self {
        Self {
            log_dir: data_dir.join("logs"),
            is_pty: atty::is(atty::Stream::Stdout),
            log_filter: None,
        }
    }

    /// Set custom log filter.
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = Some(filter.into());
        self
    }
}

/// Guard that must be held for the lifetime of the process.
///
/// Dropping this guard flushes pending log entries.
pub struct LoggingGuard {
    _worker_guard: Option<WorkerGuard>,
}

/// Initialize logging. Falls back to console-only output if the log file
/// cannot be opened.
pub fn init_logging(config: LogConfig) -> LoggingGuard {
    if config.is_pty {
        return init_stdout_logging(config.log_filter.as_deref());
    }

    match init_file_logging(&config) {
        Ok(guard) => LoggingGuard { _worker_guard: Some(guard) },
        Err(e) => {
            eprintln!("Warning: Failed to initialize file logging: {e}. Using console only.");
            init_stdout_logging(config.log_filter.as_deref())
        }
    }
}

fn init_stdout_logging(filter: Option<&str>) -> LoggingGuard {
    tracing_subscriber::fmt()
        .with_env_filter(build_env_filter(filter))
        .with_ansi(true)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    LoggingGuard { _worker_guard: None }
}

fn init_file_logging(config: &LogConfig) -> Result<WorkerGuard, Box<dyn std::error::Error>> {
    std::fs::create_dir_all(&config.log_dir)?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("pgpanel")
        .filename_suffix("log")
        .build(&config.log_dir)?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // Warnings also go to stderr so unattended runs surface them
    let stderr = std::io::stderr.with_max_level(tracing::Level::WARN);

    tracing_subscriber::fmt()
        .with_writer(non_blocking.and(stderr))
        .with_env_filter(build_env_filter(config.log_filter.as_deref()))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .init();

    Ok(guard)
}

/// Priority: custom filter > `PGPANEL_LOG` > `RUST_LOG` > default.
fn build_env_filter(custom_filter: Option<&str>) -> EnvFilter {
    if let Some(filter) = custom_filter {
        return EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new(default_log_filter()));
    }

    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_env("RUST_LOG"))
        .unwrap_or_else(|_| EnvFilter::new(default_log_filter()))
}

/// Get the default log filter based on build type.
pub fn default_log_filter() -> &'static str {
    #[cfg(debug_assertions)]
    {
        "debug,pgpanel_core=trace,tokio_postgres=info,deadpool=info,rusqlite=info"
    }
    #[cfg(not(debug_assertions))]
    {
        "info,pgpanel_core=info,tokio_postgres=warn,deadpool=warn"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_dir_under_data_dir() {
        let config = LogConfig::new(Path::new("/srv/pgpanel")).with_filter("warn");
        assert_eq!(config.log_dir, PathBuf::from("/srv/pgpanel/logs"));
        assert_eq!(config.log_filter.as_deref(), Some("warn"));
    }

    #[test]
    fn test_default_filter_parses() {
        assert!(EnvFilter::try_new(default_log_filter()).is_ok());
    }
}
