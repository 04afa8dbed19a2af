//! Shared logging bootstrap for Sheetflow binaries.
//!
//! RECORD and STATE messages own stdout, so log output goes to a daily file
//! under `$SHEETFLOW_HOME/logs` and to stderr, never to stdout.

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "sheetflow=info";

/// Logging configuration shared by Sheetflow binaries.
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    pub verbose: bool,
}

/// Keeps the background file writer alive. Dropping it flushes pending lines.
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

/// Initialize tracing with a daily file writer and stderr output.
///
/// When the log directory cannot be created the file layer is skipped and
/// only stderr logging is installed.
pub fn init_logging(config: LogConfig<'_>) -> Result<LogGuard> {
    let file_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let console_filter = console_filter(config.verbose);

    let mut guard = None;
    let file_layer = match ensure_logs_dir() {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir, log_file_name(config.app_name));
            let (writer, worker) = tracing_appender::non_blocking(appender);
            guard = Some(worker);
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_filter(file_filter),
            )
        }
        Err(err) => {
            eprintln!("Warning: file logging disabled: {err:#}");
            None
        }
    };

    tracing_subscriber::registry()
        .with(file_layer)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(LogGuard { _file: guard })
}

fn console_filter(verbose: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new("sheetflow=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sheetflow=warn"))
    }
}

/// Get the Sheetflow home directory: ~/.sheetflow
pub fn sheetflow_home() -> PathBuf {
    if let Ok(override_path) = std::env::var("SHEETFLOW_HOME") {
        return PathBuf::from(override_path);
    }
    dirs::home_dir()
        .map(|home| home.join(".sheetflow"))
        .unwrap_or_else(|| PathBuf::from(".sheetflow"))
}

/// Get the logs directory: ~/.sheetflow/logs
pub fn logs_dir() -> PathBuf {
    sheetflow_home().join("logs")
}

/// Ensure the logs directory exists.
pub fn ensure_logs_dir() -> Result<PathBuf> {
    let logs = logs_dir();
    fs::create_dir_all(&logs)
        .with_context(|| format!("Failed to create logs directory: {}", logs.display()))?;
    Ok(logs)
}

/// `<app>.log`, with path separators and spaces replaced.
fn log_file_name(app_name: &str) -> String {
    let base: String = app_name
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' { ch } else { '_' })
        .collect();
    format!("{}.log", base)
}
