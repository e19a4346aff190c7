//! Logging setup
//!
//! Console output always; a daily-rotated JSON file in `log_dir` when file
//! logging is enabled. `RUST_LOG` takes precedence over the configured level.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::LoggingConfig;

const LOG_FILE_NAME: &str = "stackpress.log";

/// Directory to write log files to, if file logging is on
pub fn file_log_dir(config: &LoggingConfig) -> Option<&Path> {
    config
        .file_logging_enabled
        .then_some(config.log_dir.as_path())
}

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber
///
/// The returned guard flushes the file writer on drop; hold it for the
/// lifetime of the process.
pub fn init(config: &LoggingConfig) -> Result<Option<WorkerGuard>, TryInitError> {
    let console = if config.json_format {
        fmt::layer()
            .json()
            .with_target(true)
            .with_writer(std::io::stdout)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_level(true)
            .with_ansi(true)
            .with_writer(std::io::stdout)
            .boxed()
    };

    let (file_layer, guard) = match file_log_dir(config) {
        Some(dir) => {
            let (writer, guard) = non_blocking(rolling::daily(dir, LOG_FILE_NAME));
            let layer = fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file_layer)
        .with(env_filter(&config.level))
        .try_init()?;

    tracing::info!(
        level = %config.level,
        file_logging = config.file_logging_enabled,
        "Logging initialized"
    );

    Ok(guard)
}
