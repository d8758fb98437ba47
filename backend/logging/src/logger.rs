//! Structured Logger
//!
//! Wraps `tracing` with a filtered console layer (plain or JSON) and an
//! optional rolling NDJSON file.

use std::path::Path;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const LOG_FILE_PREFIX: &str = "nodebridge.log";

/// Keeps the file writer flushing; drop it only at process exit.
#[must_use = "dropping the guard stops file logging"]
pub struct LoggerGuard {
    _file: Option<WorkerGuard>,
}

/// Initialize the global logger.
///
/// `RUST_LOG` wins over `level` when set. With `log_dir`, records are also
/// written as NDJSON to `<log_dir>/nodebridge.log.YYYY-MM-DD`.
pub fn init_logger(level: &str, log_dir: Option<&Path>, json: bool) -> anyhow::Result<LoggerGuard> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("invalid log level '{level}'"))?;

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create log directory {}", dir.display()))?;
            let appender = RollingFileAppender::new(Rotation::DAILY, dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().json().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let json_console = json.then(|| fmt::layer().json().with_writer(std::io::stderr));
    let plain_console = (!json).then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_ansi(true)
    });

    // A second init (e.g. in tests) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(json_console)
        .with(plain_console)
        .with(file_layer)
        .try_init();

    Ok(LoggerGuard { _file: guard })
}
