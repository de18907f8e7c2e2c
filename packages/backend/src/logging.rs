use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;

const LOG_FILE_PREFIX: &str = "tutorly.log";

/// Keeps the non-blocking file writer flushing until dropped.
pub struct FileLogGuard {
    _guard: WorkerGuard,
}

/// An unparsable `RUST_LOG` falls back to `info` instead of silencing output.
fn env_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"))
}

fn file_appender(dir: &Path) -> std::io::Result<RollingFileAppender> {
    std::fs::create_dir_all(dir)?;
    Ok(RollingFileAppender::new(Rotation::DAILY, dir, LOG_FILE_PREFIX))
}

/// Installs the global subscriber: stdout always, plus a daily rolling file
/// when `config.file_log_dir` is set.
pub fn init_tracing(config: &Config) -> Option<FileLogGuard> {
    let stdout_layer = fmt::layer().with_target(true);

    let appender = config.file_log_dir.as_deref().and_then(|dir| {
        file_appender(dir)
            .map_err(|err| eprintln!("failed to create log directory {}: {err}", dir.display()))
            .ok()
    });

    let Some(appender) = appender else {
        tracing_subscriber::registry()
            .with(env_filter(&config.log_level))
            .with(stdout_layer)
            .init();
        return None;
    };

    let (file_writer, guard) = tracing_appender::non_blocking(appender);
    let file_layer = fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_target(true);

    tracing_subscriber::registry()
        .with(env_filter(&config.log_level))
        .with(stdout_layer)
        .with(file_layer)
        .init();

    Some(FileLogGuard { _guard: guard })
}
