//! Tracing setup: stdout always, plus a daily-rolling file when `LOG_DIR` is set.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

const LOG_FILE_NAME: &str = "data-collector.log";

/// Keeps the file appender worker alive. Hold it for the life of the process.
pub struct LogGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Install the global subscriber. `RUST_LOG` overrides the default `info` filter.
pub fn init(log_dir: Option<&Path>) -> LogGuard {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let mut layers = Vec::with_capacity(2);
    layers.push(tracing_subscriber::fmt::layer().with_target(false).boxed());

    let mut file_guard = None;
    if let Some(dir) = log_dir {
        match std::fs::create_dir_all(dir) {
            Ok(()) => {
                let appender = RollingFileAppender::new(Rotation::DAILY, dir, LOG_FILE_NAME);
                let (writer, guard) = tracing_appender::non_blocking(appender);
                file_guard = Some(guard);
                layers.push(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(writer)
                        .boxed(),
                );
            }
            Err(e) => eprintln!("Failed to create log directory {}: {e}", dir.display()),
        }
    }

    // Ignore the error so tests and embedders can install their own subscriber first.
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(layers)
        .try_init();

    LogGuard {
        _file_guard: file_guard,
    }
}
