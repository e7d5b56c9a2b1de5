//! Usage: Process-wide tracing setup (stdout + optional daily-rolling file, log bridge, panic hook).

use crate::infra::config::LogConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Keeps the non-blocking file writer alive; drop it only at process exit.
#[must_use]
pub struct LoggingGuard {
    _file: Option<WorkerGuard>,
}

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level.trim()))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

pub fn init(config: &LogConfig) -> LoggingGuard {
    if let Err(err) = tracing_log::LogTracer::init() {
        eprintln!("log bridge already installed: {err}");
    }

    let stdout_layer = fmt::layer().with_target(false).with_thread_ids(false);

    let (file_layer, file_guard) = match config.dir.as_ref() {
        Some(dir) => match std::fs::create_dir_all(dir) {
            Ok(()) => {
                let appender = tracing_appender::rolling::daily(dir, &config.file_prefix);
                let (writer, guard) = tracing_appender::non_blocking(appender);
                let layer = fmt::layer()
                    .with_ansi(false)
                    .with_target(true)
                    .with_writer(writer);
                (Some(layer), Some(guard))
            }
            Err(err) => {
                eprintln!("log dir {} unavailable, file logging disabled: {err}", dir.display());
                (None, None)
            }
        },
        None => (None, None),
    };

    let init_result = tracing_subscriber::registry()
        .with(env_filter(&config.level))
        .with(stdout_layer)
        .with(file_layer)
        .try_init();
    if let Err(err) = init_result {
        eprintln!("tracing subscriber already installed: {err}");
    }

    install_panic_hook();

    LoggingGuard { _file: file_guard }
}

fn install_panic_hook() {
    // Payload is not logged; it may carry request data.
    std::panic::set_hook(Box::new(|panic_info| {
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());
        tracing::error!(location = %location, "PANIC: application panicked at {location}");
    }));
}
