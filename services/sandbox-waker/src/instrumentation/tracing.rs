use std::panic;
use tracing::error;
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_error::ErrorLayer;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*, registry::Registry};

const LOG_DIR_ENV: &str = "ONBOARDING_LOG_DIR";
const DEFAULT_LOG_DIR: &str = "/home/ubuntu/.local/state/onboardhq";
const LOG_FILE: &str = "onboarding_emails.log";

/// Install the process-wide subscriber: the shared log file plus stdout.
///
/// Both trigger binaries append to the same `onboarding_emails.log`, so the
/// file sink uses a never-rolling appender. The returned guard owns the
/// background writer thread; `main` holds it so buffered lines are flushed
/// when the process exits.
pub fn init_tracing() -> WorkerGuard {
    let log_dir = std::env::var(LOG_DIR_ENV).unwrap_or_else(|_| DEFAULT_LOG_DIR.to_string());
    let file_appender = rolling::never(log_dir, LOG_FILE);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer)
        .with_target(false)
        .with_timer(fmt::time::UtcTime::rfc_3339());

    let stdout_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(false)
        .with_timer(fmt::time::UtcTime::rfc_3339());

    let subscriber = Registry::default()
        .with(filter)
        .with(file_layer)
        .with(stdout_layer)
        .with(ErrorLayer::default());

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set global tracing subscriber");

    guard
}

/// Route panics through the subscriber so they land in the shared log file
/// instead of only on stderr.
pub fn init_panic_handler() {
    panic::set_hook(Box::new(|panic_info| {
        let msg = match panic_info.payload().downcast_ref::<&str>() {
            Some(s) => *s,
            None => "Unknown panic",
        };

        let location = panic_info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_else(|| "unknown location".to_string());

        error!(
            message = %msg,
            location = %location,
            "Process panicked"
        );
    }));
}
