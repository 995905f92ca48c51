//! Tracing initialization shared by the CLI and embedding callers.

use std::sync::Mutex;

use crate::storage::path_utils;

/// Structured logs to stderr, filter from `RUST_LOG` (default `info`).
pub fn init_stderr_tracing() {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();
}

/// Append structured logs to `{data_dir}/analysis.log` for non-interactive
/// callers (bots, cron cleanup).
pub fn init_file_tracing() {
    use tracing_subscriber::EnvFilter;

    let data_dir = path_utils::data_dir();
    std::fs::create_dir_all(&data_dir).ok();
    let log_path = data_dir.join("analysis.log");

    // Append mode — multiple processes may write to the same file.
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .unwrap_or_else(|_| {
            let null = if cfg!(windows) { "NUL" } else { "/dev/null" };
            std::fs::File::create(null).expect("Cannot create log fallback")
        });

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(Mutex::new(log_file))
        .with_target(true)
        .with_ansi(false)
        .init();
}
