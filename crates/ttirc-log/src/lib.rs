// ABOUTME: Shared logging setup for the ttirc master binaries
// ABOUTME: Two functions: init() for stderr, init_file() for detached daemons

use std::fs::File;
use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Standard logging to stderr. Default: INFO level, RUST_LOG override.
pub fn init() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();
}

/// Append-only file logging for runs without a terminal. Default: INFO level,
/// RUST_LOG override. If the file cannot be opened, prints a warning and falls
/// back to stderr so the master never runs blind.
pub fn init_file(path: &Path) {
    match open_log_file(path) {
        Ok(file) => {
            tracing_subscriber::fmt()
                .with_writer(file)
                .with_env_filter(
                    EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
                )
                .with_ansi(false)
                .init();
        }
        Err(e) => {
            eprintln!(
                "Warning: failed to open log file {}: {e}; logging to stderr",
                path.display()
            );
            init();
        }
    }
}

fn open_log_file(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
}
