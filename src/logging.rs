//! Tracing subscriber setup
//!
//! Level precedence: `RUST_LOG` > `--log-level` > config `log_level` > "error".
//! Console output goes to stderr so it never mixes with command output.

use crate::config::{is_valid_log_level, DEFAULT_LOG_LEVEL};
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Pick the effective level from the flag and the persisted setting
pub fn effective_level<'a>(cli_level: Option<&'a str>, config_level: &'a str) -> &'a str {
    cli_level
        .filter(|level| is_valid_log_level(level))
        .or_else(|| Some(config_level).filter(|level| is_valid_log_level(level)))
        .unwrap_or(DEFAULT_LOG_LEVEL)
}

fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

fn open_log_file(path: &Path) -> std::io::Result<File> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Install the global subscriber. Safe to call once; later calls are ignored.
pub fn init(level: &str, log_file: Option<&Path>) {
    let file = log_file.and_then(|path| match open_log_file(path) {
        Ok(file) => Some(file),
        Err(err) => {
            eprintln!(
                "  Warning: Couldn't open log file {} ({}). Logging to console only.",
                path.display(),
                err
            );
            None
        }
    });

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .with_timer(tracing_subscriber::fmt::time::uptime());

    let file_layer = file.map(|file| {
        tracing_subscriber::fmt::layer()
            .with_writer(Mutex::new(file))
            .with_ansi(false)
    });

    let _ = tracing_subscriber::registry()
        .with(build_filter(level))
        .with(console_layer)
        .with(file_layer)
        .try_init();
}
