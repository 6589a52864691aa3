// src/logging.rs

//! Logging setup using `tracing` + `tracing-subscriber`.
//!
//! The log level is taken from the `TASK_REACTOR_LOG` environment variable
//! (e.g. "info", "debug"), defaulting to `info`. Logs go to STDERR so that
//! embedding programs keep stdout to themselves.

use tracing_subscriber::fmt;

/// Initialise the global logging subscriber.
///
/// Intended for binaries and examples embedding the reactor; libraries and
/// tests should install their own subscriber. Safe to call once at startup.
pub fn init_logging() {
    let level = std::env::var("TASK_REACTOR_LOG")
        .ok()
        .and_then(|s| parse_level_str(&s))
        .unwrap_or(tracing::Level::INFO);

    fmt()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();
}

fn parse_level_str(s: &str) -> Option<tracing::Level> {
    match s.trim().to_lowercase().as_str() {
        "error" => Some(tracing::Level::ERROR),
        "warn" | "warning" => Some(tracing::Level::WARN),
        "info" => Some(tracing::Level::INFO),
        "debug" => Some(tracing::Level::DEBUG),
        "trace" => Some(tracing::Level::TRACE),
        _ => None,
    }
}
