//! Structured logging setup.
//!
//! Mirrors the teacher's `init_logging`: an `EnvFilter` seeded from either
//! `--log-level` or `RUST_LOG`, writing to stderr. Unlike the teacher this
//! always emits one JSON object per line rather than human-formatted text,
//! since the control plane has no interactive foreground mode to keep
//! readable: every caller is either a script or a log aggregator.

use tracing_subscriber::EnvFilter;

use crate::cli::LogLevelArg;

/// Initializes the global `tracing` subscriber as line-delimited JSON.
///
/// `cli_level` takes priority over `RUST_LOG`, which takes priority over
/// the `info` default. Safe to call more than once; later calls are no-ops
/// (mirrors the teacher's `try_init` discipline so tests that call this
/// repeatedly never panic).
pub fn init(cli_level: Option<LogLevelArg>) {
    let filter = if let Some(level) = cli_level {
        EnvFilter::new(level.as_str())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let _ = tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_ansi(false)
        .try_init();
}
