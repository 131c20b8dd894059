//! File logging for the in-shell extension.
//!
//! A shell-loaded library must never write to stdout or stderr; the host
//! process owns those. Logs go to a daily-rotated file under `~/.emblem/logs`
//! through a non-blocking writer so a slow disk cannot stall a callback.

use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

const DEBUG_ENV: &str = "EMBLEM_DEBUG_LOG";
const LOG_FILE_PREFIX: &str = "emblem-shell.log";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Idempotent; the shell may attach the extension more than once.
pub fn init() {
    if LOG_GUARD.get().is_some() {
        return;
    }

    let Some(log_dir) = emblem_core::config::config_dir().map(|dir| dir.join("logs")) else {
        return;
    };

    let appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let debug_enabled = std::env::var(DEBUG_ENV)
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    let filter = if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    // try_init: the host process may already carry a subscriber.
    let result = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init();

    if result.is_ok() {
        let _ = LOG_GUARD.set(guard);
    }
}
