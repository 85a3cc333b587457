//! Tracing initialization keyed to `HostConfig::log_level` (spec section 6).

use hostbridge_runtime::LogLevel;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

/// Install a global `tracing_subscriber` fmt layer at the verbosity implied
/// by `level`, overridable via `RUST_LOG`. Call once, before connecting.
pub fn init_tracing(level: LogLevel) {
    let directive = match level {
        LogLevel::Quiet => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive)))
        .with(tracing_subscriber::fmt::layer())
        .init();
}
