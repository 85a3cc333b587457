//! Environment-driven configuration loading (spec section 6), layered under
//! explicit builder overrides: call [`host_config_from_env`] first, then
//! apply any `HostConfig` field overrides the caller wants to force.

use config::{Config, ConfigError, Environment};
use hostbridge_runtime::{HostConfig, LogLevel};
use serde::Deserialize;

#[derive(Deserialize, Default)]
struct RawEnv {
    endpoint: Option<String>,
    api_key: Option<String>,
    log_level: Option<String>,
}

/// Load `HOSTBRIDGE_ENDPOINT` / `HOSTBRIDGE_API_KEY` / `HOSTBRIDGE_LOG_LEVEL`
/// into a [`HostConfig`], starting from [`HostConfig::default`] for every
/// other key.
pub fn host_config_from_env() -> Result<HostConfig, ConfigError> {
    let raw: RawEnv = Config::builder()
        .add_source(Environment::with_prefix("HOSTBRIDGE"))
        .build()?
        .try_deserialize()?;

    let mut config = HostConfig::default();
    if let Some(endpoint) = raw.endpoint {
        config.endpoint = endpoint;
    }
    if let Some(api_key) = raw.api_key {
        config.api_key = Some(api_key);
    }
    if let Some(level) = raw.log_level {
        config.log_level = parse_log_level(&level);
    }
    Ok(config)
}

fn parse_log_level(raw: &str) -> LogLevel {
    match raw.to_ascii_lowercase().as_str() {
        "quiet" => LogLevel::Quiet,
        "debug" => LogLevel::Debug,
        _ => LogLevel::Info,
    }
}
