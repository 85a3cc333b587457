//! `HostConfig`: every configuration key named in spec section 6.

use std::time::Duration;

/// Logging verbosity (spec section 6: `logLevel ∈ {quiet, info, debug}`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Quiet,
    Info,
    Debug,
}

impl Default for LogLevel {
    fn default() -> Self {
        Self::Info
    }
}

/// Connection, retry, and diagnostic configuration for a `HostController`.
#[derive(Clone)]
pub struct HostConfig {
    /// Required: the service endpoint (`wss://...`).
    pub endpoint: String,
    /// Optional bearer credential sent as `x-api-key`.
    pub api_key: Option<String>,

    pub retry_interval: Duration,
    pub ping_interval: Duration,
    pub ping_timeout: Duration,
    pub connect_timeout: Duration,
    pub send_timeout: Duration,
    pub close_unresponsive_connection_timeout: Duration,
    pub reinitialize_batch_timeout: Duration,
    pub retry_chunk_interval: Duration,
    pub max_resend_attempts: u32,
    pub complete_http_request_delay: Duration,

    pub log_level: LogLevel,
    pub verbose_message_logs: bool,
}

impl HostConfig {
    /// Start from the documented defaults, then set the two required
    /// fields.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: None,
            retry_interval: Duration::from_secs(3),
            ping_interval: Duration::from_secs(30),
            ping_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(5),
            send_timeout: Duration::from_secs(5),
            close_unresponsive_connection_timeout: Duration::from_secs(180),
            reinitialize_batch_timeout: Duration::from_millis(200),
            retry_chunk_interval: Duration::from_millis(500),
            max_resend_attempts: 5,
            complete_http_request_delay: Duration::from_millis(500),
            log_level: LogLevel::default(),
            verbose_message_logs: false,
        }
    }
}
