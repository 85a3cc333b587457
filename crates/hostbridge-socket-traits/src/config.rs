use std::time::Duration;

/// Tunables for the framed, ack'd socket layer (spec section 6
/// "Configuration options", socket-layer subset).
#[derive(Debug, Clone)]
pub struct SocketConfig {
    /// How long `connect()` waits for the peer's `OPEN` frame.
    pub connect_timeout: Duration,
    /// Base timeout for one `send()`; multiplied by a caller-supplied
    /// `timeout_factor` per call.
    pub send_timeout: Duration,
    /// Interval between `ping()` calls issued by the owning layer.
    pub ping_interval: Duration,
    /// How long `ping()` waits for a matching `PONG`.
    pub ping_timeout: Duration,
    /// Delay between retry attempts for a single timed-out chunk.
    pub retry_chunk_interval: Duration,
    /// How many times a single chunk is retried before the whole send
    /// fails. Spec fixes this at three; kept configurable for tests.
    pub max_chunk_retries: u32,
    /// Payloads at or under this size are sent unchunked; over it, split
    /// into ordered pieces. Spec section 8: the boundary is exclusive.
    pub chunk_threshold_bytes: usize,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            send_timeout: Duration::from_secs(5),
            ping_interval: Duration::from_secs(30),
            ping_timeout: Duration::from_secs(5),
            retry_chunk_interval: Duration::from_millis(500),
            max_chunk_retries: 3,
            chunk_threshold_bytes: 64 * 1024,
        }
    }
}
