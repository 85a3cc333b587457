//! Errors raised by `DuplexStream` implementations and the `MessageSocket`
//! layer built on top of them.

use thiserror::Error;

/// Result alias for the socket layer.
pub type SocketResult<T> = Result<T, SocketError>;

/// Errors from the framed, ack'd socket layer (spec section 7).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SocketError {
    /// A send or ping did not receive its acknowledgement within the
    /// configured timeout.
    #[error("timed out waiting for acknowledgement")]
    Timeout,
    /// The socket is not open; raised for sends attempted after close and
    /// for in-flight sends when the socket closes underneath them.
    #[error("socket is not connected")]
    NotConnected,
    /// `connect()` did not observe the peer's `OPEN` frame in time.
    #[error("timed out waiting for peer OPEN")]
    ConnectTimeout,
    /// The underlying `DuplexStream` reported a transport-level failure.
    #[error("transport error: {0}")]
    Transport(String),
    /// A received frame did not decode as valid UTF-8 JSON.
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}
