use crate::error::SocketResult;
use async_trait::async_trait;

/// The raw, abstract duplex byte stream `MessageSocket` frames messages
/// over. The reference deployment implements this for a Tokio WebSocket;
/// tests implement it for an in-memory paired channel.
///
/// Implementations are single-writer per direction (spec section 4.1): one
/// logical producer calls `send_text`, and `recv_text` is polled by a
/// single reader loop owned by `MessageSocket`.
#[async_trait]
pub trait DuplexStream: Send + Sync {
    /// Send one complete text frame.
    async fn send_text(&self, text: String) -> SocketResult<()>;

    /// Receive the next text frame, or `Ok(None)` if the peer closed the
    /// stream cleanly.
    async fn recv_text(&self) -> SocketResult<Option<String>>;

    /// Close the stream. Idempotent.
    async fn close(&self) -> SocketResult<()>;
}
