//! [`DuplexStream`] implementation over a Tokio WebSocket connection — the
//! reference deployment transport named in spec section 6.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt, stream::SplitSink, stream::SplitStream};
use hostbridge_socket_traits::{DuplexStream, SocketError, SocketResult};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, tungstenite::Message};

type WsWriter = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsReader = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Wraps a connected `tokio-tungstenite` WebSocket as a [`DuplexStream`].
///
/// Headers (`x-instance-id`, optional `x-api-key`) are set by the caller
/// when establishing the underlying connection; this type only frames text
/// messages once the handshake has already completed.
pub struct WebSocketDuplexStream {
    writer: Mutex<WsWriter>,
    reader: Mutex<WsReader>,
}

impl WebSocketDuplexStream {
    /// Wrap an already-connected WebSocket stream.
    #[must_use]
    pub fn new(ws: WebSocketStream<MaybeTlsStream<TcpStream>>) -> Self {
        let (writer, reader) = ws.split();
        Self {
            writer: Mutex::new(writer),
            reader: Mutex::new(reader),
        }
    }
}

#[async_trait]
impl DuplexStream for WebSocketDuplexStream {
    async fn send_text(&self, text: String) -> SocketResult<()> {
        self.writer
            .lock()
            .await
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| SocketError::Transport(e.to_string()))
    }

    async fn recv_text(&self) -> SocketResult<Option<String>> {
        let mut reader = self.reader.lock().await;
        loop {
            match reader.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Some(text.to_string())),
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue, // binary/ping/pong frames: not part of this protocol
                Some(Err(e)) => return Err(SocketError::Transport(e.to_string())),
            }
        }
    }

    async fn close(&self) -> SocketResult<()> {
        self.writer
            .lock()
            .await
            .close()
            .await
            .map_err(|e| SocketError::Transport(e.to_string()))
    }
}
