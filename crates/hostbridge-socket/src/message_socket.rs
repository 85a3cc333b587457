//! `MessageSocket`: framed, ack'd, timeout-bounded message exchange over a
//! `DuplexStream`, with ping/pong liveness and chunking of oversized
//! payloads (spec section 4.1).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use dashmap::DashMap;
use hostbridge_protocol::frame::{SocketFrame, SocketFrameKind};
use hostbridge_protocol::ids::MessageId;
use hostbridge_socket_traits::{DuplexStream, SocketConfig, SocketError, SocketResult};
use tokio::sync::{Mutex as AsyncMutex, mpsc, oneshot};
use tokio::time::timeout;

use crate::chunker::{ChunkAssembly, split_into_chunks};

type AckKey = (MessageId, u32);

/// A framed, ack'd, single-reader message channel over an abstract
/// [`DuplexStream`].
pub struct MessageSocket<S: DuplexStream + 'static> {
    stream: Arc<S>,
    config: SocketConfig,
    next_id: AtomicU64,
    pending_acks: DashMap<AckKey, oneshot::Sender<()>>,
    pending_chunks: DashMap<MessageId, ChunkAssembly>,
    pending_pong: AsyncMutex<Option<oneshot::Sender<()>>>,
    incoming_rx: AsyncMutex<mpsc::UnboundedReceiver<serde_json::Value>>,
    closed: AtomicBool,
}

impl<S: DuplexStream + 'static> MessageSocket<S> {
    /// Open the handshake: send our `OPEN` frame, spawn the single reader
    /// task, and wait for the peer's `OPEN` within `connect_timeout`.
    pub async fn connect(stream: S, config: SocketConfig, instance_id: String) -> SocketResult<Arc<Self>> {
        let (open_tx, open_rx) = oneshot::channel();
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
        let stream = Arc::new(stream);

        let socket = Arc::new(Self {
            stream: stream.clone(),
            config,
            next_id: AtomicU64::new(1),
            pending_acks: DashMap::new(),
            pending_chunks: DashMap::new(),
            pending_pong: AsyncMutex::new(None),
            incoming_rx: AsyncMutex::new(incoming_rx),
            closed: AtomicBool::new(false),
        });

        Self::spawn_reader(socket.clone(), incoming_tx, open_tx);

        let id = socket.fresh_id();
        let frame = SocketFrame::open(id, instance_id);
        socket
            .stream
            .send_text(serde_json::to_string(&frame)?)
            .await?;

        match timeout(socket.config.connect_timeout, open_rx).await {
            Ok(Ok(())) => Ok(socket),
            Ok(Err(_)) => Err(SocketError::NotConnected),
            Err(_) => Err(SocketError::ConnectTimeout),
        }
    }

    fn fresh_id(&self) -> MessageId {
        MessageId::from(format!("m{}", self.next_id.fetch_add(1, Ordering::Relaxed)))
    }

    /// Serialize `payload`, chunk it if needed, and wait for every chunk to
    /// be acknowledged. `timeout_factor` scales `config.send_timeout` for
    /// this call.
    pub async fn send(&self, payload: &serde_json::Value, timeout_factor: f64) -> SocketResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SocketError::NotConnected);
        }

        let data = serde_json::to_string(payload)?;
        let id = self.fresh_id();
        let pieces = split_into_chunks(&data, self.config.chunk_threshold_bytes);
        let total = pieces.len() as u32;

        for (offset, piece) in pieces.into_iter().enumerate() {
            let index = offset as u32 + 1;
            let chunk = if total > 1 { Some((index, total)) } else { None };
            self.send_piece_with_retry(id.clone(), chunk, piece, timeout_factor)
                .await?;
        }
        Ok(())
    }

    async fn send_piece_with_retry(
        &self,
        id: MessageId,
        chunk: Option<(u32, u32)>,
        data: String,
        timeout_factor: f64,
    ) -> SocketResult<()> {
        let ack_key: AckKey = (id.clone(), chunk.map_or(0, |(idx, _)| idx));
        let max_attempts = self.config.max_chunk_retries + 1;
        let attempt_timeout = self.config.send_timeout.mul_f64(timeout_factor.max(0.0001));

        for attempt in 1..=max_attempts {
            let (tx, rx) = oneshot::channel();
            self.pending_acks.insert(ack_key.clone(), tx);

            let frame = match chunk {
                Some((index, total)) => {
                    SocketFrame::message_chunk(id.clone(), data.clone(), index, total)
                }
                None => SocketFrame::message(id.clone(), data.clone()),
            };
            self.stream.send_text(serde_json::to_string(&frame)?).await?;

            match timeout(attempt_timeout, rx).await {
                Ok(Ok(())) => return Ok(()),
                _ => {
                    self.pending_acks.remove(&ack_key);
                    if attempt == max_attempts {
                        return Err(SocketError::Timeout);
                    }
                    tracing::warn!(
                        message_id = %id,
                        attempt,
                        "chunk send timed out, retrying"
                    );
                    tokio::time::sleep(self.config.retry_chunk_interval).await;
                }
            }
        }
        Err(SocketError::Timeout)
    }

    /// Send a `PING` and wait for a matching `PONG` within `ping_timeout`.
    pub async fn ping(&self) -> SocketResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SocketError::NotConnected);
        }
        let id = self.fresh_id();
        let (tx, rx) = oneshot::channel();
        *self.pending_pong.lock().await = Some(tx);

        self.stream
            .send_text(serde_json::to_string(&SocketFrame::ping(id))?)
            .await?;

        match timeout(self.config.ping_timeout, rx).await {
            Ok(Ok(())) => Ok(()),
            _ => {
                self.pending_pong.lock().await.take();
                Err(SocketError::Timeout)
            }
        }
    }

    /// Receive the next decoded payload. There is exactly one logical
    /// reader; concurrent callers are serialized by an internal lock but
    /// each message is delivered to only one caller.
    pub async fn recv(&self) -> SocketResult<Option<serde_json::Value>> {
        let mut rx = self.incoming_rx.lock().await;
        Ok(rx.recv().await)
    }

    /// True once the reader has observed the stream close.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Close the underlying stream. Subsequent `send`/`ping` calls fail
    /// with `NotConnected`.
    pub async fn close(&self) -> SocketResult<()> {
        self.closed.store(true, Ordering::Release);
        self.pending_acks.clear();
        self.pending_pong.lock().await.take();
        self.stream.close().await
    }

    fn spawn_reader(
        socket: Arc<Self>,
        incoming_tx: mpsc::UnboundedSender<serde_json::Value>,
        open_tx: oneshot::Sender<()>,
    ) {
        tokio::spawn(async move {
            let mut open_tx = Some(open_tx);
            loop {
                match socket.stream.recv_text().await {
                    Ok(Some(text)) => {
                        let frame: SocketFrame = match serde_json::from_str(&text) {
                            Ok(frame) => frame,
                            Err(e) => {
                                tracing::warn!(error = %e, "dropping malformed frame");
                                continue;
                            }
                        };
                        Self::handle_frame(&socket, frame, &incoming_tx, &mut open_tx).await;
                    }
                    Ok(None) => {
                        tracing::debug!("duplex stream closed by peer");
                        break;
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "duplex stream read error");
                        break;
                    }
                }
            }
            socket.closed.store(true, Ordering::Release);
            socket.pending_acks.clear();
            socket.pending_pong.lock().await.take();
        });
    }

    async fn handle_frame(
        socket: &Arc<Self>,
        frame: SocketFrame,
        incoming_tx: &mpsc::UnboundedSender<serde_json::Value>,
        open_tx: &mut Option<oneshot::Sender<()>>,
    ) {
        match frame.kind {
            SocketFrameKind::Open => {
                if let Some(tx) = open_tx.take() {
                    let _ = tx.send(());
                }
            }
            SocketFrameKind::Ack => {
                let index = frame.chunk.map_or(0, |c| c.index);
                if let Some((_, tx)) = socket.pending_acks.remove(&(frame.id, index)) {
                    let _ = tx.send(());
                }
            }
            SocketFrameKind::Message => {
                // Acknowledge immediately, mirroring whatever chunk info we
                // received, before attempting to decode or reassemble.
                let ack = match frame.chunk {
                    Some(chunk) => {
                        let mut ack = SocketFrame::ack(frame.id.clone());
                        ack.chunk = Some(chunk);
                        ack
                    }
                    None => SocketFrame::ack(frame.id.clone()),
                };
                if let Ok(text) = serde_json::to_string(&ack) {
                    let _ = socket.stream.send_text(text).await;
                }

                let payload = match frame.chunk {
                    None => frame.data,
                    Some(chunk) => {
                        let mut entry = socket
                            .pending_chunks
                            .entry(frame.id.clone())
                            .or_insert_with(ChunkAssembly::default);
                        entry.add(chunk.index, chunk.total, frame.data.unwrap_or_default())
                    }
                };
                if let Some(payload) = payload {
                    socket.pending_chunks.remove(&frame.id);
                    match serde_json::from_str::<serde_json::Value>(&payload) {
                        Ok(value) => {
                            let _ = incoming_tx.send(value);
                        }
                        Err(e) => tracing::warn!(error = %e, "dropping message with invalid JSON payload"),
                    }
                }
            }
            SocketFrameKind::Ping => {
                let pong = SocketFrame::pong(frame.id);
                if let Ok(text) = serde_json::to_string(&pong) {
                    let _ = socket.stream.send_text(text).await;
                }
            }
            SocketFrameKind::Pong => {
                if let Some(tx) = socket.pending_pong.lock().await.take() {
                    let _ = tx.send(());
                }
            }
        }
    }
}
