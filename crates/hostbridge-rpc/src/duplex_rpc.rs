//! `DuplexRpc`: a typed call/response multiplexer over a `MessageSocket`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use hostbridge_protocol::frame::{RpcFrame, RpcKind};
use hostbridge_protocol::ids::RequestId;
use hostbridge_socket::{DuplexStream, MessageSocket};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{oneshot, watch};

use crate::error::{RpcError, RpcResult};
use crate::handler::HandlerTable;
use crate::schema::MethodTable;

type PendingCalls = DashMap<RequestId, oneshot::Sender<RpcResult<Value>>>;

/// A method multiplexer bound to a single logical connection that may be
/// rebound across reconnects (spec section 4.2's `setCommunicator`).
pub struct DuplexRpc<S: DuplexStream + 'static> {
    socket_tx: watch::Sender<Arc<MessageSocket<S>>>,
    next_id: AtomicU64,
    pending_calls: Arc<PendingCalls>,
    responder_schema: MethodTable,
    handlers: HandlerTable,
}

impl<S: DuplexStream + 'static> DuplexRpc<S> {
    /// Bind to `socket`, declaring the schema/handlers this side responds
    /// with, and start the background dispatch loop.
    #[must_use]
    pub fn new(socket: Arc<MessageSocket<S>>, responder_schema: MethodTable, handlers: HandlerTable) -> Arc<Self> {
        let (socket_tx, socket_rx) = watch::channel(socket);
        let pending_calls: Arc<PendingCalls> = Arc::new(DashMap::new());

        let rpc = Arc::new(Self {
            socket_tx,
            next_id: AtomicU64::new(1),
            pending_calls,
            responder_schema,
            handlers,
        });

        Self::spawn_dispatch_loop(rpc.clone(), socket_rx);
        rpc
    }

    fn fresh_id(&self) -> RequestId {
        RequestId::from(format!("r{}", self.next_id.fetch_add(1, Ordering::Relaxed)))
    }

    /// The socket currently bound to this multiplexer.
    #[must_use]
    pub fn current_socket(&self) -> Arc<MessageSocket<S>> {
        self.socket_tx.borrow().clone()
    }

    /// Rebind to a new socket after reconnection. In-flight calls made on
    /// the old socket are failed with `NotConnected`; the caller is
    /// responsible for re-initiating them.
    pub fn set_communicator(&self, new_socket: Arc<MessageSocket<S>>) {
        let stale: Vec<RequestId> = self.pending_calls.iter().map(|e| e.key().clone()).collect();
        for id in stale {
            if let Some((_, tx)) = self.pending_calls.remove(&id) {
                let _ = tx.send(Err(RpcError::NotConnected));
            }
        }
        let _ = self.socket_tx.send(new_socket);
    }

    /// Issue a typed call and await the peer's response.
    ///
    /// There is no built-in per-call timeout: per spec, retry policy
    /// belongs to the caller (the resend coordinators above this layer).
    pub async fn call<In, Out>(&self, method_name: &str, input: In) -> RpcResult<Out>
    where
        In: Serialize,
        Out: DeserializeOwned,
    {
        let socket = self.current_socket();
        if socket.is_closed() {
            return Err(RpcError::NotConnected);
        }

        let id = self.fresh_id();
        let (tx, rx) = oneshot::channel();
        self.pending_calls.insert(id.clone(), tx);

        let frame = RpcFrame {
            id: id.clone(),
            kind: RpcKind::Call,
            method_name: method_name.to_string(),
            data: serde_json::to_value(input).map_err(|e| {
                hostbridge_protocol::ValidationError::new(method_name, e.to_string())
            })?,
        };

        if let Err(e) = socket.send(&serde_json::to_value(&frame)?, 1.0).await {
            self.pending_calls.remove(&id);
            return Err(e.into());
        }

        match rx.await {
            Ok(Ok(value)) => serde_json::from_value(value)
                .map_err(|e| hostbridge_protocol::ValidationError::new(method_name, e.to_string()).into()),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(RpcError::NotConnected),
        }
    }

    fn spawn_dispatch_loop(rpc: Arc<Self>, mut socket_rx: watch::Receiver<Arc<MessageSocket<S>>>) {
        tokio::spawn(async move {
            loop {
                let socket = socket_rx.borrow_and_update().clone();
                tokio::select! {
                    changed = socket_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    received = socket.recv() => {
                        match received {
                            Ok(Some(value)) => rpc.handle_incoming(&socket, value).await,
                            Ok(None) | Err(_) => {
                                if socket_rx.changed().await.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                }
            }
        });
    }

    async fn handle_incoming(&self, socket: &Arc<MessageSocket<S>>, value: Value) {
        let frame: RpcFrame = match serde_json::from_value(value) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "dropping frame that is not a valid RpcFrame");
                return;
            }
        };

        match frame.kind {
            RpcKind::Response => {
                if let Some((_, tx)) = self.pending_calls.remove(&frame.id) {
                    let _ = tx.send(Ok(frame.data));
                } else {
                    tracing::debug!(id = %frame.id, "response for unknown or already-resolved call");
                }
            }
            RpcKind::Call => self.handle_call(socket, frame).await,
        }
    }

    async fn handle_call(&self, socket: &Arc<MessageSocket<S>>, frame: RpcFrame) {
        let schema = self.responder_schema.get(&frame.method_name);

        if let Some(schema) = schema {
            if let Err(e) = schema.validate_input(&frame.data) {
                tracing::warn!(method = %frame.method_name, error = %e, "inbound call failed input validation, dropping");
                self.reply_null(socket, frame.id).await;
                return;
            }
        }

        let Some(handler) = self.handlers.get(&frame.method_name) else {
            tracing::warn!(method = %frame.method_name, "no handler registered, replying with null");
            self.reply_null(socket, frame.id).await;
            return;
        };

        let result = handler.call(frame.data).await;
        let output = match result {
            Ok(value) => {
                if let Some(schema) = schema {
                    if let Err(e) = schema.validate_output(&value) {
                        tracing::warn!(method = %frame.method_name, error = %e, "handler output failed validation, replying with null");
                        Value::Null
                    } else {
                        value
                    }
                } else {
                    value
                }
            }
            Err(e) => {
                tracing::warn!(method = %frame.method_name, error = %e, "handler returned an error, replying with null");
                Value::Null
            }
        };

        let response = RpcFrame {
            id: frame.id,
            kind: RpcKind::Response,
            method_name: frame.method_name,
            data: output,
        };
        match serde_json::to_value(&response) {
            Ok(value) => {
                if let Err(e) = socket.send(&value, 1.0).await {
                    tracing::warn!(error = %e, "failed to send RPC response");
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to serialize RPC response"),
        }
    }

    async fn reply_null(&self, socket: &Arc<MessageSocket<S>>, id: RequestId) {
        let response = RpcFrame {
            id,
            kind: RpcKind::Response,
            method_name: String::new(),
            data: Value::Null,
        };
        if let Ok(value) = serde_json::to_value(&response) {
            let _ = socket.send(&value, 1.0).await;
        }
    }
}
