//! `IOClient`: the per-transaction render loop (spec section 4.4).

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use hostbridge_protocol::IOErrorKind;
use hostbridge_protocol::ids::TransactionId;
use hostbridge_protocol::methods::{Ack, SendIoCallRequest, host_to_service};
use hostbridge_protocol::model::{IOResponse, IOResponseKind, RenderInstruction};
use hostbridge_rpc::DuplexRpc;
use hostbridge_socket_traits::DuplexStream;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::component::{ComponentDescriptor, ComponentRegistry, Group, GroupResult, Validator};
use crate::error::IOError;
use crate::pending::PendingRenderTable;

struct Outstanding {
    generation: u64,
    components: Vec<ComponentDescriptor>,
    validator: Option<Validator>,
    tx: Option<oneshot::Sender<Result<GroupResult, IOError>>>,
}

/// Converts handler-side `io.*` calls into render instructions and routes
/// `IO_RESPONSE` replies back into the suspended handler.
///
/// Exactly one live `IOClient` exists per TransactionId at any time (spec
/// section 3's invariant); it refuses to start a second render while one
/// is outstanding.
pub struct IoClient<S: DuplexStream + 'static> {
    transaction_id: TransactionId,
    rpc: Arc<DuplexRpc<S>>,
    registry: Arc<dyn ComponentRegistry>,
    pending: Arc<PendingRenderTable<TransactionId>>,
    generation: AtomicU64,
    outstanding: Mutex<Option<Outstanding>>,
    /// When true, renders resolve locally as soon as they are shipped
    /// instead of awaiting a user response (spec section 4.4's
    /// "display-only components"). Scoped to the whole transaction; see
    /// DESIGN.md for why this crate does not track it per-component.
    pub display_resolves_immediately: bool,
}

impl<S: DuplexStream + 'static> IoClient<S> {
    #[must_use]
    pub fn new(
        transaction_id: TransactionId,
        rpc: Arc<DuplexRpc<S>>,
        registry: Arc<dyn ComponentRegistry>,
        pending: Arc<PendingRenderTable<TransactionId>>,
    ) -> Self {
        Self {
            transaction_id,
            rpc,
            registry,
            pending,
            generation: AtomicU64::new(0),
            outstanding: Mutex::new(None),
            display_resolves_immediately: false,
        }
    }

    /// Render one group and await its resolution. Refuses to start a
    /// second render while one is outstanding (there should never be a
    /// second call since handler-side `io.*` calls are sequential).
    pub async fn render(&self, group: Group) -> Result<GroupResult, IOError> {
        if self.outstanding.lock().is_some() {
            return Err(IOError::bad_response());
        }

        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let compiled = group.components.iter().map(ComponentDescriptor::compile).collect();
        let validator_token = group.validator.as_ref().map(|_| format!("v{generation}"));

        let render = RenderInstruction {
            components: compiled,
            choice_buttons: group.choice_buttons.clone(),
            validator_token,
            generation,
        };
        self.pending.set_render(self.transaction_id.clone(), render.clone());

        let component_count = group.components.len();
        let (tx, rx) = oneshot::channel();
        *self.outstanding.lock() = Some(Outstanding {
            generation,
            components: group.components,
            validator: group.validator,
            tx: Some(tx),
        });

        let request = SendIoCallRequest {
            transaction_id: self.transaction_id.clone(),
            render,
        };
        if self
            .rpc
            .call::<SendIoCallRequest, Ack>(host_to_service::SEND_IO_CALL, request)
            .await
            .is_err()
        {
            self.outstanding.lock().take();
            return Err(IOError::bad_response());
        }

        if self.display_resolves_immediately {
            self.outstanding.lock().take();
            return Ok(GroupResult {
                values: vec![Value::Null; component_count],
                choice: None,
            });
        }

        match rx.await {
            Ok(result) => result,
            Err(_) => Err(IOError::transaction_closed()),
        }
    }

    /// Route an inbound `IO_RESPONSE` into the outstanding render, if any.
    /// Returns the value to send back as the RPC response.
    pub async fn handle_response(&self, response: IOResponse) -> Value {
        let ack = || serde_json::to_value(Ack::default()).unwrap_or(Value::Null);

        if response.kind == IOResponseKind::Validate {
            let message = {
                let guard = self.outstanding.lock();
                match guard.as_ref() {
                    Some(outstanding) if outstanding.generation == response.id => {
                        outstanding.validator.as_ref().and_then(|v| v(&response.values))
                    }
                    _ => {
                        tracing::debug!(transaction_id = %self.transaction_id, "VALIDATE for stale or missing render");
                        None
                    }
                }
            };
            return serde_json::json!({ "message": message });
        }

        let mut guard = self.outstanding.lock();
        let Some(outstanding) = guard.as_mut() else {
            tracing::debug!(transaction_id = %self.transaction_id, "IO_RESPONSE with no outstanding render, dropping");
            return ack();
        };
        if outstanding.generation != response.id {
            tracing::debug!(transaction_id = %self.transaction_id, "IO_RESPONSE for stale generation, dropping");
            return ack();
        }

        match response.kind {
            IOResponseKind::Return => {
                let mut values = Vec::with_capacity(response.values.len());
                for (value, descriptor) in response.values.iter().zip(outstanding.components.iter()) {
                    match self.registry.parse_return(descriptor.method_name(), value) {
                        Ok(parsed) => values.push(parsed),
                        Err(e) => {
                            tracing::warn!(error = %e, "return value failed registry validation");
                            if let Some(tx) = outstanding.tx.take() {
                                let _ = tx.send(Err(IOError::bad_response()));
                            }
                            *guard = None;
                            drop(guard);
                            self.pending.remove(&self.transaction_id);
                            return ack();
                        }
                    }
                }
                if let Some(tx) = outstanding.tx.take() {
                    let _ = tx.send(Ok(GroupResult {
                        values,
                        choice: response.choice.clone(),
                    }));
                }
                *guard = None;
                drop(guard);
                self.pending.remove(&self.transaction_id);
            }
            IOResponseKind::SetState => {
                drop(guard);
                self.apply_set_state(&response.values);
            }
            IOResponseKind::Cancel => {
                if let Some(tx) = outstanding.tx.take() {
                    let _ = tx.send(Err(IOError::canceled()));
                }
                *guard = None;
                drop(guard);
                self.pending.remove(&self.transaction_id);
            }
            IOResponseKind::Validate => unreachable!("handled above"),
        }

        ack()
    }

    fn apply_set_state(&self, values: &[Value]) {
        let Some(mut entry) = self.pending.get(&self.transaction_id) else {
            return;
        };
        let Some(render) = entry.render.as_mut() else {
            return;
        };
        for (value, component) in values.iter().zip(render.components.iter_mut()) {
            match self.registry.parse_state(&component.method_name, value) {
                Ok(parsed) => component.current_props = parsed,
                Err(e) => tracing::warn!(error = %e, "SET_STATE value failed registry validation"),
            }
        }
        self.pending.set_render(self.transaction_id.clone(), render.clone());
    }

    /// Reject any outstanding render and clear this transaction's pending
    /// state (server `CLOSE_TRANSACTION` or local teardown).
    pub fn cancel_with(&self, kind: IOErrorKind) {
        if let Some(mut outstanding) = self.outstanding.lock().take() {
            if let Some(tx) = outstanding.tx.take() {
                let _ = tx.send(Err(IOError::new(kind)));
            }
        }
        self.pending.remove(&self.transaction_id);
    }
}
