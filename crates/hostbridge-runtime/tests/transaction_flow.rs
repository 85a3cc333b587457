//! End-to-end transaction flow over an in-memory socket pair: a fake
//! service side answers `SEND_IO_CALL` with scripted `IO_RESPONSE`s, and
//! the host side drives an `IOClient` render through to resolution.
//!
//! Covers the hello-world, group-of-three, cancel-mid-flight, and
//! validator-reject-then-accept scenarios. Reconnect-replay and
//! graceful-shutdown are `HostController`-level and are not exercised
//! here; see DESIGN.md.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use hostbridge_protocol::ids::TransactionId;
use hostbridge_protocol::methods::{Ack, service_to_host};
use hostbridge_protocol::model::{IOResponse, IOResponseKind};
use hostbridge_rpc::{DuplexRpc, HandlerTable, MethodSchema, MethodTable, RpcHandler, RpcResult};
use hostbridge_runtime::{ComponentDescriptor, Group, IoClient, PendingRenderTable, PermissiveRegistry};
use hostbridge_socket::MessageSocket;
use hostbridge_socket::mock::{self, MockDuplexStream};
use hostbridge_socket_traits::SocketConfig;
use serde_json::Value;

/// Forwards an inbound `IO_RESPONSE` to the transaction's `IoClient` once
/// it exists, mirroring `Dispatcher`'s `OnceLock`-deferred construction.
struct ForwardToIoClient {
    io_client: OnceLock<Arc<IoClient<MockDuplexStream>>>,
}

#[async_trait]
impl RpcHandler for ForwardToIoClient {
    async fn call(&self, data: Value) -> RpcResult<Value> {
        let response: IOResponse = serde_json::from_value(data)?;
        let client = self.io_client.get().expect("io client installed before first response").clone();
        Ok(client.handle_response(response).await)
    }
}

/// One end of the harness: an `IoClient` wired to a host-side `DuplexRpc`,
/// and the peer `DuplexRpc` a test drives by hand to script `IO_RESPONSE`s.
struct Harness {
    io_client: Arc<IoClient<MockDuplexStream>>,
    service_rpc: Arc<DuplexRpc<MockDuplexStream>>,
}

async fn setup(transaction_id: &str) -> Harness {
    let (host_stream, service_stream) = mock::pair();
    let host_socket = MessageSocket::connect(host_stream, SocketConfig::default(), "host".to_string())
        .await
        .unwrap();
    let service_socket = MessageSocket::connect(service_stream, SocketConfig::default(), "service".to_string())
        .await
        .unwrap();

    let mut host_schema = MethodTable::new();
    host_schema.register(service_to_host::IO_RESPONSE, MethodSchema::opaque());
    let mut host_handlers = HandlerTable::new();
    let forwarder = Arc::new(ForwardToIoClient { io_client: OnceLock::new() });
    host_handlers.register(service_to_host::IO_RESPONSE, forwarder.clone());
    let host_rpc = DuplexRpc::new(host_socket, host_schema, host_handlers);

    // The service side never registers host_to_service::SEND_IO_CALL: an
    // unhandled inbound method resolves the caller with a null ack, which
    // is all IoClient::render needs from that leg of the round trip.
    let service_rpc = DuplexRpc::new(service_socket, MethodTable::new(), HandlerTable::new());

    let pending = Arc::new(PendingRenderTable::new());
    let registry = Arc::new(PermissiveRegistry::new());
    let io_client = Arc::new(IoClient::new(TransactionId::from(transaction_id), host_rpc, registry, pending));
    forwarder.io_client.set(io_client.clone()).ok();

    Harness { io_client, service_rpc }
}

fn respond(transaction_id: &str, generation: u64, kind: IOResponseKind, values: Vec<Value>, choice: Option<String>) -> IOResponse {
    IOResponse {
        transaction_id: TransactionId::from(transaction_id),
        id: generation,
        kind,
        values,
        choice,
    }
}

#[tokio::test]
async fn hello_world_render_resolves_with_the_submitted_value() {
    let harness = setup("txn_hello").await;
    let service_rpc = harness.service_rpc.clone();

    tokio::spawn(async move {
        let response = respond("txn_hello", 1, IOResponseKind::Return, vec![Value::String("Ada".to_string())], None);
        let _ = service_rpc.call::<IOResponse, Ack>(service_to_host::IO_RESPONSE, response).await;
    });

    let group = Group::single(ComponentDescriptor::new("input.text", "Name", serde_json::json!({})));
    let result = harness.io_client.render(group).await.unwrap();

    assert_eq!(result.values, vec![Value::String("Ada".to_string())]);
    assert!(result.choice.is_none());
}

#[tokio::test]
async fn group_of_three_resolves_with_positional_values_and_a_choice() {
    let harness = setup("txn_group").await;
    let service_rpc = harness.service_rpc.clone();

    tokio::spawn(async move {
        let response = respond(
            "txn_group",
            1,
            IOResponseKind::Return,
            vec![Value::String("Ada".to_string()), Value::from(32), Value::Bool(true)],
            Some("submit".to_string()),
        );
        let _ = service_rpc.call::<IOResponse, Ack>(service_to_host::IO_RESPONSE, response).await;
    });

    let group = Group::new(vec![
        ComponentDescriptor::new("input.text", "Name", serde_json::json!({})),
        ComponentDescriptor::new("input.number", "Age", serde_json::json!({})),
        ComponentDescriptor::new("input.checkbox", "Subscribe", serde_json::json!({})).optional(),
    ]);
    let result = harness.io_client.render(group).await.unwrap();

    assert_eq!(result.values, vec![Value::String("Ada".to_string()), Value::from(32), Value::Bool(true)]);
    assert_eq!(result.choice.as_deref(), Some("submit"));
}

#[tokio::test]
async fn cancel_mid_flight_resolves_the_render_with_a_canceled_error() {
    let harness = setup("txn_cancel").await;
    let service_rpc = harness.service_rpc.clone();

    tokio::spawn(async move {
        let response = respond("txn_cancel", 1, IOResponseKind::Cancel, vec![], None);
        let _ = service_rpc.call::<IOResponse, Ack>(service_to_host::IO_RESPONSE, response).await;
    });

    let group = Group::single(ComponentDescriptor::new("input.text", "Name", serde_json::json!({})));
    let err = harness.io_client.render(group).await.unwrap_err();

    assert_eq!(err.kind, hostbridge_protocol::IOErrorKind::Canceled);
}

#[tokio::test]
async fn validator_rejects_then_accepts_on_resubmit() {
    let harness = setup("txn_validate").await;

    let group = Group::single(ComponentDescriptor::new("input.text", "Name", serde_json::json!({}))).validate(|values| {
        match values.first().and_then(Value::as_str) {
            Some("valid") => None,
            _ => Some("must be exactly \"valid\"".to_string()),
        }
    });

    let render = tokio::spawn({
        let io_client = harness.io_client.clone();
        async move { io_client.render(group).await }
    });

    // First a rejected VALIDATE round trip; it must not resolve the render.
    let reject = respond("txn_validate", 1, IOResponseKind::Validate, vec![Value::String("nope".to_string())], None);
    let reply: Value = harness.service_rpc.call(service_to_host::IO_RESPONSE, reject).await.unwrap();
    assert_eq!(reply["message"], Value::String("must be exactly \"valid\"".to_string()));

    // Then an accepted VALIDATE round trip.
    let accept = respond("txn_validate", 1, IOResponseKind::Validate, vec![Value::String("valid".to_string())], None);
    let reply: Value = harness.service_rpc.call(service_to_host::IO_RESPONSE, accept).await.unwrap();
    assert_eq!(reply["message"], Value::Null);

    // Finally the actual RETURN that resolves the render.
    let submit = respond("txn_validate", 1, IOResponseKind::Return, vec![Value::String("valid".to_string())], None);
    let _: Ack = harness.service_rpc.call(service_to_host::IO_RESPONSE, submit).await.unwrap();

    let result = render.await.unwrap().unwrap();
    assert_eq!(result.values, vec![Value::String("valid".to_string())]);
}
