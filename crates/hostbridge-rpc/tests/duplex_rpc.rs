use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hostbridge_rpc::{DuplexRpc, HandlerTable, MethodSchema, MethodTable, RpcError, RpcHandler, RpcResult};
use hostbridge_socket::{MessageSocket, SocketConfig};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

fn fast_config() -> SocketConfig {
    SocketConfig {
        connect_timeout: Duration::from_millis(200),
        send_timeout: Duration::from_millis(200),
        ping_interval: Duration::from_secs(30),
        ping_timeout: Duration::from_millis(200),
        retry_chunk_interval: Duration::from_millis(10),
        max_chunk_retries: 3,
        chunk_threshold_bytes: 64 * 1024,
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct PingInput {
    value: u32,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct PingOutput {
    value: u32,
}

struct Pong;

#[async_trait]
impl RpcHandler for Pong {
    async fn call(&self, data: Value) -> RpcResult<Value> {
        let input: PingInput = serde_json::from_value(data).unwrap();
        Ok(serde_json::to_value(PingOutput { value: input.value + 1 }).unwrap())
    }
}

async fn connected_pair() -> (Arc<MessageSocket<hostbridge_socket::mock::MockDuplexStream>>, Arc<MessageSocket<hostbridge_socket::mock::MockDuplexStream>>)
{
    let (a, b) = hostbridge_socket::mock::pair();
    let (sock_a, sock_b) = tokio::join!(
        MessageSocket::connect(a, fast_config(), "a".to_string()),
        MessageSocket::connect(b, fast_config(), "b".to_string()),
    );
    (sock_a.unwrap(), sock_b.unwrap())
}

#[tokio::test]
async fn call_round_trips_through_a_registered_handler() {
    let (sock_a, sock_b) = connected_pair().await;

    let mut schema = MethodTable::new();
    schema.register("PING", MethodSchema::typed::<PingInput, PingOutput>("PING"));
    let mut handlers = HandlerTable::new();
    handlers.register("PING", Arc::new(Pong));

    let _rpc_b = DuplexRpc::new(sock_b, schema, handlers);
    let rpc_a = DuplexRpc::new(sock_a, MethodTable::new(), HandlerTable::new());

    let output: PingOutput = rpc_a.call("PING", PingInput { value: 41 }).await.unwrap();
    assert_eq!(output, PingOutput { value: 42 });
}

#[tokio::test]
async fn call_to_unregistered_method_resolves_with_null_response() {
    let (sock_a, sock_b) = connected_pair().await;

    let _rpc_b = DuplexRpc::new(sock_b, MethodTable::new(), HandlerTable::new());
    let rpc_a = DuplexRpc::new(sock_a, MethodTable::new(), HandlerTable::new());

    let output: Value = rpc_a.call("NOPE", json!({})).await.unwrap();
    assert_eq!(output, Value::Null);
}

#[tokio::test]
async fn call_failing_input_validation_resolves_with_null_response() {
    let (sock_a, sock_b) = connected_pair().await;

    let mut schema = MethodTable::new();
    schema.register("PING", MethodSchema::typed::<PingInput, PingOutput>("PING"));
    let mut handlers = HandlerTable::new();
    handlers.register("PING", Arc::new(Pong));

    let _rpc_b = DuplexRpc::new(sock_b, schema, handlers);
    let rpc_a = DuplexRpc::new(sock_a, MethodTable::new(), HandlerTable::new());

    let output: Value = rpc_a.call("PING", json!({"wrong_field": true})).await.unwrap();
    assert_eq!(output, Value::Null);
}

#[tokio::test]
async fn set_communicator_fails_in_flight_calls_with_not_connected() {
    let (sock_a, _sock_b) = connected_pair().await;
    let rpc_a = DuplexRpc::new(sock_a, MethodTable::new(), HandlerTable::new());

    // No peer handler is listening, so this call would otherwise hang
    // forever; rebinding to a fresh socket must resolve it instead.
    let pending = tokio::spawn({
        let rpc_a = rpc_a.clone();
        async move { rpc_a.call::<_, Value>("NEVER_ANSWERED", json!({})).await }
    });

    tokio::time::sleep(Duration::from_millis(20)).await;

    let (fresh_a, _fresh_b) = connected_pair().await;
    rpc_a.set_communicator(fresh_a);

    let result = pending.await.unwrap();
    assert!(matches!(result, Err(RpcError::NotConnected)));
}
