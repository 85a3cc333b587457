//! `HostController`-level lifecycle coverage that `transaction_flow.rs`
//! cannot reach: replaying pending render state across a reconnect, and
//! draining an in-flight transaction during a graceful shutdown.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use hostbridge_protocol::ids::TransactionId;
use hostbridge_protocol::methods::{
    Ack, ActionRef, EnvironmentInfo, InitializeHostResponse, OrganizationInfo, SendIoCallRequest,
    StartTransactionRequest, UserContext, host_to_service, service_to_host,
};
use hostbridge_protocol::model::RouteAccess;
use hostbridge_rpc::{DuplexRpc, HandlerTable, MethodTable, RpcHandler, RpcResult};
use hostbridge_runtime::{
    ActionContext, ActionHandler, ComponentDescriptor, Connector, Group, HandlerError, HostConfig, HostController,
    PermissiveRegistry, RouteNode, RouteRegistry,
};
use hostbridge_socket::MessageSocket;
use hostbridge_socket::mock::{self, MockDuplexStream};
use hostbridge_socket_traits::{SocketConfig, SocketError, SocketResult};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

/// Hands out pre-built streams in order, then fails. Models a host that
/// dials one endpoint across an initial connect and every reconnect.
struct QueuedConnector {
    streams: StdMutex<VecDeque<MockDuplexStream>>,
}

impl QueuedConnector {
    fn new(streams: Vec<MockDuplexStream>) -> Self {
        Self {
            streams: StdMutex::new(streams.into_iter().collect()),
        }
    }
}

#[async_trait]
impl Connector<MockDuplexStream> for QueuedConnector {
    async fn connect(&self, _instance_id: &str) -> SocketResult<MockDuplexStream> {
        self.streams.lock().unwrap().pop_front().ok_or(SocketError::NotConnected)
    }
}

struct InitializeHandler;

#[async_trait]
impl RpcHandler for InitializeHandler {
    async fn call(&self, _data: Value) -> RpcResult<Value> {
        let response = InitializeHostResponse {
            organization: OrganizationInfo {
                id: "org_1".to_string(),
                name: "Acme".to_string(),
            },
            environment: EnvironmentInfo {
                id: "env_1".to_string(),
                name: "test".to_string(),
            },
            dashboard_url: "https://dashboard.test".to_string(),
            warnings: vec![],
            invalid_slugs: vec![],
            sdk_alert: None,
        };
        Ok(serde_json::to_value(response)?)
    }
}

struct RecordIoCall {
    tx: mpsc::UnboundedSender<SendIoCallRequest>,
}

#[async_trait]
impl RpcHandler for RecordIoCall {
    async fn call(&self, data: Value) -> RpcResult<Value> {
        let request: SendIoCallRequest = serde_json::from_value(data)?;
        let _ = self.tx.send(request);
        Ok(serde_json::to_value(Ack::default())?)
    }
}

struct AckHandler;

#[async_trait]
impl RpcHandler for AckHandler {
    async fn call(&self, _data: Value) -> RpcResult<Value> {
        Ok(serde_json::to_value(Ack::default())?)
    }
}

/// Completes the `OPEN` handshake on `stream` and registers genuine
/// handlers for every method the host invokes during these tests. An
/// unregistered method would fall back to a null response, which does not
/// deserialize into `InitializeHostResponse` or even the empty `Ack`.
async fn setup_service(stream: MockDuplexStream, io_tx: mpsc::UnboundedSender<SendIoCallRequest>) -> Arc<DuplexRpc<MockDuplexStream>> {
    let socket = MessageSocket::connect(stream, SocketConfig::default(), "service".to_string())
        .await
        .expect("service side completes the OPEN handshake");

    let mut handlers = HandlerTable::new();
    handlers.register(host_to_service::INITIALIZE_HOST, Arc::new(InitializeHandler));
    handlers.register(host_to_service::SEND_IO_CALL, Arc::new(RecordIoCall { tx: io_tx }));
    handlers.register(host_to_service::MARK_TRANSACTION_COMPLETE, Arc::new(AckHandler));
    handlers.register(host_to_service::BEGIN_HOST_SHUTDOWN, Arc::new(AckHandler));
    handlers.register(host_to_service::SEND_LOG, Arc::new(AckHandler));
    handlers.register(host_to_service::SEND_REDIRECT, Arc::new(AckHandler));

    DuplexRpc::new(socket, MethodTable::new(), handlers)
}

fn start_request(transaction_id: &str, slug: &str) -> StartTransactionRequest {
    StartTransactionRequest {
        transaction_id: TransactionId::from(transaction_id),
        action: ActionRef {
            slug: slug.to_string(),
            url: String::new(),
        },
        environment: EnvironmentInfo {
            id: "env_1".to_string(),
            name: "test".to_string(),
        },
        user: UserContext {
            id: "user_1".to_string(),
            email: "ada@example.test".to_string(),
            name: None,
        },
        params: Value::Null,
        params_meta: None,
    }
}

/// A handler whose render never resolves: no `IO_RESPONSE` is ever sent in
/// these tests, so the call sits suspended while still leaving its render
/// in the pending table for a reconnect to replay.
struct SlowRender;

#[async_trait]
impl ActionHandler<MockDuplexStream> for SlowRender {
    async fn invoke(&self, ctx: Arc<ActionContext<MockDuplexStream>>) -> Result<Value, HandlerError> {
        let group = Group::single(ComponentDescriptor::new("input.text", "Name", serde_json::json!({})));
        let _ = ctx.io().render(group).await;
        Ok(Value::Null)
    }
}

#[tokio::test]
async fn reconnect_replays_the_last_render_with_the_same_generation() {
    let (host1, svc1) = mock::pair();
    let (host2, svc2) = mock::pair();

    let mut config = HostConfig::new("mock://test");
    config.retry_interval = Duration::from_millis(30);

    let connector: Arc<dyn Connector<MockDuplexStream>> = Arc::new(QueuedConnector::new(vec![host1, host2]));
    let routes: Arc<RouteRegistry<MockDuplexStream>> = Arc::new(RouteRegistry::new());
    routes.register(vec![RouteNode::Action {
        slug: "slow".to_string(),
        handler: Arc::new(SlowRender),
        metadata: None,
        access: RouteAccess::Public,
    }]);
    let registry = Arc::new(PermissiveRegistry::new());
    let controller = HostController::new(config, connector, routes, registry);

    let (io_tx, mut io_rx) = mpsc::unbounded_channel();

    let (connect_result, service1_rpc) = tokio::join!(controller.connect(), setup_service(svc1, io_tx.clone()));
    let handle = connect_result.expect("initial connect succeeds");

    let _: Ack = service1_rpc
        .call(service_to_host::START_TRANSACTION, start_request("txn_reconnect", "slow"))
        .await
        .unwrap();

    let first = tokio::time::timeout(Duration::from_secs(1), io_rx.recv())
        .await
        .expect("first SEND_IO_CALL arrives")
        .expect("channel stays open");
    assert_eq!(first.transaction_id, TransactionId::from("txn_reconnect"));
    assert_eq!(first.render.generation, 1);

    // Start the second leg's handshake before tearing down the first, so it
    // is already waiting when the reconnect loop redials.
    let service2_task = tokio::spawn(setup_service(svc2, io_tx.clone()));

    service1_rpc.current_socket().close().await.unwrap();

    let second = tokio::time::timeout(Duration::from_secs(2), io_rx.recv())
        .await
        .expect("render is resent after reconnect")
        .expect("channel stays open");
    assert_eq!(second.transaction_id, first.transaction_id);
    assert_eq!(second.render.generation, first.render.generation);

    let _ = service2_task.await;
    handle.immediately_close().await;
}

/// A handler that reports it started, then blocks until released.
struct GatedAction {
    started_tx: mpsc::UnboundedSender<()>,
    gate: StdMutex<Option<oneshot::Receiver<()>>>,
}

#[async_trait]
impl ActionHandler<MockDuplexStream> for GatedAction {
    async fn invoke(&self, _ctx: Arc<ActionContext<MockDuplexStream>>) -> Result<Value, HandlerError> {
        let _ = self.started_tx.send(());
        let rx = self.gate.lock().unwrap().take().expect("invoked exactly once");
        let _ = rx.await;
        Ok(Value::Null)
    }
}

#[tokio::test]
async fn graceful_shutdown_drains_in_flight_transaction_before_closing() {
    let (host, svc) = mock::pair();

    let mut config = HostConfig::new("mock://test");
    config.retry_interval = Duration::from_millis(30);
    config.complete_http_request_delay = Duration::from_millis(10);

    let connector: Arc<dyn Connector<MockDuplexStream>> = Arc::new(QueuedConnector::new(vec![host]));
    let routes: Arc<RouteRegistry<MockDuplexStream>> = Arc::new(RouteRegistry::new());

    let (started_tx, mut started_rx) = mpsc::unbounded_channel();
    let (gate_tx, gate_rx) = oneshot::channel();
    let action = Arc::new(GatedAction {
        started_tx,
        gate: StdMutex::new(Some(gate_rx)),
    });
    routes.register(vec![RouteNode::Action {
        slug: "gated".to_string(),
        handler: action,
        metadata: None,
        access: RouteAccess::Public,
    }]);

    let registry = Arc::new(PermissiveRegistry::new());
    let controller = HostController::new(config, connector, routes, registry);

    let (io_tx, _io_rx) = mpsc::unbounded_channel();
    let (connect_result, service_rpc) = tokio::join!(controller.connect(), setup_service(svc, io_tx));
    let handle = Arc::new(connect_result.expect("initial connect succeeds"));

    let _: Ack = service_rpc
        .call(service_to_host::START_TRANSACTION, start_request("txn_shutdown", "gated"))
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(1), started_rx.recv())
        .await
        .expect("handler starts")
        .expect("channel stays open");

    let shutdown_handle = handle.clone();
    let shutdown_task = tokio::spawn(async move { shutdown_handle.begin_shutdown().await });

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(
        !shutdown_task.is_finished(),
        "begin_shutdown must not return while a transaction is in-flight"
    );

    let _ = gate_tx.send(());

    tokio::time::timeout(Duration::from_secs(2), shutdown_task)
        .await
        .expect("begin_shutdown returns once the transaction drains")
        .expect("shutdown task did not panic")
        .expect("begin_shutdown succeeds");
}
