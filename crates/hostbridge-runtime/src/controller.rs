//! `HostController`: connection lifecycle, initialization handshake,
//! inbound dispatch, and resend coordinators (spec section 4.3).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use dashmap::DashMap;
use hostbridge_protocol::error::IOErrorKind;
use hostbridge_protocol::ids::{PageKey, TransactionId};
use hostbridge_protocol::methods::{
    Ack, BeginHostShutdownRequest, ClosePageRequest, CloseTransactionRequest, InitializeHostRequest,
    InitializeHostResponse, OpenPageRequest, OrganizationInfo, SendIoCallRequest, SendLoadingCallRequest,
    SendPageLoadingCallRequest, SendPageRequest, StartTransactionRequest, host_to_service, service_to_host,
};
use hostbridge_protocol::model::IOResponse;
use hostbridge_rpc::{DuplexRpc, HandlerTable, MethodSchema, MethodTable, RpcHandler, RpcResult};
use hostbridge_socket::MessageSocket;
use hostbridge_socket_traits::{DuplexStream, SocketConfig, SocketResult};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::Notify;

use crate::component::ComponentRegistry;
use crate::config::HostConfig;
use crate::error::{HostBridgeError, Result};
use crate::io_client::IoClient;
use crate::pending::PendingRenderTable;
use crate::route_registry::RouteRegistry;
use crate::transaction::{PageSessionRuntime, TransactionErrorReport, TransactionRuntime};

/// Supplies a fresh transport stream for the initial connect and every
/// reconnect attempt. The reference deployment implements this against a
/// WebSocket; tests substitute an in-memory pair.
#[async_trait]
pub trait Connector<S: DuplexStream + 'static>: Send + Sync {
    async fn connect(&self, instance_id: &str) -> SocketResult<S>;
}

const SDK_NAME: &str = "hostbridge-rust";
const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

fn socket_config(config: &HostConfig) -> SocketConfig {
    SocketConfig {
        connect_timeout: config.connect_timeout,
        send_timeout: config.send_timeout,
        ping_interval: config.ping_interval,
        ping_timeout: config.ping_timeout,
        retry_chunk_interval: config.retry_chunk_interval,
        ..SocketConfig::default()
    }
}

/// Shared state behind every background task and the public handle.
struct Dispatcher<S: DuplexStream + 'static> {
    config: HostConfig,
    instance_id: String,
    connector: Arc<dyn Connector<S>>,
    routes: Arc<RouteRegistry<S>>,
    registry: Arc<dyn ComponentRegistry>,
    on_error: Option<Arc<dyn Fn(TransactionErrorReport) + Send + Sync>>,

    rpc: std::sync::OnceLock<Arc<DuplexRpc<S>>>,
    organization: Mutex<Option<OrganizationInfo>>,

    pending_renders: Arc<PendingRenderTable<TransactionId>>,
    pending_pages: Arc<PendingRenderTable<PageKey>>,
    io_response_handlers: Arc<DashMap<TransactionId, Arc<IoClient<S>>>>,
    open_pages: Arc<DashMap<PageKey, ()>>,

    shutting_down: AtomicBool,
    route_change: Notify,
}

impl<S: DuplexStream + 'static> Dispatcher<S> {
    fn rpc(&self) -> Option<Arc<DuplexRpc<S>>> {
        self.rpc.get().cloned()
    }

    async fn initialize(&self) -> Result<InitializeHostResponse> {
        let rpc = self.rpc().ok_or_else(|| HostBridgeError::from(hostbridge_protocol::HostError::ShutdownInProgress))?;
        let request = InitializeHostRequest {
            actions: self.routes.wire_routes().into_iter().filter(|r| !r.is_page).collect(),
            pages: self.routes.wire_routes().into_iter().filter(|r| r.is_page).collect(),
            sdk_name: SDK_NAME.to_string(),
            sdk_version: SDK_VERSION.to_string(),
        };
        let response = rpc
            .call::<InitializeHostRequest, InitializeHostResponse>(host_to_service::INITIALIZE_HOST, request)
            .await?;
        if !response.invalid_slugs.is_empty() {
            tracing::warn!(invalid_slugs = ?response.invalid_slugs, "service rejected some route slugs");
        }
        for warning in &response.warnings {
            tracing::warn!(%warning, "INITIALIZE_HOST warning");
        }
        if let Some(alert) = &response.sdk_alert {
            tracing::warn!(severity = %alert.severity, message = %alert.message, "SDK alert");
        }
        *self.organization.lock() = Some(response.organization.clone());
        Ok(response)
    }

    async fn resend_pending_renders(&self) {
        let Some(rpc) = self.rpc() else { return };
        for key in self.pending_renders.keys() {
            let Some(entry) = self.pending_renders.get(&key) else { continue };
            let Some(render) = entry.render else { continue };
            let request = SendIoCallRequest {
                transaction_id: key.clone(),
                render,
            };
            if let Err(e) = resend_with_backoff(&self.config, || {
                rpc.call::<SendIoCallRequest, Ack>(host_to_service::SEND_IO_CALL, request.clone())
            })
            .await
            {
                tracing::warn!(transaction_id = %key, error = %e, "giving up resending pending render");
                self.pending_renders.remove(&key);
            }
        }
    }

    async fn resend_pending_page_layouts(&self) {
        let Some(rpc) = self.rpc() else { return };
        for key in self.pending_pages.keys() {
            let Some(entry) = self.pending_pages.get(&key) else { continue };
            let Some(render) = entry.render else { continue };
            let request = SendPageRequest {
                page_key: key.clone(),
                render,
            };
            if let Err(e) = resend_with_backoff(&self.config, || {
                rpc.call::<SendPageRequest, Ack>(host_to_service::SEND_PAGE, request.clone())
            })
            .await
            {
                tracing::warn!(page_key = %key, error = %e, "giving up resending pending page layout");
                self.pending_pages.remove(&key);
            }
        }
    }

    async fn resend_transaction_loading_states(&self) {
        let Some(rpc) = self.rpc() else { return };
        for key in self.pending_renders.keys() {
            let Some(entry) = self.pending_renders.get(&key) else { continue };
            let Some(loading) = entry.loading else { continue };
            let request = SendLoadingCallRequest {
                transaction_id: key.clone(),
                loading,
            };
            if let Err(e) = resend_with_backoff(&self.config, || {
                rpc.call::<SendLoadingCallRequest, Ack>(host_to_service::SEND_LOADING_CALL, request.clone())
            })
            .await
            {
                tracing::warn!(transaction_id = %key, error = %e, "giving up resending loading state");
            }
        }
    }

    async fn resend_page_loading_states(&self) {
        let Some(rpc) = self.rpc() else { return };
        for key in self.pending_pages.keys() {
            let Some(entry) = self.pending_pages.get(&key) else { continue };
            let Some(loading) = entry.loading else { continue };
            let request = SendPageLoadingCallRequest {
                page_key: key.clone(),
                loading,
            };
            if let Err(e) = resend_with_backoff(&self.config, || {
                rpc.call::<SendPageLoadingCallRequest, Ack>(host_to_service::SEND_PAGE_LOADING_CALL, request.clone())
            })
            .await
            {
                tracing::warn!(page_key = %key, error = %e, "giving up resending page loading state");
            }
        }
    }
}

async fn resend_with_backoff<F, Fut, T>(config: &HostConfig, mut attempt: F) -> RpcResult<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = RpcResult<T>>,
{
    let mut attempt_number = 0u32;
    loop {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt_number >= config.max_resend_attempts => return Err(e),
            Err(_) => {
                attempt_number += 1;
                tokio::time::sleep(config.retry_interval * attempt_number).await;
            }
        }
    }
}

fn ack_value() -> Value {
    serde_json::to_value(Ack::default()).unwrap_or(Value::Null)
}

struct StartTransactionHandler<S: DuplexStream + 'static> {
    dispatcher: Arc<Dispatcher<S>>,
}

#[async_trait]
impl<S: DuplexStream + 'static> RpcHandler for StartTransactionHandler<S> {
    async fn call(&self, data: Value) -> RpcResult<Value> {
        let request: StartTransactionRequest = serde_json::from_value(data)?;
        if self.dispatcher.shutting_down.load(Ordering::Relaxed) {
            tracing::warn!(transaction_id = %request.transaction_id, "rejecting START_TRANSACTION during shutdown");
            return Ok(ack_value());
        }
        let Some(handler) = self.dispatcher.routes.action(&request.action.slug) else {
            tracing::warn!(slug = %request.action.slug, "START_TRANSACTION for unknown action");
            return Ok(ack_value());
        };
        let Some(rpc) = self.dispatcher.rpc() else {
            tracing::warn!("START_TRANSACTION arrived before initialization completed");
            return Ok(ack_value());
        };
        let organization = self.dispatcher.organization.lock().clone().unwrap_or(OrganizationInfo {
            id: String::new(),
            name: String::new(),
        });
        TransactionRuntime::spawn(
            handler,
            request,
            organization,
            rpc,
            self.dispatcher.registry.clone(),
            self.dispatcher.pending_renders.clone(),
            self.dispatcher.io_response_handlers.clone(),
            self.dispatcher.on_error.clone(),
        );
        Ok(ack_value())
    }
}

struct OpenPageHandler<S: DuplexStream + 'static> {
    dispatcher: Arc<Dispatcher<S>>,
}

#[async_trait]
impl<S: DuplexStream + 'static> RpcHandler for OpenPageHandler<S> {
    async fn call(&self, data: Value) -> RpcResult<Value> {
        let request: OpenPageRequest = serde_json::from_value(data)?;
        let Some(handler) = self.dispatcher.routes.page_handler(&request.page.slug) else {
            tracing::warn!(slug = %request.page.slug, "OPEN_PAGE for unknown page");
            return Ok(ack_value());
        };
        let Some(rpc) = self.dispatcher.rpc() else {
            return Ok(ack_value());
        };
        let organization = self.dispatcher.organization.lock().clone().unwrap_or(OrganizationInfo {
            id: String::new(),
            name: String::new(),
        });
        self.dispatcher.open_pages.insert(request.page_key.clone(), ());
        PageSessionRuntime::spawn(
            handler,
            request.page_key,
            request.user,
            request.environment,
            organization,
            request.params,
            rpc,
            self.dispatcher.pending_pages.clone(),
        );
        Ok(ack_value())
    }
}

struct IoResponseHandler<S: DuplexStream + 'static> {
    dispatcher: Arc<Dispatcher<S>>,
}

#[async_trait]
impl<S: DuplexStream + 'static> RpcHandler for IoResponseHandler<S> {
    async fn call(&self, data: Value) -> RpcResult<Value> {
        let request: IOResponse = serde_json::from_value(data)?;
        let Some(client) = self
            .dispatcher
            .io_response_handlers
            .get(&request.transaction_id)
            .map(|e| e.value().clone())
        else {
            tracing::debug!(transaction_id = %request.transaction_id, "IO_RESPONSE for unknown transaction, dropping");
            return Ok(ack_value());
        };
        Ok(client.handle_response(request).await)
    }
}

struct CloseTransactionHandler<S: DuplexStream + 'static> {
    dispatcher: Arc<Dispatcher<S>>,
}

#[async_trait]
impl<S: DuplexStream + 'static> RpcHandler for CloseTransactionHandler<S> {
    async fn call(&self, data: Value) -> RpcResult<Value> {
        let request: CloseTransactionRequest = serde_json::from_value(data)?;
        if let Some((_, client)) = self.dispatcher.io_response_handlers.remove(&request.transaction_id) {
            client.cancel_with(IOErrorKind::Canceled);
        }
        self.dispatcher.pending_renders.remove(&request.transaction_id);
        Ok(ack_value())
    }
}

struct ClosePageHandler<S: DuplexStream + 'static> {
    dispatcher: Arc<Dispatcher<S>>,
}

#[async_trait]
impl<S: DuplexStream + 'static> RpcHandler for ClosePageHandler<S> {
    async fn call(&self, data: Value) -> RpcResult<Value> {
        let request: ClosePageRequest = serde_json::from_value(data)?;
        self.dispatcher.open_pages.remove(&request.page_key);
        self.dispatcher.pending_pages.remove(&request.page_key);
        Ok(ack_value())
    }
}

fn build_handlers<S: DuplexStream + 'static>(dispatcher: Arc<Dispatcher<S>>) -> (MethodTable, HandlerTable) {
    let mut schema = MethodTable::new();
    schema.register(
        service_to_host::START_TRANSACTION,
        MethodSchema::typed::<StartTransactionRequest, Ack>(service_to_host::START_TRANSACTION),
    );
    schema.register(
        service_to_host::OPEN_PAGE,
        MethodSchema::typed::<OpenPageRequest, Ack>(service_to_host::OPEN_PAGE),
    );
    schema.register(service_to_host::IO_RESPONSE, MethodSchema::opaque());
    schema.register(
        service_to_host::CLOSE_TRANSACTION,
        MethodSchema::typed::<CloseTransactionRequest, Ack>(service_to_host::CLOSE_TRANSACTION),
    );
    schema.register(
        service_to_host::CLOSE_PAGE,
        MethodSchema::typed::<ClosePageRequest, Ack>(service_to_host::CLOSE_PAGE),
    );

    let mut handlers = HandlerTable::new();
    handlers.register(
        service_to_host::START_TRANSACTION,
        Arc::new(StartTransactionHandler { dispatcher: dispatcher.clone() }),
    );
    handlers.register(service_to_host::OPEN_PAGE, Arc::new(OpenPageHandler { dispatcher: dispatcher.clone() }));
    handlers.register(service_to_host::IO_RESPONSE, Arc::new(IoResponseHandler { dispatcher: dispatcher.clone() }));
    handlers.register(
        service_to_host::CLOSE_TRANSACTION,
        Arc::new(CloseTransactionHandler { dispatcher: dispatcher.clone() }),
    );
    handlers.register(service_to_host::CLOSE_PAGE, Arc::new(ClosePageHandler { dispatcher }));

    (schema, handlers)
}

/// Builder for one host connection.
pub struct HostController<S: DuplexStream + 'static> {
    config: HostConfig,
    connector: Arc<dyn Connector<S>>,
    routes: Arc<RouteRegistry<S>>,
    registry: Arc<dyn ComponentRegistry>,
    on_error: Option<Arc<dyn Fn(TransactionErrorReport) + Send + Sync>>,
}

impl<S: DuplexStream + 'static> HostController<S> {
    #[must_use]
    pub fn new(
        config: HostConfig,
        connector: Arc<dyn Connector<S>>,
        routes: Arc<RouteRegistry<S>>,
        registry: Arc<dyn ComponentRegistry>,
    ) -> Self {
        Self {
            config,
            connector,
            routes,
            registry,
            on_error: None,
        }
    }

    #[must_use]
    pub fn with_on_error(mut self, callback: impl Fn(TransactionErrorReport) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(callback));
        self
    }

    /// Perform the initial connect and `INITIALIZE_HOST` handshake, then
    /// spawn the ping, reconnect, and resend background tasks.
    pub async fn connect(self) -> Result<HostControllerHandle<S>> {
        let instance_id = uuid::Uuid::new_v4().to_string();
        let stream = self.connector.connect(&instance_id).await?;
        let socket = MessageSocket::connect(stream, socket_config(&self.config), instance_id.clone()).await?;

        let dispatcher = Arc::new(Dispatcher {
            config: self.config,
            instance_id,
            connector: self.connector,
            routes: self.routes,
            registry: self.registry,
            on_error: self.on_error,
            rpc: std::sync::OnceLock::new(),
            organization: Mutex::new(None),
            pending_renders: Arc::new(PendingRenderTable::new()),
            pending_pages: Arc::new(PendingRenderTable::new()),
            io_response_handlers: Arc::new(DashMap::new()),
            open_pages: Arc::new(DashMap::new()),
            shutting_down: AtomicBool::new(false),
            route_change: Notify::new(),
        });

        let (schema, handler_table) = build_handlers(dispatcher.clone());
        let rpc = DuplexRpc::new(socket, schema, handler_table);
        let _ = dispatcher.rpc.set(rpc);

        dispatcher.initialize().await?;

        spawn_ping_loop(dispatcher.clone());
        spawn_reconnect_loop(dispatcher.clone());
        spawn_route_change_loop(dispatcher.clone());

        let token = dispatcher.routes.new_observer_token();
        let notify_clone = Arc::new(Notify::new());
        let waker = notify_clone.clone();
        dispatcher.routes.attach(token, move || waker.notify_one());
        tokio::spawn({
            let dispatcher = dispatcher.clone();
            async move {
                loop {
                    notify_clone.notified().await;
                    dispatcher.route_change.notify_one();
                }
            }
        });

        Ok(HostControllerHandle { dispatcher })
    }
}

fn spawn_ping_loop<S: DuplexStream + 'static>(dispatcher: Arc<Dispatcher<S>>) {
    tokio::spawn(async move {
        let last_pong = Mutex::new(Instant::now());
        loop {
            tokio::time::sleep(dispatcher.config.ping_interval).await;
            let Some(rpc) = dispatcher.rpc() else { continue };
            let socket = rpc.current_socket();
            match socket.ping().await {
                Ok(()) => *last_pong.lock() = Instant::now(),
                Err(e) => tracing::debug!(error = %e, "ping failed"),
            }
            if last_pong.lock().elapsed() > dispatcher.config.close_unresponsive_connection_timeout {
                tracing::warn!("no pong within close_unresponsive_connection_timeout, forcing reconnect");
                let _ = socket.close().await;
            }
        }
    });
}

fn spawn_reconnect_loop<S: DuplexStream + 'static>(dispatcher: Arc<Dispatcher<S>>) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(dispatcher.config.retry_interval).await;
            if dispatcher.shutting_down.load(Ordering::Relaxed) {
                continue;
            }
            let Some(rpc) = dispatcher.rpc() else { continue };
            if !rpc.current_socket().is_closed() {
                continue;
            }
            tracing::info!("socket closed, attempting reconnect");
            match dispatcher.connector.connect(&dispatcher.instance_id).await {
                Ok(stream) => match MessageSocket::connect(stream, socket_config(&dispatcher.config), dispatcher.instance_id.clone()).await {
                    Ok(new_socket) => {
                        rpc.set_communicator(new_socket);
                        if let Err(e) = dispatcher.initialize().await {
                            tracing::warn!(error = %e, "re-initialization after reconnect failed");
                            continue;
                        }
                        dispatcher.resend_pending_renders().await;
                        dispatcher.resend_pending_page_layouts().await;
                        dispatcher.resend_transaction_loading_states().await;
                        dispatcher.resend_page_loading_states().await;
                        tracing::info!("reconnected and replayed pending state");
                    }
                    Err(e) => tracing::warn!(error = %e, "reconnect handshake failed, will retry"),
                },
                Err(e) => tracing::warn!(error = %e, "reconnect attempt failed, will retry"),
            }
        }
    });
}

fn spawn_route_change_loop<S: DuplexStream + 'static>(dispatcher: Arc<Dispatcher<S>>) {
    tokio::spawn(async move {
        loop {
            dispatcher.route_change.notified().await;
            tokio::time::sleep(dispatcher.config.reinitialize_batch_timeout).await;
            if let Err(e) = dispatcher.initialize().await {
                tracing::warn!(error = %e, "failed to re-initialize after route change");
            }
        }
    });
}

/// A live, connected host. Dropping this does not close the connection;
/// call [`HostControllerHandle::immediately_close`] or
/// [`HostControllerHandle::begin_shutdown`] explicitly.
pub struct HostControllerHandle<S: DuplexStream + 'static> {
    dispatcher: Arc<Dispatcher<S>>,
}

impl<S: DuplexStream + 'static> HostControllerHandle<S> {
    #[must_use]
    pub fn organization(&self) -> Option<OrganizationInfo> {
        self.dispatcher.organization.lock().clone()
    }

    /// Ask the service to stop dispatching new transactions, then wait for
    /// in-flight transactions to drain before closing.
    pub async fn begin_shutdown(&self) -> Result<()> {
        self.dispatcher.shutting_down.store(true, Ordering::Relaxed);
        if let Some(rpc) = self.dispatcher.rpc() {
            rpc.call::<BeginHostShutdownRequest, Ack>(host_to_service::BEGIN_HOST_SHUTDOWN, BeginHostShutdownRequest::default())
                .await?;
        }
        while !self.dispatcher.io_response_handlers.is_empty() {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }
        tokio::time::sleep(self.dispatcher.config.complete_http_request_delay).await;
        self.immediately_close().await;
        Ok(())
    }

    /// Close the socket without draining in-flight transactions.
    pub async fn immediately_close(&self) {
        if let Some(rpc) = self.dispatcher.rpc() {
            let _ = rpc.current_socket().close().await;
        }
    }
}
