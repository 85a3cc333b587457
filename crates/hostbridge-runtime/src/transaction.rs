//! `TransactionRuntime`: the lifecycle of one transaction or page session
//! (spec section 4.5).

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::Utc;
use dashmap::DashMap;
use hostbridge_protocol::error::IOErrorKind;
use hostbridge_protocol::ids::{PageKey, TransactionId};
use hostbridge_protocol::methods::{
    self, Ack, ActionResult, EnvironmentInfo, MarkTransactionCompleteRequest, OrganizationInfo,
    SendLogRequest, SendPageRequest, SendRedirectRequest, StartTransactionRequest, UserContext,
    host_to_service,
};
use hostbridge_rpc::DuplexRpc;
use hostbridge_socket_traits::DuplexStream;
use serde_json::Value;
use thiserror::Error;

use crate::component::{ComponentDescriptor, ComponentRegistry, Group};
use crate::io_client::IoClient;
use crate::loading_state::LoadingStateHandle;
use crate::pending::PendingRenderTable;

/// Structured failure info a handler returns, carried into `FAILURE`'s
/// `{name, message, cause}` payload.
#[derive(Debug, Clone)]
pub struct FailureInfo {
    pub name: String,
    pub message: String,
    pub cause: Option<String>,
}

impl FailureInfo {
    #[must_use]
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            cause: None,
        }
    }
}

/// The error a handler returns. Distinct from
/// [`hostbridge_protocol::methods::ActionError`], which is the serialized
/// wire shape this type is translated into.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("canceled")]
    Canceled,
    #[error("{}", info.message)]
    Failed { info: FailureInfo },
}

impl From<crate::error::IOError> for HandlerError {
    fn from(err: crate::error::IOError) -> Self {
        if err.kind == IOErrorKind::Canceled {
            Self::Canceled
        } else {
            Self::Failed {
                info: FailureInfo::new("IOError", err.to_string()),
            }
        }
    }
}

fn into_action_result(outcome: Result<Value, HandlerError>, redirected: bool) -> ActionResult {
    if redirected && outcome.is_ok() {
        return ActionResult::redirected();
    }
    match outcome {
        Ok(value) => ActionResult::success(value),
        Err(HandlerError::Canceled) => ActionResult::canceled(),
        Err(HandlerError::Failed { info }) => ActionResult::failure(methods::ActionError {
            name: info.name,
            message: info.message,
            cause: info.cause,
        }),
    }
}

/// Metadata handed to a developer-supplied `onError` callback.
pub struct TransactionErrorReport {
    pub slug: String,
    pub params: Value,
    pub user: UserContext,
    pub organization: OrganizationInfo,
    pub error: FailureInfo,
}

/// The context object passed to (and ambiently bound around) one
/// transaction's handler invocation.
pub struct ActionContext<S: DuplexStream + 'static> {
    pub transaction_id: TransactionId,
    pub user: UserContext,
    pub environment: EnvironmentInfo,
    pub organization: OrganizationInfo,
    pub params: Value,
    io: Arc<IoClient<S>>,
    loading: Arc<LoadingStateHandle<S, TransactionId>>,
    rpc: Arc<DuplexRpc<S>>,
    log_index: AtomicU64,
    redirected: AtomicBool,
}

impl<S: DuplexStream + 'static> ActionContext<S> {
    #[must_use]
    pub fn io(&self) -> &Arc<IoClient<S>> {
        &self.io
    }

    #[must_use]
    pub fn loading(&self) -> &Arc<LoadingStateHandle<S, TransactionId>> {
        &self.loading
    }

    /// Ship one log line, capped at 10k characters with a per-transaction
    /// monotonic index. Never fails the handler; transport errors are
    /// logged and swallowed, since logs are a side channel (spec section
    /// 4.5, 5).
    pub async fn log(&self, message: impl Into<String>) {
        let index = self.log_index.fetch_add(1, Ordering::Relaxed);
        let request = SendLogRequest {
            transaction_id: self.transaction_id.clone(),
            index,
            message: methods::truncate_log_message(&message.into()),
            timestamp: Utc::now(),
        };
        if let Err(e) = self.rpc.call::<SendLogRequest, Ack>(host_to_service::SEND_LOG, request).await {
            tracing::warn!(transaction_id = %self.transaction_id, error = %e, "failed to ship log line");
        }
    }

    /// Ship a redirect instruction. Marks this transaction as redirected;
    /// if the handler subsequently returns successfully, its result is
    /// reported as `REDIRECTED` rather than `SUCCESS`.
    pub async fn redirect(&self, url: impl Into<String>) {
        self.redirected.store(true, Ordering::Relaxed);
        let request = SendRedirectRequest {
            transaction_id: self.transaction_id.clone(),
            url: url.into(),
        };
        if let Err(e) = self
            .rpc
            .call::<SendRedirectRequest, Ack>(host_to_service::SEND_REDIRECT, request)
            .await
        {
            tracing::warn!(transaction_id = %self.transaction_id, error = %e, "failed to ship redirect");
        }
    }
}

tokio::task_local! {
    static CURRENT_CONTEXT: Box<dyn Any + Send>;
}

/// Run `fut` with `ctx` bound as the ambient context (spec section 9
/// "Ambient context"). Scoped strictly to `fut`'s execution; does not leak
/// into tasks the handler spawns itself (pass `ctx` explicitly to those).
pub async fn with_ambient_context<S, F>(ctx: Arc<ActionContext<S>>, fut: F) -> F::Output
where
    S: DuplexStream + 'static,
    F: std::future::Future,
{
    CURRENT_CONTEXT.scope(Box::new(ctx), fut).await
}

/// Read the ambiently-bound context, if this code is running inside a
/// transaction handler invocation for the matching transport type.
#[must_use]
pub fn current_context<S: DuplexStream + 'static>() -> Option<Arc<ActionContext<S>>> {
    CURRENT_CONTEXT
        .try_with(|boxed| boxed.downcast_ref::<Arc<ActionContext<S>>>().cloned())
        .ok()
        .flatten()
}

/// A developer-declared action handler invocation target, generic over the
/// underlying transport.
#[async_trait::async_trait]
pub trait ActionHandler<S: DuplexStream + 'static>: Send + Sync {
    async fn invoke(&self, ctx: Arc<ActionContext<S>>) -> Result<Value, HandlerError>;
}

/// Drives one transaction end to end: builds the context, invokes the
/// handler under the ambient binding, reports the terminal result, and
/// tears down transaction-keyed state.
pub struct TransactionRuntime;

impl TransactionRuntime {
    #[allow(clippy::too_many_arguments)]
    pub fn spawn<S: DuplexStream + 'static>(
        handler: Arc<dyn ActionHandler<S>>,
        request: StartTransactionRequest,
        organization: OrganizationInfo,
        rpc: Arc<DuplexRpc<S>>,
        registry: Arc<dyn ComponentRegistry>,
        pending: Arc<PendingRenderTable<TransactionId>>,
        io_response_handlers: Arc<DashMap<TransactionId, Arc<IoClient<S>>>>,
        on_error: Option<Arc<dyn Fn(TransactionErrorReport) + Send + Sync>>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let transaction_id = request.transaction_id.clone();
            let io_client = Arc::new(IoClient::new(transaction_id.clone(), rpc.clone(), registry, pending.clone()));
            io_response_handlers.insert(transaction_id.clone(), io_client.clone());
            let loading = Arc::new(LoadingStateHandle::new(transaction_id.clone(), rpc.clone(), pending.clone()));

            let ctx = Arc::new(ActionContext {
                transaction_id: transaction_id.clone(),
                user: request.user.clone(),
                environment: request.environment.clone(),
                organization: organization.clone(),
                params: request.params.clone(),
                io: io_client.clone(),
                loading,
                rpc: rpc.clone(),
                log_index: AtomicU64::new(0),
                redirected: AtomicBool::new(false),
            });

            let outcome = with_ambient_context(ctx.clone(), handler.invoke(ctx.clone())).await;
            let redirected = ctx.redirected.load(Ordering::Relaxed);

            if let (Some(callback), Err(HandlerError::Failed { info })) = (&on_error, &outcome) {
                callback(TransactionErrorReport {
                    slug: request.action.slug.clone(),
                    params: request.params.clone(),
                    user: request.user.clone(),
                    organization: organization.clone(),
                    error: info.clone(),
                });
            }

            let result = into_action_result(outcome, redirected);
            let complete = MarkTransactionCompleteRequest {
                transaction_id: transaction_id.clone(),
                result,
            };
            if let Err(e) = rpc
                .call::<MarkTransactionCompleteRequest, Ack>(host_to_service::MARK_TRANSACTION_COMPLETE, complete)
                .await
            {
                tracing::warn!(transaction_id = %transaction_id, error = %e, "failed to report transaction result");
            }

            io_client.cancel_with(IOErrorKind::TransactionClosed);
            io_response_handlers.remove(&transaction_id);
            pending.remove(&transaction_id);
        })
    }
}

/// Context for one open page session.
pub struct PageContext<S: DuplexStream + 'static> {
    pub page_key: PageKey,
    pub user: UserContext,
    pub environment: EnvironmentInfo,
    pub organization: OrganizationInfo,
    pub params: Value,
    rpc: Arc<DuplexRpc<S>>,
    pending: Arc<PendingRenderTable<PageKey>>,
    loading: Arc<LoadingStateHandle<S, PageKey>>,
}

impl<S: DuplexStream + 'static> PageContext<S> {
    #[must_use]
    pub fn loading(&self) -> &Arc<LoadingStateHandle<S, PageKey>> {
        &self.loading
    }

    /// Ship one layout render. May be called more than once as layout
    /// fields resolve asynchronously.
    pub async fn render(&self, group: Group) -> Result<(), crate::error::IOError> {
        let compiled = group.components.iter().map(ComponentDescriptor::compile).collect();
        let render = hostbridge_protocol::model::RenderInstruction {
            components: compiled,
            choice_buttons: group.choice_buttons.clone(),
            validator_token: None,
            generation: 0,
        };
        self.pending.set_render(self.page_key.clone(), render.clone());
        let request = SendPageRequest {
            page_key: self.page_key.clone(),
            render,
        };
        self.rpc
            .call::<SendPageRequest, Ack>(host_to_service::SEND_PAGE, request)
            .await
            .map(|_: Ack| ())
            .map_err(|_| crate::error::IOError::bad_response())
    }
}

/// A developer-declared page layout handler.
#[async_trait::async_trait]
pub trait PageHandler<S: DuplexStream + 'static>: Send + Sync {
    async fn invoke(&self, ctx: Arc<PageContext<S>>) -> Result<Group, HandlerError>;
}

/// Drives one page session: builds the context, invokes the handler, ships
/// its initial layout. Page sessions have no terminal report analogous to
/// `MARK_TRANSACTION_COMPLETE`; they end via server `CLOSE_PAGE`.
pub struct PageSessionRuntime;

impl PageSessionRuntime {
    pub fn spawn<S: DuplexStream + 'static>(
        handler: Arc<dyn PageHandler<S>>,
        page_key: PageKey,
        user: UserContext,
        environment: EnvironmentInfo,
        organization: OrganizationInfo,
        params: Value,
        rpc: Arc<DuplexRpc<S>>,
        pending: Arc<PendingRenderTable<PageKey>>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let loading = Arc::new(LoadingStateHandle::new_for_page(page_key.clone(), rpc.clone(), pending.clone()));
            let ctx = Arc::new(PageContext {
                page_key: page_key.clone(),
                user,
                environment,
                organization,
                params,
                rpc,
                pending,
                loading,
            });
            match handler.invoke(ctx.clone()).await {
                Ok(group) => {
                    if let Err(e) = ctx.render(group).await {
                        tracing::warn!(page_key = %page_key, error = %e, "failed to ship initial page layout");
                    }
                }
                Err(e) => {
                    tracing::warn!(page_key = %page_key, error = %e, "page layout handler failed");
                }
            }
        })
    }
}
