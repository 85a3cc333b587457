//! `LoadingState`: coalesced progress reports for one transaction or page
//! session (spec section 4.6).

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use hostbridge_protocol::ids::{PageKey, TransactionId};
use hostbridge_protocol::methods::{Ack, SendLoadingCallRequest, SendPageLoadingCallRequest, host_to_service};
use hostbridge_protocol::model::LoadingState as WireLoadingState;
use hostbridge_rpc::{DuplexRpc, RpcResult};
use hostbridge_socket_traits::DuplexStream;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::pending::PendingRenderTable;

/// The trailing-debounce window within which mutations are merged into a
/// single coalesced loading call.
const COALESCE_WINDOW: Duration = Duration::from_millis(100);

struct Inner {
    state: WireLoadingState,
    started: bool,
    dirty: bool,
}

/// Ships the coalesced loading state for one key over the wire. Transactions
/// and page sessions use distinct wire methods (mirroring the existing
/// `SEND_IO_CALL` / `SEND_PAGE` split), so each key type gets its own sender.
#[async_trait::async_trait]
trait LoadingCallSender<S: DuplexStream + 'static>: Send + Sync {
    async fn send(&self, rpc: &DuplexRpc<S>, loading: WireLoadingState) -> RpcResult<Ack>;
}

struct TransactionLoadingSender(TransactionId);

#[async_trait::async_trait]
impl<S: DuplexStream + 'static> LoadingCallSender<S> for TransactionLoadingSender {
    async fn send(&self, rpc: &DuplexRpc<S>, loading: WireLoadingState) -> RpcResult<Ack> {
        let request = SendLoadingCallRequest { transaction_id: self.0.clone(), loading };
        rpc.call::<SendLoadingCallRequest, Ack>(host_to_service::SEND_LOADING_CALL, request).await
    }
}

struct PageLoadingSender(PageKey);

#[async_trait::async_trait]
impl<S: DuplexStream + 'static> LoadingCallSender<S> for PageLoadingSender {
    async fn send(&self, rpc: &DuplexRpc<S>, loading: WireLoadingState) -> RpcResult<Ack> {
        let request = SendPageLoadingCallRequest { page_key: self.0.clone(), loading };
        rpc.call::<SendPageLoadingCallRequest, Ack>(host_to_service::SEND_PAGE_LOADING_CALL, request).await
    }
}

/// A handle a transaction or page handler uses to report progress. Every
/// mutation within [`COALESCE_WINDOW`] is merged; only the last state in a
/// burst is actually sent. Generic over the key type so the same coalescing
/// logic serves both `ActionContext` and `PageContext`.
pub struct LoadingStateHandle<S: DuplexStream + 'static, K: Eq + Hash + Clone + fmt::Display + Send + Sync + 'static> {
    key: K,
    rpc: Arc<DuplexRpc<S>>,
    pending: Arc<PendingRenderTable<K>>,
    sender: Arc<dyn LoadingCallSender<S>>,
    inner: Arc<Mutex<Inner>>,
    notify: Arc<Notify>,
}

impl<S: DuplexStream + 'static, K: Eq + Hash + Clone + fmt::Display + Send + Sync + 'static> LoadingStateHandle<S, K> {
    fn build(key: K, rpc: Arc<DuplexRpc<S>>, pending: Arc<PendingRenderTable<K>>, sender: Arc<dyn LoadingCallSender<S>>) -> Self {
        let handle = Self {
            key,
            rpc,
            pending,
            sender,
            inner: Arc::new(Mutex::new(Inner {
                state: WireLoadingState::default(),
                started: false,
                dirty: false,
            })),
            notify: Arc::new(Notify::new()),
        };
        handle.spawn_flusher();
        handle
    }

    /// Begin reporting progress with an initial title/description/total.
    pub fn start(&self, title: Option<String>, description: Option<String>, items_in_queue: Option<u64>) {
        let mut inner = self.inner.lock();
        inner.started = true;
        inner.state = WireLoadingState {
            title,
            description,
            items_in_queue,
            items_completed: Some(0),
        };
        inner.dirty = true;
        drop(inner);
        self.notify.notify_one();
    }

    /// Replace title/description without touching the completed counter.
    pub fn update(&self, title: Option<String>, description: Option<String>) {
        let mut inner = self.inner.lock();
        if !inner.started {
            tracing::warn!(key = %self.key, "loading_state.update before start, ignoring");
            return;
        }
        if title.is_some() {
            inner.state.title = title;
        }
        if description.is_some() {
            inner.state.description = description;
        }
        inner.dirty = true;
        drop(inner);
        self.notify.notify_one();
    }

    /// Increment `items_completed` by one. A no-op warning before `start`,
    /// and never lets `items_completed` exceed `items_in_queue`.
    pub fn complete_one(&self) {
        let mut inner = self.inner.lock();
        if !inner.started {
            tracing::warn!(key = %self.key, "loading_state.complete_one before start, ignoring");
            return;
        }
        let completed = inner.state.items_completed.unwrap_or(0) + 1;
        let capped = match inner.state.items_in_queue {
            Some(total) => completed.min(total),
            None => completed,
        };
        inner.state.items_completed = Some(capped);
        inner.dirty = true;
        drop(inner);
        self.notify.notify_one();
    }

    fn spawn_flusher(&self) {
        let inner = self.inner.clone();
        let notify = self.notify.clone();
        let rpc = self.rpc.clone();
        let pending = self.pending.clone();
        let sender = self.sender.clone();
        let key = self.key.clone();

        tokio::spawn(async move {
            loop {
                notify.notified().await;
                tokio::time::sleep(COALESCE_WINDOW).await;

                let snapshot = {
                    let mut guard = inner.lock();
                    if !guard.dirty {
                        continue;
                    }
                    guard.dirty = false;
                    guard.state.clone()
                };

                pending.set_loading(key.clone(), snapshot.clone());

                if let Err(e) = sender.send(&rpc, snapshot).await {
                    tracing::warn!(key = %key, error = %e, "failed to send coalesced loading state");
                }
            }
        });
    }
}

impl<S: DuplexStream + 'static> LoadingStateHandle<S, TransactionId> {
    #[must_use]
    pub fn new(transaction_id: TransactionId, rpc: Arc<DuplexRpc<S>>, pending: Arc<PendingRenderTable<TransactionId>>) -> Self {
        let sender = Arc::new(TransactionLoadingSender(transaction_id.clone()));
        Self::build(transaction_id, rpc, pending, sender)
    }
}

impl<S: DuplexStream + 'static> LoadingStateHandle<S, PageKey> {
    #[must_use]
    pub fn new_for_page(page_key: PageKey, rpc: Arc<DuplexRpc<S>>, pending: Arc<PendingRenderTable<PageKey>>) -> Self {
        let sender = Arc::new(PageLoadingSender(page_key.clone()));
        Self::build(page_key, rpc, pending, sender)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_one_never_exceeds_items_in_queue() {
        let mut inner = Inner {
            state: WireLoadingState {
                title: None,
                description: None,
                items_in_queue: Some(1),
                items_completed: Some(1),
            },
            started: true,
            dirty: false,
        };
        let completed = inner.state.items_completed.unwrap_or(0) + 1;
        let capped = match inner.state.items_in_queue {
            Some(total) => completed.min(total),
            None => completed,
        };
        inner.state.items_completed = Some(capped);
        assert_eq!(inner.state.items_completed, Some(1));
    }
}
