//! `PendingRenderTable`: the last-sent render/loading snapshot per
//! TransactionId or PageKey, needed for resend after reconnect.

use std::hash::Hash;

use dashmap::DashMap;
use hostbridge_protocol::model::{LoadingState, PendingRender, RenderInstruction};

/// Generic over the key type so the same table shape serves both
/// transaction and page-session resend coordinators.
#[derive(Default)]
pub struct PendingRenderTable<K: Eq + Hash + Clone> {
    entries: DashMap<K, PendingRender>,
}

impl<K: Eq + Hash + Clone> PendingRenderTable<K> {
    #[must_use]
    pub fn new() -> Self {
        Self { entries: DashMap::new() }
    }

    /// Record (or replace) the render snapshot for `key`.
    pub fn set_render(&self, key: K, render: RenderInstruction) {
        self.entries.entry(key).or_default().render = Some(render);
    }

    /// Record (or replace) the loading-state snapshot for `key`.
    pub fn set_loading(&self, key: K, loading: LoadingState) {
        self.entries.entry(key).or_default().loading = Some(loading);
    }

    /// Drop all state for `key` (transaction/page closed).
    pub fn remove(&self, key: &K) {
        self.entries.remove(key);
    }

    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of every key currently tracked, for a resend sweep.
    #[must_use]
    pub fn keys(&self) -> Vec<K> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }

    #[must_use]
    pub fn get(&self, key: &K) -> Option<PendingRender> {
        self.entries.get(key).map(|e| e.value().clone())
    }
}
