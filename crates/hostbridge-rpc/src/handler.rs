//! Responder-side handlers for inbound `CALL` frames.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::RpcResult;

/// Handles one method's inbound calls. Implementations receive the already
/// schema-validated input and return a value to be schema-validated and
/// sent back as the `RESPONSE`.
#[async_trait]
pub trait RpcHandler: Send + Sync {
    /// Handle one call. Returning `Err` still produces a `RESPONSE` frame
    /// at the `DuplexRpc` layer; callers above decide whether that maps to
    /// a protocol-level failure.
    async fn call(&self, data: Value) -> RpcResult<Value>;
}

/// Registered handlers, keyed by method name.
#[derive(Clone, Default)]
pub struct HandlerTable {
    handlers: HashMap<String, Arc<dyn RpcHandler>>,
}

impl HandlerTable {
    /// An empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the handler for one method name.
    pub fn register(&mut self, method_name: impl Into<String>, handler: Arc<dyn RpcHandler>) -> &mut Self {
        self.handlers.insert(method_name.into(), handler);
        self
    }

    /// Look up the handler for a method name, if registered.
    #[must_use]
    pub fn get(&self, method_name: &str) -> Option<Arc<dyn RpcHandler>> {
        self.handlers.get(method_name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl RpcHandler for Echo {
        async fn call(&self, data: Value) -> RpcResult<Value> {
            Ok(data)
        }
    }

    #[tokio::test]
    async fn registered_handler_is_invoked() {
        let mut table = HandlerTable::new();
        table.register("ECHO", Arc::new(Echo));

        let handler = table.get("ECHO").expect("handler registered");
        let result = handler.call(json!({"x": 1})).await.unwrap();
        assert_eq!(result, json!({"x": 1}));
    }

    #[test]
    fn unregistered_method_has_no_handler() {
        let table = HandlerTable::new();
        assert!(table.get("NOPE").is_none());
    }
}
