//! `RouteRegistry`: flattens the nested page/action tree into slug-addressed
//! handlers and emits change events (spec section 3, section 9 "Event
//! observer wiring").

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use hostbridge_protocol::model::{Route, RouteAccess};
use hostbridge_socket_traits::DuplexStream;
use parking_lot::Mutex;
use serde_json::Value;

use crate::transaction::{ActionHandler, PageHandler};

/// One node of the declared route tree, before flattening.
pub enum RouteNode<S: DuplexStream + 'static> {
    Action {
        slug: String,
        handler: Arc<dyn ActionHandler<S>>,
        metadata: Option<Value>,
        access: RouteAccess,
    },
    Page {
        slug: String,
        name: Option<String>,
        handler: Option<Arc<dyn PageHandler<S>>>,
        access: RouteAccess,
        children: Vec<RouteNode<S>>,
    },
}

/// Opaque token an observer attaches under; detaching the token removes
/// every listener registered with it in one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverToken(u64);

type ChangeListener = Box<dyn Fn() + Send + Sync>;

/// Flattens a declared route tree into `slug-path -> handler` maps and the
/// wire projection sent in `INITIALIZE_HOST`, and notifies attached
/// observers whenever the tree is replaced.
pub struct RouteRegistry<S: DuplexStream + 'static> {
    actions: DashMap<String, Arc<dyn ActionHandler<S>>>,
    pages: DashMap<String, Option<Arc<dyn PageHandler<S>>>>,
    wire_routes: Mutex<Vec<Route>>,
    observers: Mutex<HashMap<ObserverToken, Vec<ChangeListener>>>,
    next_token: AtomicU64,
    _transport: PhantomData<S>,
}

impl<S: DuplexStream + 'static> Default for RouteRegistry<S> {
    fn default() -> Self {
        Self {
            actions: DashMap::new(),
            pages: DashMap::new(),
            wire_routes: Mutex::new(Vec::new()),
            observers: Mutex::new(HashMap::new()),
            next_token: AtomicU64::new(0),
            _transport: PhantomData,
        }
    }
}

impl<S: DuplexStream + 'static> RouteRegistry<S> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the entire route tree. Flattens `roots`, recording
    /// `slug-path -> handler` with last-write-wins (a warning on every
    /// overwrite), then notifies every attached observer.
    pub fn register(&self, roots: Vec<RouteNode<S>>) {
        self.actions.clear();
        self.pages.clear();
        let mut wire = Vec::new();
        for root in roots {
            flatten(root, String::new(), &self.actions, &self.pages, &mut wire);
        }
        *self.wire_routes.lock() = wire;
        self.notify_observers();
    }

    #[must_use]
    pub fn action(&self, slug_path: &str) -> Option<Arc<dyn ActionHandler<S>>> {
        self.actions.get(slug_path).map(|e| e.value().clone())
    }

    #[must_use]
    pub fn page_handler(&self, slug_path: &str) -> Option<Arc<dyn PageHandler<S>>> {
        self.pages.get(slug_path).and_then(|e| e.value().clone())
    }

    /// The flattened wire projection, as sent in `INITIALIZE_HOST`.
    #[must_use]
    pub fn wire_routes(&self) -> Vec<Route> {
        self.wire_routes.lock().clone()
    }

    /// Reserve a fresh observer token.
    pub fn new_observer_token(&self) -> ObserverToken {
        ObserverToken(self.next_token.fetch_add(1, Ordering::Relaxed))
    }

    /// Attach a change listener under `token`. A token may hold more than
    /// one listener.
    pub fn attach(&self, token: ObserverToken, listener: impl Fn() + Send + Sync + 'static) {
        self.observers.lock().entry(token).or_default().push(Box::new(listener));
    }

    /// Remove every listener registered under `token`.
    pub fn detach(&self, token: ObserverToken) {
        self.observers.lock().remove(&token);
    }

    fn notify_observers(&self) {
        for listeners in self.observers.lock().values() {
            for listener in listeners {
                listener();
            }
        }
    }
}

fn flatten<S: DuplexStream + 'static>(
    node: RouteNode<S>,
    prefix: String,
    actions: &DashMap<String, Arc<dyn ActionHandler<S>>>,
    pages: &DashMap<String, Option<Arc<dyn PageHandler<S>>>>,
    wire: &mut Vec<Route>,
) {
    match node {
        RouteNode::Action {
            slug,
            handler,
            metadata,
            access,
        } => {
            let path = join(&prefix, &slug);
            if actions.contains_key(&path) || pages.contains_key(&path) {
                tracing::warn!(slug_path = %path, "duplicate route slug, last write wins");
            }
            actions.insert(path.clone(), handler);
            wire.push(Route {
                slug: path,
                is_page: false,
                name: None,
                metadata,
                access,
            });
        }
        RouteNode::Page {
            slug,
            name,
            handler,
            access,
            children,
        } => {
            let path = join(&prefix, &slug);
            if actions.contains_key(&path) || pages.contains_key(&path) {
                tracing::warn!(slug_path = %path, "duplicate route slug, last write wins");
            }
            pages.insert(path.clone(), handler);
            wire.push(Route {
                slug: path.clone(),
                is_page: true,
                name,
                metadata: None,
                access,
            });
            for child in children {
                flatten(child, path.clone(), actions, pages, wire);
            }
        }
    }
}

fn join(prefix: &str, slug: &str) -> String {
    if prefix.is_empty() {
        slug.to_string()
    } else {
        format!("{prefix}/{slug}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{ActionContext, HandlerError};
    use hostbridge_socket::mock::MockDuplexStream;
    use std::sync::atomic::AtomicUsize;

    struct Noop;

    #[async_trait::async_trait]
    impl ActionHandler<MockDuplexStream> for Noop {
        async fn invoke(&self, _ctx: Arc<ActionContext<MockDuplexStream>>) -> Result<Value, HandlerError> {
            Ok(Value::Null)
        }
    }

    fn action_node(slug: &str) -> RouteNode<MockDuplexStream> {
        RouteNode::Action {
            slug: slug.to_string(),
            handler: Arc::new(Noop),
            metadata: None,
            access: RouteAccess::Public,
        }
    }

    #[test]
    fn flattens_nested_pages_into_slash_joined_slug_paths() {
        let registry: RouteRegistry<MockDuplexStream> = RouteRegistry::new();
        registry.register(vec![RouteNode::Page {
            slug: "billing".to_string(),
            name: Some("Billing".to_string()),
            handler: None,
            access: RouteAccess::Public,
            children: vec![action_node("refund")],
        }]);

        assert!(registry.action("billing/refund").is_some());
        let slugs: Vec<String> = registry.wire_routes().into_iter().map(|r| r.slug).collect();
        assert!(slugs.contains(&"billing".to_string()));
        assert!(slugs.contains(&"billing/refund".to_string()));
    }

    #[test]
    fn duplicate_slug_path_is_last_write_wins() {
        let registry: RouteRegistry<MockDuplexStream> = RouteRegistry::new();
        registry.register(vec![action_node("hello"), action_node("hello")]);
        assert!(registry.action("hello").is_some());
        assert_eq!(registry.wire_routes().iter().filter(|r| r.slug == "hello").count(), 2);
    }

    #[test]
    fn attached_observer_fires_on_register_and_stops_after_detach() {
        let registry: RouteRegistry<MockDuplexStream> = RouteRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let token = registry.new_observer_token();
        let counter = calls.clone();
        registry.attach(token, move || {
            counter.fetch_add(1, Ordering::Relaxed);
        });

        registry.register(vec![action_node("a")]);
        assert_eq!(calls.load(Ordering::Relaxed), 1);

        registry.detach(token);
        registry.register(vec![action_node("b")]);
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }
}
