//! Route registry, per-transaction I/O rendering, and transaction/page
//! session lifecycle on top of `hostbridge-rpc`'s `DuplexRpc`.

mod component;
mod config;
mod controller;
mod error;
mod io_client;
mod loading_state;
mod pending;
mod route_registry;
mod transaction;

pub use component::{ComponentDescriptor, ComponentRegistry, Group, GroupResult, PermissiveRegistry, Validator};
pub use config::{HostConfig, LogLevel};
pub use controller::{Connector, HostController, HostControllerHandle};
pub use error::{HostBridgeError, IOError, Result};
pub use io_client::IoClient;
pub use loading_state::LoadingStateHandle;
pub use pending::PendingRenderTable;
pub use route_registry::{ObserverToken, RouteNode, RouteRegistry};
pub use transaction::{
    ActionContext, ActionHandler, FailureInfo, HandlerError, PageContext, PageHandler, PageSessionRuntime,
    TransactionErrorReport, TransactionRuntime, current_context, with_ambient_context,
};
