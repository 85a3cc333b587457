//! Public facade over the `hostbridge-*` crate family: a `HostController`
//! builder, the reference WebSocket `Connector`, env-driven configuration,
//! and tracing setup (spec section 1).

mod connector;
mod env_config;
mod logging;

pub use connector::WebSocketConnector;
pub use env_config::host_config_from_env;
pub use logging::init_tracing;

pub use hostbridge_runtime::{
    ActionContext, ActionHandler, Connector, FailureInfo, Group, GroupResult, HandlerError, HostBridgeError,
    HostConfig, HostController, HostControllerHandle, IOError, IoClient, LoadingStateHandle, LogLevel, ObserverToken,
    PageContext, PageHandler, PermissiveRegistry, Result, RouteNode, RouteRegistry, TransactionErrorReport,
    TransactionRuntime, current_context, with_ambient_context,
};
pub use hostbridge_runtime::{ComponentDescriptor, ComponentRegistry, Validator};
pub use hostbridge_protocol::model::RouteAccess;
pub use hostbridge_socket::WebSocketDuplexStream;

/// Common imports for a handler-writing crate: `use hostbridge::prelude::*;`.
pub mod prelude {
    pub use crate::{
        ActionContext, ActionHandler, ComponentDescriptor, ComponentRegistry, Group, GroupResult, HandlerError,
        HostConfig, HostController, HostControllerHandle, PageContext, PageHandler, PermissiveRegistry, RouteNode,
        WebSocketConnector, WebSocketDuplexStream, current_context, host_config_from_env, init_tracing,
        with_ambient_context,
    };
}
