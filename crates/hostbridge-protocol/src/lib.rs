//! Wire frames, data model, and error taxonomy shared by every layer of the
//! hostbridge transaction runtime.
//!
//! This crate has no opinions about transport or execution; it only defines
//! the shapes that cross the wire and the identifiers used to key runtime
//! state. See `hostbridge-socket` for the framed/ack'd byte-stream layer and
//! `hostbridge-rpc` for the typed call/response multiplexer built on top.

pub mod error;
pub mod frame;
pub mod ids;
pub mod methods;
pub mod model;

pub use error::{HostError, IOErrorKind, ValidationError};
pub use frame::{RpcFrame, RpcKind, SocketFrame, SocketFrameKind};
pub use ids::{MessageId, PageKey, RequestId, TransactionId};
pub use model::{
    Component, ComponentState, IOResponse, IOResponseKind, LoadingState, PendingRender,
    RenderInstruction, Route, RouteAccess,
};
