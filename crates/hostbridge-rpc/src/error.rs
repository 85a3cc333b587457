//! Errors raised by the `DuplexRPC` layer.

use hostbridge_protocol::ValidationError;
use hostbridge_socket::SocketError;
use thiserror::Error;

/// Result alias for fallible `DuplexRPC` operations.
pub type RpcResult<T> = Result<T, RpcError>;

/// Failure modes for an outbound call or the transport it rides on.
///
/// Inbound schema-validation failures never surface here: per spec, those
/// log-and-drop rather than propagate (see [`crate::duplex_rpc::DuplexRpc`]).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RpcError {
    /// The underlying socket is not connected (closed locally, or swapped
    /// out from under an in-flight call via `set_communicator`).
    #[error("not connected")]
    NotConnected,
    /// The underlying `MessageSocket::send` failed.
    #[error(transparent)]
    Transport(#[from] SocketError),
    /// The peer's response failed our output-schema validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// No handler is registered for an inbound call's method name.
    #[error("no handler registered for method `{0}`")]
    UnknownMethod(String),
    /// Failed to serialize an outbound frame.
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}
