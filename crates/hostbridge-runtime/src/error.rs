//! Runtime-level error taxonomy, plus the crate-wide umbrella `Result`.

use hostbridge_protocol::{IOErrorKind, ValidationError};
use hostbridge_rpc::RpcError;
use hostbridge_socket::SocketError;
use thiserror::Error;

/// Raised into a suspended handler when a render or group await cannot be
/// fulfilled (spec section 7).
#[derive(Debug, Clone, Error)]
#[error("io error: {kind:?}")]
pub struct IOError {
    pub kind: IOErrorKind,
}

impl IOError {
    #[must_use]
    pub fn new(kind: IOErrorKind) -> Self {
        Self { kind }
    }

    #[must_use]
    pub fn canceled() -> Self {
        Self::new(IOErrorKind::Canceled)
    }

    #[must_use]
    pub fn transaction_closed() -> Self {
        Self::new(IOErrorKind::TransactionClosed)
    }

    #[must_use]
    pub fn bad_response() -> Self {
        Self::new(IOErrorKind::BadResponse)
    }
}

/// Flattens every layer's error enum into one umbrella error, mirroring
/// the teacher's layered `TransportError` → top-level `Error` composition.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HostBridgeError {
    #[error(transparent)]
    Socket(#[from] SocketError),
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error(transparent)]
    Io(#[from] IOError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Host(#[from] hostbridge_protocol::HostError),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, HostBridgeError>;
