//! Error taxonomy shared across the socket, rpc, and runtime layers.
//!
//! Each layer wraps these in its own richer error enum (`SocketError`,
//! `RpcError`, ...); this crate only defines the pieces that cross layer
//! boundaries as data (e.g. an `IOErrorKind` reported to a handler, or a
//! `ValidationError` surfaced from a schema check).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why an inbound or outbound payload failed schema validation.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("validation failed for `{method_name}`: {message}")]
pub struct ValidationError {
    /// The RPC or component method name being validated.
    pub method_name: String,
    /// Human-readable description of the mismatch.
    pub message: String,
}

impl ValidationError {
    /// Construct a validation error.
    pub fn new(method_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            method_name: method_name.into(),
            message: message.into(),
        }
    }
}

/// Classification of an `IOError` raised into a suspended handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IOErrorKind {
    /// The service cancelled the transaction (`CLOSE_TRANSACTION`).
    Canceled,
    /// The transaction was closed locally before the render resolved.
    TransactionClosed,
    /// A parsed server reply did not match the expected shape.
    BadResponse,
    /// The render itself could not be constructed or shipped.
    RenderError,
}

/// Higher-level orchestration errors not tied to one transaction.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HostError {
    /// The API key was rejected during `INITIALIZE_HOST`.
    #[error("invalid API key")]
    InvalidApiKey,
    /// `safelyClose`/`immediatelyClose` was already in progress or done.
    #[error("host shutdown already in progress")]
    ShutdownInProgress,
    /// A slug resolved to more than one handler and the conflict could not
    /// be resolved by last-write-wins (e.g. an empty slug path).
    #[error("invalid route: {0}")]
    InvalidRoute(String),
    /// The server rejected `INITIALIZE_HOST` outright.
    #[error("initialization rejected: {0}")]
    InitializationRejected(String),
}
