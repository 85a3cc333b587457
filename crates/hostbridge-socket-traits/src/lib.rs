//! The `DuplexStream` trait abstracting the raw byte-stream transport
//! underneath `MessageSocket`, plus its error and configuration types.
//!
//! `hostbridge-socket` provides the reference WebSocket implementation (and
//! an in-memory one for tests); nothing in this crate knows about
//! WebSockets specifically.

mod config;
mod error;
mod traits;

pub use config::SocketConfig;
pub use error::{SocketError, SocketResult};
pub use traits::DuplexStream;
