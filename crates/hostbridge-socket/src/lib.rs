//! Framed, ack'd, timeout-bounded message exchange over a duplex stream
//! (spec section 4.1). `MessageSocket` is transport-agnostic; this crate
//! supplies the reference WebSocket [`DuplexStream`] and, under
//! `test-support`, an in-memory one.

mod chunker;
mod message_socket;
mod websocket;

#[cfg(any(test, feature = "test-support"))]
pub mod mock;

pub use hostbridge_socket_traits::{DuplexStream, SocketConfig, SocketError, SocketResult};
pub use message_socket::MessageSocket;
pub use websocket::WebSocketDuplexStream;
