//! Typed call/response multiplexing over a `MessageSocket` (spec section
//! 4.2). Each side declares the methods it responds to as a
//! [`schema::MethodTable`] plus a [`handler::HandlerTable`]; outbound calls
//! are made with [`duplex_rpc::DuplexRpc::call`].

mod duplex_rpc;
mod error;
mod handler;
mod schema;

pub use duplex_rpc::DuplexRpc;
pub use error::{RpcError, RpcResult};
pub use handler::{HandlerTable, RpcHandler};
pub use schema::{MethodSchema, MethodTable};
