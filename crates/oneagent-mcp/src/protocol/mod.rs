//! MCP Protocol Engine (C6) — spec §4.6.

pub mod engine;
pub mod error;
pub mod jsonrpc;

pub use engine::{Engine, RequestContext, PROTOCOL_VERSION};
pub use error::ProtocolError;
pub use jsonrpc::{
    JsonRpcErrorBody, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId,
};
