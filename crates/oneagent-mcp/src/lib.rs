//! oneagent-mcp — the MCP coordination substrate.
//!
//! This crate has no knowledge of agents or conversations; it is the
//! reusable MCP runtime (wire protocol, session lifecycle, tool dispatch)
//! that `oneagent` wires up alongside the agent registry and communication
//! bus. See spec §2 components C1-C7.

pub mod backbone;
pub mod origin;
pub mod protocol;
pub mod session;
pub mod tools;
pub mod transport;

pub use backbone::Backbone;
pub use origin::{OriginValidator, OriginValidatorConfig};
pub use protocol::{Engine, ProtocolError};
pub use session::SessionManager;
pub use tools::ToolRegistry;
