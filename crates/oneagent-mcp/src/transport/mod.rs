//! Transport Adapters (spec §4.7, C7) — HTTP+SSE and stdio, both converging
//! on the same in-process [`crate::protocol::Engine`] so tools, agents, and
//! sessions are indistinguishable across transports.

pub mod health;
pub mod http;
pub mod stdio;

pub use health::{HealthProvider, McpHealthProvider};
pub use http::{router, serve_http, HttpServerConfig};
pub use stdio::run_stdio;
