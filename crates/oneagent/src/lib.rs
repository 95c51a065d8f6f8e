//! oneagent — multi-agent orchestration on top of the `oneagent-mcp`
//! coordination substrate.
//!
//! This crate owns the components `oneagent-mcp` deliberately knows
//! nothing about: the Agent Registry (C8), the Communication Service
//! (C9), the NLACS layer (C10), and the combined Monitoring surface
//! (C11). `main.rs` wires all of it together with the MCP transports.

pub mod agent;
pub mod comms;
pub mod config;
pub mod error;
pub mod events;
pub mod external;
pub mod monitoring;
pub mod nlacs;

pub use config::Config;
