//! Tool Registry (C5) — spec §4.5.

pub mod model;
pub mod registry;

pub use model::{RegisteredTool, ToolDescriptor, ToolHandler};
pub use registry::{ToolFilter, ToolRegistry};
