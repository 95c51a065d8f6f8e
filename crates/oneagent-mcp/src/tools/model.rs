//! ToolDescriptor (spec §3, §4.5).

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::backbone::Timestamp;
use crate::protocol::ProtocolError;

/// Executable body of a registered tool. Transport-agnostic: the same
/// handler runs whether it was invoked over HTTP+SSE or stdio (spec §4.5b).
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn invoke(&self, args: serde_json::Value) -> Result<serde_json::Value, ProtocolError>;
}

#[async_trait]
impl<F, Fut> ToolHandler for F
where
    F: Fn(serde_json::Value) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<serde_json::Value, ProtocolError>> + Send,
{
    async fn invoke(&self, args: serde_json::Value) -> Result<serde_json::Value, ProtocolError> {
        (self)(args).await
    }
}

/// Serializable half of a tool descriptor — what `tools/list` returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<serde_json::Value>,
    pub category: String,
    pub priority: i32,
    pub registered_at: Timestamp,
}

/// A descriptor plus its (non-serializable) handler, as stored in the
/// registry's in-process handler table. The descriptor half is mirrored into
/// the cache at `mcp:tool:{name}` for catalog durability/inspection; the
/// handler itself cannot cross a cache boundary and lives only in-process.
#[derive(Clone)]
pub struct RegisteredTool {
    pub descriptor: ToolDescriptor,
    pub handler: Arc<dyn ToolHandler>,
}
