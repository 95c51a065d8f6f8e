//! Tool Registry (spec §4.5, C5) — canonical catalog backed by the cache.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::RwLock;

use metrics::{counter, histogram};
use tracing::info;

use crate::backbone::{Backbone, CacheExt, Namespace};
use crate::protocol::ProtocolError;

use super::model::{RegisteredTool, ToolDescriptor, ToolHandler};

const TOOL_PREFIX: &str = "mcp:tool:";
const TOOL_NAMES_KEY: &str = "mcp:tool-names";

#[derive(Debug, Clone, Default)]
pub struct ToolFilter {
    pub category: Option<String>,
    pub name_contains: Option<String>,
}

impl ToolFilter {
    fn matches(&self, descriptor: &ToolDescriptor) -> bool {
        if let Some(cat) = &self.category {
            if &descriptor.category != cat {
                return false;
            }
        }
        if let Some(needle) = &self.name_contains {
            if !descriptor.name.contains(needle.as_str()) {
                return false;
            }
        }
        true
    }
}

/// Catalog of registered tools. Handlers live only in-process (behind
/// `RwLock<HashMap<..>>`, the one exception §4.1 grants to in-process state
/// that cannot be serialized into the shared cache); descriptors are
/// mirrored into the cache so `tools/list` reflects the durable catalog even
/// across a registry restart backed by a distributed cache.
pub struct ToolRegistry {
    ns: Namespace,
    handlers: RwLock<HashMap<String, Arc<dyn ToolHandler>>>,
    backbone: Backbone,
}

impl ToolRegistry {
    pub fn new(backbone: Backbone) -> Self {
        Self {
            ns: backbone.namespace(TOOL_PREFIX),
            handlers: RwLock::new(HashMap::new()),
            backbone,
        }
    }

    /// Idempotent by name: re-registering with an identical schema is a
    /// no-op; a different schema under the same name is `schema_conflict`
    /// (spec §4.5).
    pub async fn register(
        &self,
        mut descriptor: ToolDescriptor,
        handler: Arc<dyn ToolHandler>,
    ) -> Result<(), ProtocolError> {
        if let Some(existing) = self.ns.get_typed::<ToolDescriptor>(&descriptor.name).await? {
            if existing.input_schema != descriptor.input_schema
                || existing.output_schema != descriptor.output_schema
            {
                return Err(ProtocolError::SchemaConflict(descriptor.name));
            }
            self.handlers
                .write()
                .unwrap()
                .insert(descriptor.name.clone(), handler);
            return Ok(());
        }

        descriptor.registered_at = self.backbone.clock.now();
        self.ns
            .set_typed(&descriptor.name, &descriptor, None)
            .await?;
        self.backbone
            .cache
            .update_if(
                TOOL_NAMES_KEY,
                Box::new({
                    let name = descriptor.name.clone();
                    move |cur| {
                        let mut names: Vec<String> = cur
                            .and_then(|v| serde_json::from_value(v).ok())
                            .unwrap_or_default();
                        if !names.contains(&name) {
                            names.push(name);
                        }
                        Some(serde_json::to_value(names).unwrap())
                    }
                }),
            )
            .await?;
        self.handlers
            .write()
            .unwrap()
            .insert(descriptor.name.clone(), handler);
        counter!("oneagent_tools_registered_total").increment(1);
        Ok(())
    }

    /// Registers a batch with a single aggregate log line — stdio
    /// initialization is bounded by the client handshake timeout (spec §4.5
    /// performance contract: O(1) logging, not O(tools)).
    pub async fn register_all(
        &self,
        tools: Vec<(ToolDescriptor, Arc<dyn ToolHandler>)>,
    ) -> Result<(), ProtocolError> {
        let count = tools.len();
        for (descriptor, handler) in tools {
            self.register(descriptor, handler).await?;
        }
        info!(count, "tool registry initialized");
        Ok(())
    }

    pub async fn get(&self, name: &str) -> Result<Option<ToolDescriptor>, ProtocolError> {
        Ok(self.ns.get_typed(name).await?)
    }

    pub async fn list(&self, filter: Option<ToolFilter>) -> Result<Vec<ToolDescriptor>, ProtocolError> {
        let names: Vec<String> = self
            .backbone
            .cache
            .get_typed(TOOL_NAMES_KEY)
            .await?
            .unwrap_or_default();
        let mut out = Vec::with_capacity(names.len());
        for name in names {
            if let Some(descriptor) = self.ns.get_typed::<ToolDescriptor>(&name).await? {
                if filter.as_ref().map(|f| f.matches(&descriptor)).unwrap_or(true) {
                    out.push(descriptor);
                }
            }
        }
        out.sort_by_key(|d| std::cmp::Reverse(d.priority));
        Ok(out)
    }

    /// Runs on the same code path regardless of which transport dispatched
    /// the call (spec §4.5b).
    pub async fn invoke(
        &self,
        name: &str,
        args: serde_json::Value,
    ) -> Result<serde_json::Value, ProtocolError> {
        let handler = self
            .handlers
            .read()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| ProtocolError::MethodNotFound(name.to_string()))?;

        let start = std::time::Instant::now();
        let result = handler.invoke(args).await;
        histogram!("oneagent_tool_invoke_duration_seconds", "tool" => name.to_string())
            .record(start.elapsed().as_secs_f64());
        match &result {
            Ok(_) => counter!("oneagent_tool_invocations_total", "tool" => name.to_string(), "outcome" => "ok").increment(1),
            Err(_) => counter!("oneagent_tool_invocations_total", "tool" => name.to_string(), "outcome" => "error").increment(1),
        }
        result
    }
}
