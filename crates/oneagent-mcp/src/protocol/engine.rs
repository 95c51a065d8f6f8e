//! MCP Protocol Engine (spec §4.6, C6) — JSON-RPC framing and the MCP
//! 2025-06-18 method surface. Transport-agnostic: [`Engine::handle`] takes a
//! request and a session context and produces a response frame plus any
//! server-initiated frames a streaming handler chose to emit; the caller
//! (an HTTP or stdio transport) decides how to deliver those.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::debug;

use crate::session::{mask_session_id, Event, EventType, SessionManager};
use crate::tools::ToolRegistry;

use super::error::ProtocolError;
use super::jsonrpc::{JsonRpcErrorBody, JsonRpcRequest, JsonRpcResponse, RequestId};

pub const PROTOCOL_VERSION: &str = "2025-06-18";

/// Carries the session this request is bound to (if any) plus the stream id
/// the response should be persisted under for resumability (spec §4.6
/// ordering guarantee: events are persisted before being written out).
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub session_id: Option<String>,
    pub stream_id: String,
}

impl RequestContext {
    pub fn new(session_id: Option<String>, stream_id: impl Into<String>) -> Self {
        Self {
            session_id,
            stream_id: stream_id.into(),
        }
    }
}

pub struct Engine {
    pub sessions: Arc<SessionManager>,
    pub tools: Arc<ToolRegistry>,
    pub server_name: &'static str,
}

impl Engine {
    pub fn new(sessions: Arc<SessionManager>, tools: Arc<ToolRegistry>) -> Self {
        Self {
            sessions,
            tools,
            server_name: "OneAgent",
        }
    }

    /// Dispatches one JSON-RPC request to its method handler, persists the
    /// resulting frame as an event (serialization point per spec §4.6), and
    /// returns the response for the transport to deliver.
    pub async fn handle(&self, request: JsonRpcRequest, ctx: &RequestContext) -> JsonRpcResponse {
        self.handle_traced(request, ctx).await.0
    }

    /// As [`Self::handle`], but also returns the persisted [`Event`] so the
    /// HTTP transport can frame it as `id: <eventId>` on an SSE stream
    /// (spec §6 SSE framing).
    pub async fn handle_traced(
        &self,
        request: JsonRpcRequest,
        ctx: &RequestContext,
    ) -> (JsonRpcResponse, Option<Event>) {
        let id = request.id.clone();
        let result = self.dispatch(&request, ctx).await;
        let response = match result {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(err) => JsonRpcResponse::error(id, to_error_body(&err)),
        };

        let mut persisted = None;
        if let Some(session_id) = &ctx.session_id {
            let payload = serde_json::to_value(&response).unwrap_or(Value::Null);
            match self
                .sessions
                .add_event(session_id, &ctx.stream_id, payload, EventType::Response)
                .await
            {
                Ok(event) => persisted = Some(event),
                Err(e) => tracing::warn!(
                    session_id = %mask_session_id(session_id),
                    error = %e,
                    "failed to persist response event"
                ),
            }
        }
        (response, persisted)
    }

    async fn dispatch(&self, request: &JsonRpcRequest, ctx: &RequestContext) -> Result<Value, ProtocolError> {
        match request.method.as_str() {
            "initialize" => {
                self.handle_initialize(request.params.clone(), ctx.session_id.as_deref())
                    .await
            }
            "tools/list" => self.handle_tools_list().await,
            "tools/call" => self.handle_tools_call(request.params.clone()).await,
            "resources/list" => Ok(json!({ "resources": [] })),
            "resources/read" => Err(ProtocolError::InvalidParams(
                "no resources registered".to_string(),
            )),
            "prompts/list" => Ok(json!({ "prompts": [] })),
            "prompts/get" => Err(ProtocolError::InvalidParams(
                "no prompts registered".to_string(),
            )),
            "shutdown" => Ok(json!(null)),
            "ping" => Ok(json!({})),
            other => Err(ProtocolError::MethodNotFound(other.to_string())),
        }
    }

    /// Issues a session via the manager (spec §4.6): the returned id is
    /// echoed both in the JSON body (for stdio, which has no headers) and by
    /// the HTTP transport via `Mcp-Session-Id`. When `existing_session_id`
    /// is already bound (the stdio adapter's implicit session), the
    /// handshake updates that session in place instead of minting a second
    /// one — the transport, not this method, owns session creation there.
    async fn handle_initialize(
        &self,
        params: Option<Value>,
        existing_session_id: Option<&str>,
    ) -> Result<Value, ProtocolError> {
        let params = params.unwrap_or(json!({}));
        let requested_version = params
            .get("protocolVersion")
            .and_then(|v| v.as_str())
            .unwrap_or(PROTOCOL_VERSION)
            .to_string();
        let client_id = params
            .get("clientInfo")
            .and_then(|c| c.get("name"))
            .and_then(|n| n.as_str())
            .unwrap_or("unknown-client")
            .to_string();
        let capabilities = params.get("capabilities").cloned().unwrap_or(json!({}));

        let session = match existing_session_id {
            Some(id) => {
                self.sessions
                    .reinitialize(id, client_id, requested_version.clone(), capabilities.clone())
                    .await?
            }
            None => {
                self.sessions
                    .create(client_id, None, requested_version.clone(), capabilities.clone(), HashMap::new())
                    .await?
            }
        };

        debug!(session_id = %mask_session_id(&session.id), "session initialized");

        Ok(json!({
            "protocolVersion": requested_version,
            "capabilities": {
                "tools": { "listChanged": false },
                "resources": { "listChanged": false },
                "prompts": { "listChanged": false },
            },
            "serverInfo": {
                "name": self.server_name,
                "version": env!("CARGO_PKG_VERSION"),
            },
            "sessionId": session.id,
        }))
    }

    async fn handle_tools_list(&self) -> Result<Value, ProtocolError> {
        let tools = self.tools.list(None).await?;
        Ok(json!({ "tools": tools, "nextCursor": Value::Null }))
    }

    /// Validates `arguments` against the tool's declared `inputSchema`
    /// before the handler ever sees them (spec §4.5 Invoke, §9 "schema
    /// validation at the edge") — a malformed call never reaches a handler.
    async fn handle_tools_call(&self, params: Option<Value>) -> Result<Value, ProtocolError> {
        let params = params.ok_or_else(|| ProtocolError::InvalidParams("missing params".to_string()))?;
        let name = params
            .get("name")
            .and_then(|n| n.as_str())
            .ok_or_else(|| ProtocolError::InvalidParams("missing tool name".to_string()))?;
        let arguments = params.get("arguments").cloned().unwrap_or(json!({}));

        let descriptor = self
            .tools
            .get(name)
            .await?
            .ok_or_else(|| ProtocolError::MethodNotFound(name.to_string()))?;
        jsonschema::validate(&descriptor.input_schema, &arguments)
            .map_err(|e| ProtocolError::InvalidParams(format!("{name}: {e}")))?;

        let output = self.tools.invoke(name, arguments).await?;
        Ok(json!({
            "content": [{ "type": "text", "text": output.to_string() }],
            "isError": false,
        }))
    }
}

fn to_error_body(err: &ProtocolError) -> JsonRpcErrorBody {
    JsonRpcErrorBody {
        code: err.jsonrpc_code(),
        message: err.to_string(),
        data: Some(json!({ "kind": err.kind(), "retryable": err.retryable() })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backbone::Backbone;
    use crate::session::{CacheEventLog, CacheSessionStorage, SessionManagerConfig};

    fn engine() -> Engine {
        let backbone = Backbone::in_process();
        let storage = Arc::new(CacheSessionStorage::new(backbone.cache.clone()));
        let events = Arc::new(CacheEventLog::new(
            backbone.cache.clone(),
            backbone.clock.clone(),
            backbone.ids.clone(),
            1000,
        ));
        let sessions = Arc::new(SessionManager::new(backbone.clone(), storage, events, SessionManagerConfig::default()));
        let tools = Arc::new(ToolRegistry::new(backbone));
        Engine::new(sessions, tools)
    }

    #[tokio::test]
    async fn initialize_returns_session_id_and_echoes_protocol_version() {
        let engine = engine();
        let req = JsonRpcRequest::new(
            RequestId::Number(1),
            "initialize",
            Some(json!({"protocolVersion": PROTOCOL_VERSION, "capabilities": {}, "clientInfo": {"name": "test"}})),
        );
        let ctx = RequestContext::new(None, "default");
        let resp = engine.handle(req, &ctx).await;
        let result = resp.result.unwrap();
        assert_eq!(result["protocolVersion"], PROTOCOL_VERSION);
        assert!(result["sessionId"].as_str().is_some());
    }

    #[tokio::test]
    async fn unknown_method_is_method_not_found() {
        let engine = engine();
        let req = JsonRpcRequest::new(RequestId::Number(1), "no/such/method", None);
        let ctx = RequestContext::new(None, "default");
        let resp = engine.handle(req, &ctx).await;
        assert_eq!(resp.error.unwrap().code, -32601);
    }

    #[tokio::test]
    async fn tools_list_includes_registered_tool() {
        let engine = engine();
        engine
            .tools
            .register(
                crate::tools::ToolDescriptor {
                    name: "system_health".to_string(),
                    description: "reports health".to_string(),
                    input_schema: json!({"type": "object"}),
                    output_schema: None,
                    category: "diagnostics".to_string(),
                    priority: 0,
                    registered_at: chrono::Utc::now(),
                },
                Arc::new(|_args: Value| async move { Ok(json!({"status": "ok"})) }),
            )
            .await
            .unwrap();

        let req = JsonRpcRequest::new(RequestId::Number(2), "tools/list", None);
        let ctx = RequestContext::new(None, "default");
        let resp = engine.handle(req, &ctx).await;
        let result = resp.result.unwrap();
        let names: Vec<&str> = result["tools"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();
        assert!(names.contains(&"system_health"));
    }

    fn counting_tool_descriptor() -> crate::tools::ToolDescriptor {
        crate::tools::ToolDescriptor {
            name: "echo".to_string(),
            description: "echoes the given count".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": { "count": { "type": "integer" } },
                "required": ["count"],
            }),
            output_schema: None,
            category: "diagnostics".to_string(),
            priority: 0,
            registered_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn tools_call_with_valid_arguments_invokes_handler() {
        let engine = engine();
        engine
            .tools
            .register(
                counting_tool_descriptor(),
                Arc::new(|args: Value| async move { Ok(args) }),
            )
            .await
            .unwrap();

        let req = JsonRpcRequest::new(
            RequestId::Number(1),
            "tools/call",
            Some(json!({ "name": "echo", "arguments": { "count": 3 } })),
        );
        let ctx = RequestContext::new(None, "default");
        let resp = engine.handle(req, &ctx).await;
        let result = resp.result.unwrap();
        assert_eq!(result["isError"], false);
    }

    #[tokio::test]
    async fn tools_call_with_arguments_violating_schema_is_invalid_params() {
        let engine = engine();
        engine
            .tools
            .register(
                counting_tool_descriptor(),
                Arc::new(|args: Value| async move { Ok(args) }),
            )
            .await
            .unwrap();

        let req = JsonRpcRequest::new(
            RequestId::Number(1),
            "tools/call",
            Some(json!({ "name": "echo", "arguments": { "count": "not-a-number" } })),
        );
        let ctx = RequestContext::new(None, "default");
        let resp = engine.handle(req, &ctx).await;
        let error = resp.error.unwrap();
        assert_eq!(error.code, -32602);
    }

    #[tokio::test]
    async fn tools_call_against_unregistered_name_is_method_not_found() {
        let engine = engine();
        let req = JsonRpcRequest::new(
            RequestId::Number(1),
            "tools/call",
            Some(json!({ "name": "nope", "arguments": {} })),
        );
        let ctx = RequestContext::new(None, "default");
        let resp = engine.handle(req, &ctx).await;
        assert_eq!(resp.error.unwrap().code, -32601);
    }
}
