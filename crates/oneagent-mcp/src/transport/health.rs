//! Health/metrics projections (spec §4.11, C11) exposed by the HTTP
//! transport. `oneagent-mcp` only knows about sessions and tools; `oneagent`
//! wraps [`McpHealthProvider`] in a provider that also folds in agent
//! registry and communication service counters (C8/C9) before handing the
//! combined object to [`super::http::serve_http`].

use async_trait::async_trait;
use serde_json::json;

use crate::session::SessionManager;
use crate::tools::ToolRegistry;

/// Aggregated health/metrics surface (spec §6 `GET /health`,
/// `GET /health/sessions`, `GET /metrics`). Implemented once per binary so
/// every transport serves identical numbers regardless of how a request
/// arrived.
#[async_trait]
pub trait HealthProvider: Send + Sync {
    /// `GET /health` — liveness JSON.
    async fn health(&self) -> serde_json::Value;

    /// `GET /health/sessions` — session/event metrics JSON.
    async fn session_health(&self) -> serde_json::Value;

    /// `GET /metrics` — Prometheus exposition text. The default recorder is
    /// installed once at process start (see `oneagent::monitoring`); this
    /// just renders whatever it has accumulated.
    fn metrics_text(&self) -> String;
}

/// Base provider covering C3/C4/C5. `oneagent` composes this with its own
/// C8/C9 counters rather than duplicating the session/tool logic.
pub struct McpHealthProvider {
    pub sessions: std::sync::Arc<SessionManager>,
    pub tools: std::sync::Arc<ToolRegistry>,
    pub prometheus: metrics_exporter_prometheus::PrometheusHandle,
}

#[async_trait]
impl HealthProvider for McpHealthProvider {
    async fn health(&self) -> serde_json::Value {
        json!({ "status": "ok", "server": "OneAgent", "version": env!("CARGO_PKG_VERSION") })
    }

    async fn session_health(&self) -> serde_json::Value {
        match self.sessions.metrics().await {
            Ok(metrics) => serde_json::to_value(metrics).unwrap_or(json!({})),
            Err(e) => json!({ "error": e.to_string() }),
        }
    }

    fn metrics_text(&self) -> String {
        self.prometheus.render()
    }
}
