//! Monitoring/Health aggregation (spec §4.11, C11).
//!
//! `oneagent-mcp::transport::health::McpHealthProvider` already covers
//! C3/C4/C5 (sessions, tools). This wraps it with the C8/C9 counters that
//! only `oneagent` knows about, so `/health`, `/health/sessions`, and
//! `/metrics` report one consistent picture regardless of which crate
//! owns the underlying state.

use std::sync::Arc;

use async_trait::async_trait;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde_json::json;

use oneagent_mcp::transport::HealthProvider;

use crate::agent::{AgentFilter, AgentRegistry};

/// Installs the process-wide Prometheus recorder (spec's Ambient stack:
/// metrics exposition). Call exactly once from `main`; tests should build
/// a local, non-installed recorder instead (see `test_handle`).
pub fn install_prometheus_recorder() -> anyhow::Result<PrometheusHandle> {
    Ok(PrometheusBuilder::new().install_recorder()?)
}

/// Builds a recorder without installing it globally, for use in tests
/// that construct a [`CombinedHealthProvider`] without racing other
/// parallel tests over the global recorder slot.
pub fn test_handle() -> PrometheusHandle {
    PrometheusBuilder::new().build_recorder().handle()
}

/// C9's own counters (messages sent/delivered/dropped) are recorded
/// directly through the `metrics` crate in `comms::service` and surface
/// via `metrics_text` below without this provider needing a handle to
/// the service itself.
pub struct CombinedHealthProvider {
    pub mcp: Arc<dyn HealthProvider>,
    pub agents: Arc<AgentRegistry>,
    pub prometheus: PrometheusHandle,
}

#[async_trait]
impl HealthProvider for CombinedHealthProvider {
    async fn health(&self) -> serde_json::Value {
        self.mcp.health().await
    }

    async fn session_health(&self) -> serde_json::Value {
        let mcp = self.mcp.session_health().await;
        let online = self.agents.discover(AgentFilter { capability: None, status: Some(crate::agent::AgentStatus::Online) }).await;
        let total_agents = self.agents.discover(AgentFilter::default()).await;
        json!({
            "mcp": mcp,
            "agents": {
                "online": online.map(|a| a.len()).unwrap_or(0),
                "total": total_agents.map(|a| a.len()).unwrap_or(0),
            },
        })
    }

    fn metrics_text(&self) -> String {
        self.prometheus.render()
    }
}
