//! Agent record (spec §3, §4.8).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use oneagent_mcp::backbone::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Online,
    Offline,
    Busy,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Online => "online",
            AgentStatus::Offline => "offline",
            AgentStatus::Busy => "busy",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub status: AgentStatus,
    pub response_time_ms: f64,
    pub error_rate: f64,
    pub queue_size: u64,
    pub uptime_seconds: u64,
    pub last_activity: Timestamp,
}

impl HealthSnapshot {
    pub fn initial(at: Timestamp) -> Self {
        Self {
            status: AgentStatus::Online,
            response_time_ms: 0.0,
            error_rate: 0.0,
            queue_size: 0,
            uptime_seconds: 0,
            last_activity: at,
        }
    }
}

/// A known participant in the communication service (spec §3 `Agent`).
/// Invariant: at most one agent per id; re-registering an existing id
/// updates it in place (last-write-wins, spec §4.8).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub name: String,
    pub capabilities: Vec<String>,
    pub status: AgentStatus,
    pub health: HealthSnapshot,
    pub registered_at: Timestamp,
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Caller-supplied half of a registration; the registry fills in `id` (if
/// absent), `health`, and `registered_at`.
#[derive(Debug, Clone, Default)]
pub struct AgentRegistration {
    pub id: Option<String>,
    pub name: String,
    pub capabilities: Vec<String>,
    pub metadata: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default)]
pub struct AgentFilter {
    pub capability: Option<String>,
    pub status: Option<AgentStatus>,
}

impl AgentFilter {
    pub fn matches(&self, agent: &Agent) -> bool {
        if let Some(cap) = &self.capability {
            if !agent.capabilities.iter().any(|c| c == cap) {
                return false;
            }
        }
        if let Some(status) = self.status {
            if agent.status != status {
                return false;
            }
        }
        true
    }
}
