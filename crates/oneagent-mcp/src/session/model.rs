//! Session and Event records (spec §3).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::backbone::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SessionState {
    Active,
    Expired,
    Terminated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub client_id: String,
    pub origin: Option<String>,
    pub protocol_version: String,
    pub capabilities: serde_json::Value,
    pub created_at: Timestamp,
    pub last_activity: Timestamp,
    pub expires_at: Timestamp,
    pub state: SessionState,
    /// Monotonically non-decreasing across the life of the session
    /// (spec §3 invariant c). Distinct from the per-(session,stream)
    /// sequence numbers tracked by the event log.
    pub event_counter: u64,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Session {
    pub fn is_live(&self, now: Timestamp) -> bool {
        self.state == SessionState::Active && now < self.expires_at
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Request,
    Response,
    Notification,
    Message,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub session_id: String,
    pub stream_id: String,
    pub sequence: u64,
    pub timestamp: Timestamp,
    pub payload: serde_json::Value,
    pub event_type: EventType,
}
