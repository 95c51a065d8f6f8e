//! Conversation session and message records (spec §3 `ConversationSession`,
//! `Message`).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use oneagent_mcp::backbone::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    Collaborative,
    Competitive,
    Hierarchical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Inactive,
    Concluded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Update,
    Question,
    Decision,
    Action,
    Insight,
}

/// A bounded multi-agent exchange (spec §3 `ConversationSession (A2A)`).
/// Invariant: only listed `participants` may send messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSession {
    pub id: String,
    pub name: String,
    pub participants: Vec<String>,
    pub mode: SessionMode,
    pub topic: String,
    pub status: SessionStatus,
    pub created_at: Timestamp,
    pub nlacs_enabled: bool,
}

impl ConversationSession {
    pub fn has_participant(&self, agent_id: &str) -> bool {
        self.participants.iter().any(|p| p == agent_id)
    }
}

/// Caller-supplied configuration for `CreateSession` (spec §4.9).
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub name: String,
    pub participants: Vec<String>,
    pub mode: SessionMode,
    pub topic: String,
    pub nlacs_enabled: bool,
}

/// One exchange inside a session (spec §3 `Message`). `sequence` is
/// server-assigned at enqueue and establishes per-session FIFO order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub session_id: String,
    pub from_agent: String,
    pub to_agent: Option<String>,
    pub content: String,
    pub message_type: MessageType,
    pub timestamp: Timestamp,
    pub sequence: u64,
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Caller-supplied half of `SendMessage`/`BroadcastMessage`; the service
/// fills in `id`, `sequence`, and `timestamp`.
#[derive(Debug, Clone)]
pub struct OutgoingMessage {
    pub session_id: String,
    pub from_agent: String,
    pub to_agent: Option<String>,
    pub content: String,
    pub message_type: MessageType,
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Hard content-length boundary enforced by `SendMessage`/`BroadcastMessage`.
pub const MAX_MESSAGE_CONTENT_CHARS: usize = 10_000;
