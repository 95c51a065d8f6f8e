//! Stable error kinds for the agent registry, communication service, and
//! NLACS layer (spec §7), mirroring how `oneagent_mcp::protocol::ProtocolError`
//! is structured so the two crates' errors compose cleanly at the engine
//! boundary.

use oneagent_mcp::protocol::ProtocolError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum AgentError {
    #[error("agent not found: {0}")]
    NotFound(String),
    #[error("invalid capability filter: {0}")]
    InvalidFilter(String),
}

impl AgentError {
    pub fn kind(&self) -> &'static str {
        match self {
            AgentError::NotFound(_) => "session_not_found",
            AgentError::InvalidFilter(_) => "invalid_params",
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum CommsError {
    #[error("conversation session not found: {0}")]
    SessionNotFound(String),
    #[error("agent {0} is not a participant of this session")]
    NotParticipant(String),
    #[error("conversation session requires at least one participant")]
    NoParticipants,
    #[error("message content exceeds the 10000-character limit")]
    ContentTooLong,
    #[error("queue full")]
    QueueFull,
}

impl CommsError {
    pub fn kind(&self) -> &'static str {
        match self {
            CommsError::SessionNotFound(_) => "session_not_found",
            CommsError::NotParticipant(_) | CommsError::NoParticipants | CommsError::ContentTooLong => {
                "invalid_params"
            }
            CommsError::QueueFull => "queue_full",
        }
    }

    pub fn retryable(&self) -> bool {
        matches!(self, CommsError::QueueFull)
    }
}

impl From<CommsError> for ProtocolError {
    fn from(e: CommsError) -> Self {
        match e {
            CommsError::QueueFull => ProtocolError::QueueFull,
            CommsError::SessionNotFound(_) => ProtocolError::SessionNotFound,
            other => ProtocolError::InvalidParams(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum NlacsError {
    #[error("thread not found: {0}")]
    ThreadNotFound(String),
    #[error("insight not found: {0}")]
    InsightNotFound(String),
    #[error("invalid confidence: {0}")]
    InvalidConfidence(f64),
    #[error("contributors must be a subset of the thread's participants")]
    ContributorsOutsideThread,
}

impl NlacsError {
    pub fn kind(&self) -> &'static str {
        match self {
            NlacsError::ThreadNotFound(_) | NlacsError::InsightNotFound(_) => "session_not_found",
            NlacsError::InvalidConfidence(_) => "invalid_confidence",
            NlacsError::ContributorsOutsideThread => "invalid_params",
        }
    }
}

impl From<NlacsError> for ProtocolError {
    fn from(e: NlacsError) -> Self {
        match e {
            NlacsError::InvalidConfidence(c) => ProtocolError::InvalidConfidence(c),
            other => ProtocolError::InvalidParams(other.to_string()),
        }
    }
}
