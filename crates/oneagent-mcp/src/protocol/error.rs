//! Stable, transport-mapped error kinds (spec §7).
//!
//! Every error that can cross the engine boundary is one of these variants;
//! handlers never let a driver-specific error type (a cache backend error, a
//! JSON error) leak to a caller. [`ProtocolError::code`] and
//! [`ProtocolError::http_status`] give the two transports a single place to
//! look up how to surface a given kind.

use thiserror::Error;

use crate::backbone::BackboneError;

#[derive(Debug, Clone, Error)]
pub enum ProtocolError {
    #[error("parse error: {0}")]
    ParseError(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("method not found: {0}")]
    MethodNotFound(String),
    #[error("invalid params: {0}")]
    InvalidParams(String),
    #[error("origin blocked")]
    OriginBlocked,
    #[error("origin required")]
    OriginRequired,
    #[error("session not found")]
    SessionNotFound,
    #[error("session expired")]
    SessionExpired,
    #[error("sequence contention")]
    SequenceContention,
    #[error("queue full")]
    QueueFull,
    #[error("schema conflict: {0}")]
    SchemaConflict(String),
    #[error("llm unavailable")]
    LlmUnavailable,
    #[error("memory unavailable")]
    MemoryUnavailable,
    #[error("invalid confidence: {0}")]
    InvalidConfidence(f64),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ProtocolError {
    /// Stable string matching spec §7's `Kind` column, exposed to callers as
    /// `data.kind` so they can branch on it without parsing `message`.
    pub fn kind(&self) -> &'static str {
        match self {
            ProtocolError::ParseError(_) => "parse_error",
            ProtocolError::InvalidRequest(_) => "invalid_request",
            ProtocolError::MethodNotFound(_) => "method_not_found",
            ProtocolError::InvalidParams(_) => "invalid_params",
            ProtocolError::OriginBlocked => "origin_blocked",
            ProtocolError::OriginRequired => "origin_required",
            ProtocolError::SessionNotFound => "session_not_found",
            ProtocolError::SessionExpired => "session_expired",
            ProtocolError::SequenceContention => "sequence_contention",
            ProtocolError::QueueFull => "queue_full",
            ProtocolError::SchemaConflict(_) => "schema_conflict",
            ProtocolError::LlmUnavailable => "llm_unavailable",
            ProtocolError::MemoryUnavailable => "memory_unavailable",
            ProtocolError::InvalidConfidence(_) => "invalid_confidence",
            ProtocolError::Internal(_) => "internal",
        }
    }

    /// JSON-RPC numeric error code (spec §6/§7).
    pub fn jsonrpc_code(&self) -> i32 {
        match self {
            ProtocolError::ParseError(_) => -32700,
            ProtocolError::InvalidRequest(_) => -32600,
            ProtocolError::MethodNotFound(_) => -32601,
            ProtocolError::InvalidParams(_) => -32602,
            _ => -32603,
        }
    }

    /// `true` if a client may usefully retry the same request unchanged.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            ProtocolError::SequenceContention
                | ProtocolError::QueueFull
                | ProtocolError::LlmUnavailable
                | ProtocolError::MemoryUnavailable
        )
    }

    /// HTTP status for the kinds that carry one outside JSON-RPC's own
    /// error envelope (origin/session failures surface as real HTTP
    /// statuses per spec §6/§7, not just `-32603` bodies).
    pub fn http_status(&self) -> Option<u16> {
        match self {
            ProtocolError::OriginBlocked | ProtocolError::OriginRequired => Some(403),
            ProtocolError::SessionNotFound => Some(404),
            ProtocolError::SessionExpired => Some(410),
            _ => None,
        }
    }
}

impl From<BackboneError> for ProtocolError {
    fn from(e: BackboneError) -> Self {
        match e {
            BackboneError::NotFound(msg) if msg.contains("session") => ProtocolError::SessionNotFound,
            BackboneError::NotFound(msg) => ProtocolError::Internal(msg),
            BackboneError::Conflict(msg) if msg.contains("sequence") => ProtocolError::SequenceContention,
            BackboneError::Conflict(msg) => ProtocolError::Internal(msg),
            BackboneError::BackendUnavailable(msg) => ProtocolError::Internal(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_match_spec_table() {
        assert_eq!(ProtocolError::OriginBlocked.kind(), "origin_blocked");
        assert_eq!(ProtocolError::SessionExpired.kind(), "session_expired");
    }

    #[test]
    fn only_retryable_kinds_report_retryable() {
        assert!(ProtocolError::QueueFull.retryable());
        assert!(!ProtocolError::InvalidParams("x".into()).retryable());
    }

    #[test]
    fn session_http_statuses_match_spec() {
        assert_eq!(ProtocolError::SessionNotFound.http_status(), Some(404));
        assert_eq!(ProtocolError::SessionExpired.http_status(), Some(410));
        assert_eq!(ProtocolError::OriginBlocked.http_status(), Some(403));
    }
}
