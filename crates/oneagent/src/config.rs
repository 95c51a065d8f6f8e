//! Centralized environment configuration (spec §6).
//!
//! The teacher reads individual `std::env::var` calls scattered across
//! `cli.rs`/`config.rs`/handlers; this rewrite centralizes every
//! `ONEAGENT_*` variable into one struct loaded once at startup so nothing
//! else in the crate calls `std::env::var` directly.

use std::time::Duration;

use serde::Serialize;

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u16(name: &str, default: u16) -> u16 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_bool(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(v) => matches!(v.as_str(), "1" | "true" | "TRUE" | "yes"),
        Err(_) => default,
    }
}

fn env_string(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_list(name: &str) -> Vec<String> {
    std::env::var(name)
        .map(|v| v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
        .unwrap_or_default()
}

/// Every `ONEAGENT_*` / `ONEAGENT_MCP_*` environment option from spec §6,
/// with the documented defaults.
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub mcp_port: u16,
    pub mcp_host: String,
    pub mcp_stdio_only: bool,

    pub session_timeout_ms: u64,
    pub session_cleanup_interval_ms: u64,
    pub event_log_ttl_ms: u64,
    pub max_events_per_session: u64,

    pub allowed_origins: Vec<String>,
    pub allow_localhost: bool,
    pub require_origin_header: bool,

    pub heartbeat_interval_ms: u64,
    pub heartbeat_timeout_ms: u64,
}

impl Config {
    /// Loads from the process environment; unset variables fall back to
    /// spec §6's documented defaults.
    pub fn from_env() -> Self {
        let heartbeat_interval_ms = env_u64("ONEAGENT_HEARTBEAT_INTERVAL_MS", 10_000);
        Self {
            mcp_port: env_u16("ONEAGENT_MCP_PORT", 8083),
            mcp_host: env_string("ONEAGENT_MCP_HOST", "0.0.0.0"),
            mcp_stdio_only: env_bool("ONEAGENT_MCP_STDIO_ONLY", false),

            session_timeout_ms: env_u64("ONEAGENT_MCP_SESSION_TIMEOUT_MS", 1_800_000),
            session_cleanup_interval_ms: env_u64("ONEAGENT_MCP_SESSION_CLEANUP_INTERVAL_MS", 300_000),
            event_log_ttl_ms: env_u64("ONEAGENT_MCP_EVENT_LOG_TTL_MS", 3_600_000),
            max_events_per_session: env_u64("ONEAGENT_MCP_MAX_EVENTS_PER_SESSION", 1000),

            allowed_origins: env_list("ONEAGENT_MCP_ALLOWED_ORIGINS"),
            allow_localhost: env_bool("ONEAGENT_MCP_ALLOW_LOCALHOST", true),
            require_origin_header: env_bool("ONEAGENT_MCP_REQUIRE_ORIGIN_HEADER", false),

            heartbeat_interval_ms,
            heartbeat_timeout_ms: env_u64("ONEAGENT_HEARTBEAT_TIMEOUT_MS", heartbeat_interval_ms * 3),
        }
    }

    pub fn session_idle_timeout(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.session_timeout_ms as i64)
    }

    pub fn session_cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.session_cleanup_interval_ms)
    }

    pub fn event_log_ttl(&self) -> Duration {
        Duration::from_millis(self.event_log_ttl_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
