//! Origin Validator (spec §4.2, C2) — pattern-matches `Origin` headers to
//! block DNS-rebinding attacks against the local MCP server.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::backbone::Cache;

/// One allow-listed pattern. Exact strings and wildcard hostports are the
/// common case; protocol prefixes (`file://`, `vscode-webview://`) cover
/// embedding contexts that don't send a conventional `scheme://host:port`.
#[derive(Debug, Clone)]
pub enum OriginPattern {
    Exact(String),
    /// `*` matches exactly one label or port segment, e.g. `http://localhost:*`.
    Wildcard(String),
    ProtocolPrefix(String),
}

impl OriginPattern {
    pub fn parse(raw: &str) -> Self {
        if let Some(prefix) = raw.strip_suffix("://*") {
            return OriginPattern::ProtocolPrefix(format!("{prefix}://"));
        }
        if raw.contains('*') {
            OriginPattern::Wildcard(raw.to_string())
        } else {
            OriginPattern::Exact(raw.to_string())
        }
    }

    fn matches(&self, origin: &str) -> bool {
        match self {
            OriginPattern::Exact(pat) => pat == origin,
            OriginPattern::ProtocolPrefix(prefix) => origin.starts_with(prefix.as_str()),
            OriginPattern::Wildcard(pat) => wildcard_match(pat, origin),
        }
    }
}

/// Single-label/port wildcard match: `*` stands in for exactly one dot- or
/// colon-delimited segment, never a whole subtree.
fn wildcard_match(pattern: &str, origin: &str) -> bool {
    let pat_parts: Vec<&str> = split_segments(pattern);
    let origin_parts: Vec<&str> = split_segments(origin);
    if pat_parts.len() != origin_parts.len() {
        return false;
    }
    pat_parts
        .iter()
        .zip(origin_parts.iter())
        .all(|(p, o)| *p == "*" || p == o)
}

fn split_segments(s: &str) -> Vec<&str> {
    s.split(|c| c == '.' || c == ':' || c == '/')
        .filter(|seg| !seg.is_empty())
        .collect()
}

#[derive(Debug, Clone)]
pub struct OriginValidatorConfig {
    pub allowed_patterns: Vec<String>,
    pub allow_localhost: bool,
    pub allow_file_protocol: bool,
    pub allow_vscode_webview: bool,
    pub require_origin_header: bool,
    pub log_unauthorized_attempts: bool,
}

impl Default for OriginValidatorConfig {
    fn default() -> Self {
        Self {
            allowed_patterns: Vec::new(),
            allow_localhost: true,
            allow_file_protocol: false,
            allow_vscode_webview: false,
            require_origin_header: false,
            log_unauthorized_attempts: true,
        }
    }
}

/// Outcome of [`OriginValidator::validate`]. Serializable so transports can
/// fold it directly into a `403` error body's `data` field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationResult {
    pub allowed: bool,
    pub reason: String,
    pub matched_pattern: Option<String>,
}

pub struct OriginValidator {
    patterns: Vec<(String, OriginPattern)>,
    config: OriginValidatorConfig,
    cache: Arc<dyn Cache>,
}

const LOCALHOST_PATTERNS: &[&str] = &[
    "http://localhost:*",
    "http://127.0.0.1:*",
    "https://localhost:*",
    "https://127.0.0.1:*",
];

impl OriginValidator {
    pub fn new(config: OriginValidatorConfig, cache: Arc<dyn Cache>) -> Self {
        let mut raw_patterns = config.allowed_patterns.clone();
        if config.allow_localhost {
            raw_patterns.extend(LOCALHOST_PATTERNS.iter().map(|s| s.to_string()));
        }
        if config.allow_file_protocol {
            raw_patterns.push("file://*".to_string());
        }
        if config.allow_vscode_webview {
            raw_patterns.push("vscode-webview://*".to_string());
        }
        let patterns = raw_patterns
            .iter()
            .map(|raw| (raw.clone(), OriginPattern::parse(raw)))
            .collect();
        Self {
            patterns,
            config,
            cache,
        }
    }

    /// Pure matcher: `validate(o) == validate(o)` for identical inputs
    /// (spec §8 round-trip law), aside from the side-effecting counter bump
    /// performed by the caller.
    pub fn validate(&self, origin: Option<&str>) -> ValidationResult {
        let origin = match origin {
            Some(o) => o,
            None => {
                return if self.config.require_origin_header {
                    ValidationResult {
                        allowed: false,
                        reason: "origin_required".to_string(),
                        matched_pattern: None,
                    }
                } else {
                    ValidationResult {
                        allowed: true,
                        reason: "origin_header_not_required".to_string(),
                        matched_pattern: None,
                    }
                };
            }
        };

        // Exact match first, then wildcard, then protocol prefix — in that
        // declared precedence order, independent of insertion order.
        for (raw, pattern) in &self.patterns {
            if matches!(pattern, OriginPattern::Exact(_)) && pattern.matches(origin) {
                return ValidationResult {
                    allowed: true,
                    reason: "exact_match".to_string(),
                    matched_pattern: Some(raw.clone()),
                };
            }
        }
        for (raw, pattern) in &self.patterns {
            if matches!(pattern, OriginPattern::Wildcard(_)) && pattern.matches(origin) {
                return ValidationResult {
                    allowed: true,
                    reason: "wildcard_match".to_string(),
                    matched_pattern: Some(raw.clone()),
                };
            }
        }
        for (raw, pattern) in &self.patterns {
            if matches!(pattern, OriginPattern::ProtocolPrefix(_)) && pattern.matches(origin) {
                return ValidationResult {
                    allowed: true,
                    reason: "protocol_prefix_match".to_string(),
                    matched_pattern: Some(raw.clone()),
                };
            }
        }

        ValidationResult {
            allowed: false,
            reason: "origin_blocked".to_string(),
            matched_pattern: None,
        }
    }

    /// Validates and, on rejection, bumps the shared unauthorized-attempt
    /// counter and logs a structured warning (spec §4.2 side effects).
    pub async fn validate_and_record(&self, origin: Option<&str>) -> ValidationResult {
        let result = self.validate(origin);
        if !result.allowed {
            if self.config.log_unauthorized_attempts {
                warn!(origin = origin.unwrap_or("<missing>"), reason = %result.reason, "unauthorized origin");
            }
            let _ = self
                .cache
                .update_if(
                    "origin:unauthorized_attempts",
                    Box::new(|cur| {
                        let n = cur.and_then(|v| v.as_u64()).unwrap_or(0);
                        Some(serde_json::json!(n + 1))
                    }),
                )
                .await;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backbone::InProcessCache;
    use crate::backbone::SystemClock;
    use std::sync::Arc;

    fn validator(cfg: OriginValidatorConfig) -> OriginValidator {
        let cache: Arc<dyn Cache> = Arc::new(InProcessCache::new(Arc::new(SystemClock)));
        OriginValidator::new(cfg, cache)
    }

    #[test]
    fn allows_localhost_by_default() {
        let v = validator(OriginValidatorConfig::default());
        assert!(v.validate(Some("http://localhost:3000")).allowed);
    }

    #[test]
    fn blocks_unlisted_origin() {
        let v = validator(OriginValidatorConfig::default());
        let result = v.validate(Some("http://evil.com"));
        assert!(!result.allowed);
        assert_eq!(result.reason, "origin_blocked");
    }

    #[test]
    fn missing_origin_allowed_when_not_required() {
        let v = validator(OriginValidatorConfig::default());
        assert!(v.validate(None).allowed);
    }

    #[test]
    fn missing_origin_rejected_when_required() {
        let mut cfg = OriginValidatorConfig::default();
        cfg.require_origin_header = true;
        let v = validator(cfg);
        let result = v.validate(None);
        assert!(!result.allowed);
        assert_eq!(result.reason, "origin_required");
    }

    #[test]
    fn validate_is_pure() {
        let v = validator(OriginValidatorConfig::default());
        assert_eq!(
            v.validate(Some("http://evil.com")),
            v.validate(Some("http://evil.com"))
        );
    }

    #[test]
    fn protocol_prefix_matches_vscode_webview() {
        let mut cfg = OriginValidatorConfig::default();
        cfg.allow_vscode_webview = true;
        let v = validator(cfg);
        assert!(v
            .validate(Some("vscode-webview://abc123/index.html"))
            .allowed);
    }
}
