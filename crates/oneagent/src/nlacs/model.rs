//! NLACS records (spec §3 `ConversationThread / EmergentInsight`, §4.10).

use serde::{Deserialize, Serialize};

use oneagent_mcp::backbone::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightType {
    Pattern,
    Synthesis,
    Breakthrough,
    Connection,
    Optimization,
    Risk,
    Opportunity,
}

/// Groups a subset of a C9 `ConversationSession`'s participants around a
/// topic; NLACS never mutates the underlying session (spec §4.10 invariant i).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationThread {
    pub id: String,
    pub session_id: String,
    pub participants: Vec<String>,
    pub topic: String,
    pub created_at: Timestamp,
}

/// spec §3 `EmergentInsight`. Immutable once stored; a revision is a new
/// record whose `supersedes` references the prior one (invariant ii).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmergentInsight {
    pub id: String,
    pub thread_id: String,
    pub insight_type: InsightType,
    pub content: String,
    pub confidence: f64,
    pub contributors: Vec<String>,
    pub source_message_ids: Vec<String>,
    pub relevance_score: f64,
    pub created_at: Timestamp,
    pub supersedes: Option<String>,
}

/// What an [`InsightStrategy`](super::insights::InsightStrategy) proposes;
/// the layer stamps on `id`/`thread_id`/`created_at` before persisting.
#[derive(Debug, Clone)]
pub struct ExtractedInsight {
    pub insight_type: InsightType,
    pub content: String,
    pub confidence: f64,
    pub contributors: Vec<String>,
    pub source_message_ids: Vec<String>,
    pub relevance_score: f64,
}

/// spec §4.10.2 `synthesize(threadIds, question) → SynthesizedInsight`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesizedInsight {
    pub id: String,
    pub question: String,
    pub thread_ids: Vec<String>,
    pub content: String,
    pub supporting_insight_ids: Vec<String>,
    pub confidence: f64,
    pub created_at: Timestamp,
}

/// spec §4.10.3 `ConsensusResult`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusResult {
    pub topic: String,
    pub supporting: Vec<String>,
    pub objecting: Vec<String>,
    pub neutral: Vec<String>,
    pub compromises: Vec<String>,
    pub quality_score: f64,
}
