//! Insight extraction (spec §4.10.1) — a pluggable strategy interface with
//! a deterministic keyword/co-occurrence + contradiction heuristic as the
//! fallback every deployment can rely on without an LLM collaborator.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;

use crate::comms::Message;

use super::model::{ExtractedInsight, InsightType};
use super::ConversationThread;

#[async_trait]
pub trait InsightStrategy: Send + Sync {
    async fn extract(&self, thread: &ConversationThread, messages: &[Message]) -> Vec<ExtractedInsight>;
}

const STOPWORDS: &[&str] = &[
    "this", "that", "with", "from", "have", "will", "should", "would", "could", "about", "there",
    "their", "what", "when", "where", "which", "these", "those", "been", "were", "being", "into",
    "your", "them", "then", "than", "also", "just", "over", "such",
];

fn tokenize(content: &str) -> Vec<String> {
    content
        .split(|c: char| !c.is_alphanumeric())
        .map(|w| w.to_lowercase())
        .filter(|w| w.len() >= 4 && !STOPWORDS.contains(&w.as_str()))
        .collect()
}

const NEGATION_MARKERS: &[&str] = &["not", "disagree", "however", "but", "incorrect", "wrong"];

fn is_negating(content: &str) -> bool {
    let lower = content.to_lowercase();
    NEGATION_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Deterministic fallback required by spec §4.10.1. Two passes over the
/// thread's messages: shared keywords across distinct contributors become
/// `connection` insights, and keyword overlap between a negating message
/// and a prior one from a different contributor becomes a `risk` insight
/// flagging a possible contradiction.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicInsightStrategy;

#[async_trait]
impl InsightStrategy for HeuristicInsightStrategy {
    async fn extract(&self, _thread: &ConversationThread, messages: &[Message]) -> Vec<ExtractedInsight> {
        let mut insights = Vec::new();
        insights.extend(self.connections(messages));
        insights.extend(self.contradictions(messages));
        insights
    }
}

impl HeuristicInsightStrategy {
    fn connections(&self, messages: &[Message]) -> Vec<ExtractedInsight> {
        let mut by_keyword: HashMap<String, Vec<&Message>> = HashMap::new();
        for message in messages {
            for word in tokenize(&message.content) {
                by_keyword.entry(word).or_default().push(message);
            }
        }

        let mut insights = Vec::new();
        for (keyword, occurrences) in by_keyword {
            let contributors: HashSet<String> = occurrences.iter().map(|m| m.from_agent.clone()).collect();
            if contributors.len() < 2 {
                continue;
            }
            let source_message_ids: Vec<String> = occurrences.iter().map(|m| m.id.clone()).collect();
            let confidence = (0.3 + 0.15 * occurrences.len() as f64).min(0.95);
            insights.push(ExtractedInsight {
                insight_type: InsightType::Connection,
                content: format!("Multiple agents converged on \"{keyword}\""),
                confidence,
                contributors: contributors.into_iter().collect(),
                source_message_ids,
                relevance_score: confidence,
            });
        }
        insights
    }

    fn contradictions(&self, messages: &[Message]) -> Vec<ExtractedInsight> {
        let mut insights = Vec::new();
        for (i, candidate) in messages.iter().enumerate() {
            if !is_negating(&candidate.content) {
                continue;
            }
            let candidate_words: HashSet<String> = tokenize(&candidate.content).into_iter().collect();
            for earlier in &messages[..i] {
                if earlier.from_agent == candidate.from_agent {
                    continue;
                }
                let earlier_words: HashSet<String> = tokenize(&earlier.content).into_iter().collect();
                let shared: Vec<&String> = candidate_words.intersection(&earlier_words).collect();
                if let Some(keyword) = shared.first() {
                    insights.push(ExtractedInsight {
                        insight_type: InsightType::Risk,
                        content: format!(
                            "Possible contradiction between {} and {} around \"{keyword}\"",
                            earlier.from_agent, candidate.from_agent
                        ),
                        confidence: 0.6,
                        contributors: vec![earlier.from_agent.clone(), candidate.from_agent.clone()],
                        source_message_ids: vec![earlier.id.clone(), candidate.id.clone()],
                        relevance_score: 0.7,
                    });
                    break;
                }
            }
        }
        insights
    }
}
