//! Knowledge synthesis (spec §4.10.2) — combines cross-thread insights
//! into a single answer to an explicit question.

use super::model::{EmergentInsight, SynthesizedInsight};

/// Ranks `insights` by `relevance_score` and folds the strongest ones into
/// a synthesized answer. Confidence is the mean of the insights that
/// contributed, never inflated beyond what the sources support.
pub fn synthesize(
    id: String,
    question: &str,
    thread_ids: Vec<String>,
    mut insights: Vec<EmergentInsight>,
    created_at: oneagent_mcp::backbone::Timestamp,
) -> SynthesizedInsight {
    insights.sort_by(|a, b| b.relevance_score.partial_cmp(&a.relevance_score).unwrap_or(std::cmp::Ordering::Equal));

    const TOP_N: usize = 5;
    let top: Vec<&EmergentInsight> = insights.iter().take(TOP_N).collect();

    let content = if top.is_empty() {
        format!("No supporting insights found across the selected threads for: {question}")
    } else {
        let bullets: Vec<String> = top.iter().map(|i| format!("- {}", i.content)).collect();
        format!("Regarding \"{question}\":\n{}", bullets.join("\n"))
    };

    let confidence = if top.is_empty() {
        0.0
    } else {
        top.iter().map(|i| i.confidence).sum::<f64>() / top.len() as f64
    };

    SynthesizedInsight {
        id,
        question: question.to_string(),
        thread_ids,
        content,
        supporting_insight_ids: top.iter().map(|i| i.id.clone()).collect(),
        confidence,
        created_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nlacs::model::InsightType;
    use chrono::Utc;

    fn insight(id: &str, content: &str, confidence: f64, relevance: f64) -> EmergentInsight {
        EmergentInsight {
            id: id.to_string(),
            thread_id: "t1".into(),
            insight_type: InsightType::Pattern,
            content: content.to_string(),
            confidence,
            contributors: vec!["a1".into()],
            source_message_ids: vec![],
            relevance_score: relevance,
            created_at: Utc::now(),
            supersedes: None,
        }
    }

    #[test]
    fn empty_insights_yield_zero_confidence() {
        let result = synthesize("s1".into(), "why?", vec!["t1".into()], vec![], Utc::now());
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn ranks_by_relevance_and_averages_confidence() {
        let insights = vec![insight("i1", "low relevance", 1.0, 0.1), insight("i2", "high relevance", 0.5, 0.9)];
        let result = synthesize("s1".into(), "why?", vec!["t1".into()], insights, Utc::now());
        assert_eq!(result.supporting_insight_ids, vec!["i2".to_string(), "i1".to_string()]);
        assert!((result.confidence - 0.75).abs() < 1e-9);
    }
}
