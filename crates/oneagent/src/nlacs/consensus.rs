//! Consensus analysis (spec §4.10.3) — agreement level across agents for
//! a topic, with supporting/objecting/neutral participant lists.

use std::collections::HashSet;

use crate::comms::Message;

use super::model::ConsensusResult;

const AGREEMENT_MARKERS: &[&str] = &["agree", "support", "yes", "endorse", "confirm", "+1"];
const OBJECTION_MARKERS: &[&str] = &["disagree", "object", "oppose", "reject", "no,", "against"];

fn mentions_topic(content: &str, topic: &str) -> bool {
    let lower = content.to_lowercase();
    topic.to_lowercase().split_whitespace().any(|word| word.len() >= 4 && lower.contains(word))
}

/// Classifies each distinct message author touching `topic` as
/// supporting, objecting, or neutral, then scores quality as the share of
/// participants who took a clear (non-neutral) position.
pub fn analyze_consensus(topic: &str, messages: &[Message]) -> ConsensusResult {
    let mut supporting = HashSet::new();
    let mut objecting = HashSet::new();
    let mut touched = HashSet::new();

    for message in messages {
        if !mentions_topic(&message.content, topic) {
            continue;
        }
        touched.insert(message.from_agent.clone());
        let lower = message.content.to_lowercase();
        if OBJECTION_MARKERS.iter().any(|m| lower.contains(m)) {
            objecting.insert(message.from_agent.clone());
        } else if AGREEMENT_MARKERS.iter().any(|m| lower.contains(m)) {
            supporting.insert(message.from_agent.clone());
        }
    }

    let decided_agents: HashSet<String> = supporting.union(&objecting).cloned().collect();
    let neutral: HashSet<String> = touched.difference(&decided_agents).cloned().collect();

    let decided = supporting.len() + objecting.len();
    let quality_score = if touched.is_empty() {
        0.0
    } else {
        decided as f64 / touched.len() as f64
    };

    let compromises = if !supporting.is_empty() && !objecting.is_empty() {
        vec![format!(
            "{} participant(s) support and {} object on \"{topic}\" — a negotiated middle ground may be needed",
            supporting.len(),
            objecting.len()
        )]
    } else {
        Vec::new()
    };

    ConsensusResult {
        topic: topic.to_string(),
        supporting: supporting.into_iter().collect(),
        objecting: objecting.into_iter().collect(),
        neutral: neutral.into_iter().collect(),
        compromises,
        quality_score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comms::MessageType;
    use chrono::Utc;
    use std::collections::HashMap;

    fn message(from: &str, content: &str) -> Message {
        Message {
            id: format!("m-{from}"),
            session_id: "s1".into(),
            from_agent: from.into(),
            to_agent: None,
            content: content.into(),
            message_type: MessageType::Decision,
            timestamp: Utc::now(),
            sequence: 0,
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn splits_supporting_and_objecting_participants() {
        let messages = vec![
            message("a1", "I agree with the migration plan"),
            message("a2", "I object to the migration plan, too risky"),
            message("a3", "the migration plan timeline looks fine"),
        ];
        let result = analyze_consensus("migration plan", &messages);
        assert_eq!(result.supporting, vec!["a1".to_string()]);
        assert_eq!(result.objecting, vec!["a2".to_string()]);
        assert!(!result.compromises.is_empty());
    }

    #[test]
    fn unrelated_messages_do_not_count() {
        let messages = vec![message("a1", "unrelated lunch plans")];
        let result = analyze_consensus("migration plan", &messages);
        assert_eq!(result.quality_score, 0.0);
    }
}
