//! NLACS Layer (spec §4.10, C10) — sits atop the Communication Service and
//! annotates conversation threads with emergent insights, cross-thread
//! synthesis, and consensus analysis. Never writes session/message state
//! directly (invariant i): everything here is its own `nlacs:*` record
//! referencing C9 state by id.

mod consensus;
mod insights;
mod model;
mod synthesis;

use std::sync::Arc;

use oneagent_mcp::backbone::{Backbone, CacheExt, IdKind, Namespace};

use crate::comms::CommunicationService;
use crate::error::NlacsError;
use crate::events::{CommsEvent, EventBus};

pub use insights::{HeuristicInsightStrategy, InsightStrategy};
pub use model::{
    ConsensusResult, ConversationThread, EmergentInsight, ExtractedInsight, InsightType, SynthesizedInsight,
};

const NLACS_PREFIX: &str = "nlacs:";

/// Breakthrough thresholds (spec §4.10.4): an insight whose confidence and
/// computed novelty both clear these bars triggers an `nlacs_event`.
const BREAKTHROUGH_CONFIDENCE: f64 = 0.8;
const BREAKTHROUGH_NOVELTY: f64 = 0.5;

fn thread_insights_key(thread_id: &str) -> String {
    format!("thread:{thread_id}:insights")
}

pub struct NlacsLayer {
    ns: Namespace,
    backbone: Backbone,
    comms: Arc<CommunicationService>,
    events: Arc<EventBus>,
    strategy: Arc<dyn InsightStrategy>,
}

impl NlacsLayer {
    pub fn new(backbone: Backbone, comms: Arc<CommunicationService>, events: Arc<EventBus>) -> Self {
        Self::with_strategy(backbone, comms, events, Arc::new(HeuristicInsightStrategy))
    }

    pub fn with_strategy(
        backbone: Backbone,
        comms: Arc<CommunicationService>,
        events: Arc<EventBus>,
        strategy: Arc<dyn InsightStrategy>,
    ) -> Self {
        Self {
            ns: backbone.namespace(NLACS_PREFIX),
            backbone,
            comms,
            events,
            strategy,
        }
    }

    pub async fn create_thread(
        &self,
        session_id: &str,
        participants: Vec<String>,
        topic: String,
    ) -> Result<ConversationThread, NlacsError> {
        let session = self
            .comms
            .get_session_info(session_id)
            .await
            .map_err(|e| NlacsError::ThreadNotFound(e.to_string()))?;
        if participants.iter().any(|p| !session.has_participant(p)) {
            return Err(NlacsError::ContributorsOutsideThread);
        }
        let thread = ConversationThread {
            id: self.backbone.ids.new_id(IdKind::Thread),
            session_id: session_id.to_string(),
            participants,
            topic,
            created_at: self.backbone.clock.now(),
        };
        self.ns
            .set_typed(&format!("thread:{}", thread.id), &thread, None)
            .await
            .map_err(|e| NlacsError::ThreadNotFound(e.to_string()))?;
        Ok(thread)
    }

    pub async fn get_thread(&self, thread_id: &str) -> Result<ConversationThread, NlacsError> {
        self.ns
            .get_typed(&format!("thread:{thread_id}"))
            .await
            .map_err(|_| NlacsError::ThreadNotFound(thread_id.to_string()))?
            .ok_or_else(|| NlacsError::ThreadNotFound(thread_id.to_string()))
    }

    /// spec §4.10.1 `generateInsights(threadId)` — runs the configured
    /// strategy over the thread's message set, persists every proposal as
    /// an immutable [`EmergentInsight`], and flags breakthroughs.
    pub async fn generate_insights(&self, thread_id: &str) -> Result<Vec<EmergentInsight>, NlacsError> {
        let thread = self.get_thread(thread_id).await?;
        let history = self
            .comms
            .get_history(&thread.session_id, None)
            .await
            .map_err(|e| NlacsError::ThreadNotFound(e.to_string()))?;
        let thread_messages: Vec<_> = history
            .into_iter()
            .filter(|m| thread.participants.contains(&m.from_agent))
            .collect();

        let extracted = self.strategy.extract(&thread, &thread_messages).await;
        let existing_count = self.insight_ids(thread_id).await?.len();
        let mut stored = Vec::with_capacity(extracted.len());
        for proposal in extracted {
            let insight = self.store_insight(&thread, proposal, None).await?;
            if self.is_breakthrough(&insight, existing_count) {
                self.events.publish(CommsEvent::NlacsEvent {
                    thread_id: thread_id.to_string(),
                    payload: serde_json::json!({
                        "kind": "breakthrough",
                        "insight_id": insight.id,
                        "confidence": insight.confidence,
                    }),
                    at: self.backbone.clock.now(),
                });
            }
            stored.push(insight);
        }
        Ok(stored)
    }

    /// Explicit revision per invariant (ii): the new record is immutable
    /// and references the prior one rather than mutating it in place.
    pub async fn supersede_insight(
        &self,
        thread_id: &str,
        old_insight_id: &str,
        proposal: ExtractedInsight,
    ) -> Result<EmergentInsight, NlacsError> {
        let thread = self.get_thread(thread_id).await?;
        self.store_insight(&thread, proposal, Some(old_insight_id.to_string())).await
    }

    async fn store_insight(
        &self,
        thread: &ConversationThread,
        proposal: ExtractedInsight,
        supersedes: Option<String>,
    ) -> Result<EmergentInsight, NlacsError> {
        if !(0.0..=1.0).contains(&proposal.confidence) {
            return Err(NlacsError::InvalidConfidence(proposal.confidence));
        }
        if proposal.contributors.iter().any(|c| !thread.participants.contains(c)) {
            return Err(NlacsError::ContributorsOutsideThread);
        }
        let insight = EmergentInsight {
            id: self.backbone.ids.new_id(IdKind::Insight),
            thread_id: thread.id.clone(),
            insight_type: proposal.insight_type,
            content: proposal.content,
            confidence: proposal.confidence,
            contributors: proposal.contributors,
            source_message_ids: proposal.source_message_ids,
            relevance_score: proposal.relevance_score,
            created_at: self.backbone.clock.now(),
            supersedes,
        };
        self.ns
            .set_typed(&format!("insight:{}", insight.id), &insight, None)
            .await
            .map_err(|e| NlacsError::ThreadNotFound(e.to_string()))?;
        self.ns
            .update_if(
                &thread_insights_key(&thread.id),
                Box::new({
                    let id = insight.id.clone();
                    move |cur| {
                        let mut ids: Vec<String> =
                            cur.and_then(|v| serde_json::from_value(v).ok()).unwrap_or_default();
                        ids.push(id);
                        Some(serde_json::to_value(ids).unwrap())
                    }
                }),
            )
            .await
            .map_err(|e| NlacsError::ThreadNotFound(e.to_string()))?;
        Ok(insight)
    }

    fn is_breakthrough(&self, insight: &EmergentInsight, prior_insight_count: usize) -> bool {
        let novelty = if prior_insight_count == 0 { 1.0 } else { 1.0 / (prior_insight_count as f64 + 1.0) };
        insight.confidence >= BREAKTHROUGH_CONFIDENCE && novelty >= BREAKTHROUGH_NOVELTY
    }

    async fn insight_ids(&self, thread_id: &str) -> Result<Vec<String>, NlacsError> {
        Ok(self
            .ns
            .get_typed(&thread_insights_key(thread_id))
            .await
            .map_err(|e| NlacsError::ThreadNotFound(e.to_string()))?
            .unwrap_or_default())
    }

    async fn thread_insights(&self, thread_id: &str) -> Result<Vec<EmergentInsight>, NlacsError> {
        let mut out = Vec::new();
        for id in self.insight_ids(thread_id).await? {
            if let Some(insight) = self
                .ns
                .get_typed::<EmergentInsight>(&format!("insight:{id}"))
                .await
                .map_err(|e| NlacsError::ThreadNotFound(e.to_string()))?
            {
                out.push(insight);
            }
        }
        Ok(out)
    }

    /// spec §4.10.2 `synthesize(threadIds, question) → SynthesizedInsight`.
    pub async fn synthesize(&self, thread_ids: Vec<String>, question: &str) -> Result<SynthesizedInsight, NlacsError> {
        let mut insights = Vec::new();
        for thread_id in &thread_ids {
            insights.extend(self.thread_insights(thread_id).await?);
        }
        Ok(synthesis::synthesize(
            self.backbone.ids.new_id(IdKind::Insight),
            question,
            thread_ids,
            insights,
            self.backbone.clock.now(),
        ))
    }

    /// spec §4.10.3 consensus analysis over a thread's messages.
    pub async fn consensus(&self, thread_id: &str, topic: &str) -> Result<ConsensusResult, NlacsError> {
        let thread = self.get_thread(thread_id).await?;
        let history = self
            .comms
            .get_history(&thread.session_id, None)
            .await
            .map_err(|e| NlacsError::ThreadNotFound(e.to_string()))?;
        let thread_messages: Vec<_> =
            history.into_iter().filter(|m| thread.participants.contains(&m.from_agent)).collect();
        Ok(consensus::analyze_consensus(topic, &thread_messages))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AgentRegistration, AgentRegistry};
    use crate::comms::{MessageType, OutgoingMessage, SessionConfig, SessionMode};
    use std::collections::HashMap;
    use std::time::Duration;

    async fn setup() -> (NlacsLayer, Arc<CommunicationService>, String, String, String) {
        let backbone = Backbone::in_process();
        let events = Arc::new(EventBus::new(32));
        let agents = Arc::new(AgentRegistry::new(backbone.clone(), events.clone(), Duration::from_secs(30)));
        let a1 = agents
            .register(AgentRegistration { id: None, name: "a1".into(), capabilities: vec![], metadata: HashMap::new() })
            .await
            .unwrap();
        let a2 = agents
            .register(AgentRegistration { id: None, name: "a2".into(), capabilities: vec![], metadata: HashMap::new() })
            .await
            .unwrap();
        let comms = Arc::new(CommunicationService::new(backbone.clone(), agents, events.clone(), 16));
        let session_id = comms
            .create_session(SessionConfig {
                name: "s".into(),
                participants: vec![a1.id.clone(), a2.id.clone()],
                mode: SessionMode::Collaborative,
                topic: "rollout".into(),
                nlacs_enabled: true,
            })
            .await
            .unwrap();
        let nlacs = NlacsLayer::new(backbone, comms.clone(), events);
        (nlacs, comms, session_id, a1.id, a2.id)
    }

    fn send(session_id: &str, from: &str, content: &str) -> OutgoingMessage {
        OutgoingMessage {
            session_id: session_id.to_string(),
            from_agent: from.to_string(),
            to_agent: None,
            content: content.to_string(),
            message_type: MessageType::Update,
            metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn generate_insights_persists_and_is_retrievable_via_synthesis() {
        let (nlacs, comms, session_id, a1, a2) = setup().await;
        let thread = nlacs.create_thread(&session_id, vec![a1.clone(), a2.clone()], "rollout".into()).await.unwrap();

        comms.send_message(send(&session_id, &a1, "canary deployment reduces blast radius")).await.unwrap();
        comms.send_message(send(&session_id, &a2, "agreed, canary deployment is the safer rollout")).await.unwrap();

        let insights = nlacs.generate_insights(&thread.id).await.unwrap();
        assert!(!insights.is_empty());

        let synthesized = nlacs.synthesize(vec![thread.id.clone()], "what rollout strategy did we pick?").await.unwrap();
        assert!(!synthesized.supporting_insight_ids.is_empty());
    }

    #[tokio::test]
    async fn create_thread_rejects_non_session_participant() {
        let (nlacs, _comms, session_id, a1, _a2) = setup().await;
        let result = nlacs.create_thread(&session_id, vec![a1, "ghost".into()], "rollout".into()).await;
        assert!(matches!(result, Err(NlacsError::ContributorsOutsideThread)));
    }

    #[tokio::test]
    async fn consensus_splits_supporting_and_objecting() {
        let (nlacs, comms, session_id, a1, a2) = setup().await;
        let thread = nlacs.create_thread(&session_id, vec![a1.clone(), a2.clone()], "rollout".into()).await.unwrap();
        comms.send_message(send(&session_id, &a1, "I support the canary rollout plan")).await.unwrap();
        comms.send_message(send(&session_id, &a2, "I object to the canary rollout plan")).await.unwrap();

        let result = nlacs.consensus(&thread.id, "canary rollout").await.unwrap();
        assert_eq!(result.supporting.len(), 1);
        assert_eq!(result.objecting.len(), 1);
    }
}
