//! Communication Service (spec §4.9, C9) — sessions, direct/broadcast
//! messaging, history, and the event surface agents subscribe to.

use std::sync::Arc;

use dashmap::DashMap;
use metrics::counter;
use oneagent_mcp::backbone::{Backbone, CacheExt, IdKind, Namespace};
use tokio::sync::{Mutex, Semaphore};
use tracing::info;

use crate::agent::AgentRegistry;
use crate::error::CommsError;
use crate::events::{CommsEvent, EventBus};

use super::model::{
    ConversationSession, Message, MessageType, OutgoingMessage, SessionConfig, SessionStatus,
    MAX_MESSAGE_CONTENT_CHARS,
};

const CONV_PREFIX: &str = "conv:";

fn history_suffix(id: &str) -> String {
    format!("{id}:history")
}

fn seq_suffix(id: &str) -> String {
    format!("{id}:seq")
}

/// Per-session admission control: `permits` caps the number of
/// concurrently in-flight sends (spec §4.9 backpressure — `SendMessage`
/// returns `queue_full` once a session's inbound queue exceeds its
/// bound); `order` enforces the FIFO append-and-dispatch ordering a
/// single "logical serializer" promises.
struct SessionSerializer {
    order: Mutex<()>,
    admission: Semaphore,
}

impl SessionSerializer {
    fn new(bound: usize) -> Self {
        Self {
            order: Mutex::new(()),
            admission: Semaphore::new(bound),
        }
    }
}

pub struct CommunicationService {
    ns: Namespace,
    backbone: Backbone,
    agents: Arc<AgentRegistry>,
    events: Arc<EventBus>,
    serializers: DashMap<String, Arc<SessionSerializer>>,
    queue_bound: usize,
}

impl CommunicationService {
    pub fn new(backbone: Backbone, agents: Arc<AgentRegistry>, events: Arc<EventBus>, queue_bound: usize) -> Self {
        Self {
            ns: backbone.namespace(CONV_PREFIX),
            backbone,
            agents,
            events,
            serializers: DashMap::new(),
            queue_bound,
        }
    }

    fn serializer(&self, session_id: &str) -> Arc<SessionSerializer> {
        self.serializers
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(SessionSerializer::new(self.queue_bound)))
            .clone()
    }

    /// spec §4.9 `CreateSession(cfg)` — validates every named participant
    /// is a known agent before the session is stored.
    pub async fn create_session(&self, cfg: SessionConfig) -> Result<String, CommsError> {
        for agent_id in &cfg.participants {
            self.agents
                .get(agent_id)
                .await
                .map_err(|_| CommsError::NotParticipant(agent_id.clone()))?
                .ok_or_else(|| CommsError::NotParticipant(agent_id.clone()))?;
        }
        let id = self.backbone.ids.new_id(IdKind::ConversationSession);
        let session = ConversationSession {
            id: id.clone(),
            name: cfg.name,
            participants: cfg.participants,
            mode: cfg.mode,
            topic: cfg.topic,
            status: SessionStatus::Active,
            created_at: self.backbone.clock.now(),
            nlacs_enabled: cfg.nlacs_enabled,
        };
        self.ns
            .set_typed(&id, &session, None)
            .await
            .map_err(|_| CommsError::SessionNotFound(id.clone()))?;
        counter!("oneagent_comms_sessions_created_total").increment(1);
        self.events.publish(CommsEvent::SessionCreated { session_id: id.clone() });
        info!(session_id = %mask(&id), "conversation session created");
        Ok(id)
    }

    pub async fn get_session_info(&self, session_id: &str) -> Result<ConversationSession, CommsError> {
        self.ns
            .get_typed(session_id)
            .await
            .map_err(|_| CommsError::SessionNotFound(session_id.to_string()))?
            .ok_or_else(|| CommsError::SessionNotFound(session_id.to_string()))
    }

    async fn mutate_session<F>(&self, session_id: &str, mutate: F) -> Result<ConversationSession, CommsError>
    where
        F: FnOnce(&mut ConversationSession),
    {
        let mut session = self.get_session_info(session_id).await?;
        mutate(&mut session);
        self.ns
            .set_typed(session_id, &session, None)
            .await
            .map_err(|_| CommsError::SessionNotFound(session_id.to_string()))?;
        Ok(session)
    }

    /// spec §4.9 `Join` — idempotent; returns `false` if already a
    /// participant.
    pub async fn join(&self, session_id: &str, agent_id: &str) -> Result<bool, CommsError> {
        let mut changed = false;
        self.mutate_session(session_id, |session| {
            if !session.has_participant(agent_id) {
                session.participants.push(agent_id.to_string());
                changed = true;
            }
        })
        .await?;
        if changed {
            self.events.publish(CommsEvent::SessionJoined {
                session_id: session_id.to_string(),
                agent_id: agent_id.to_string(),
            });
        }
        Ok(changed)
    }

    /// spec §4.9 `Leave` — idempotent; returns `false` if not a participant.
    pub async fn leave(&self, session_id: &str, agent_id: &str) -> Result<bool, CommsError> {
        let mut changed = false;
        self.mutate_session(session_id, |session| {
            let before = session.participants.len();
            session.participants.retain(|p| p != agent_id);
            changed = session.participants.len() != before;
        })
        .await?;
        if changed {
            self.events.publish(CommsEvent::SessionLeft {
                session_id: session_id.to_string(),
                agent_id: agent_id.to_string(),
            });
        }
        Ok(changed)
    }

    /// spec §4.9 `SendMessage` — verifies sender/recipient membership and
    /// the content-length boundary, then appends in FIFO order.
    pub async fn send_message(&self, msg: OutgoingMessage) -> Result<String, CommsError> {
        if msg.content.chars().count() > MAX_MESSAGE_CONTENT_CHARS {
            return Err(CommsError::ContentTooLong);
        }
        let session = self.get_session_info(&msg.session_id).await?;
        if !session.has_participant(&msg.from_agent) {
            return Err(CommsError::NotParticipant(msg.from_agent.clone()));
        }
        if let Some(to_agent) = &msg.to_agent {
            if !session.has_participant(to_agent) {
                return Err(CommsError::NotParticipant(to_agent.clone()));
            }
        }
        self.append_and_dispatch(&session, msg).await
    }

    /// spec §4.9 `BroadcastMessage` — delivered to every other participant.
    pub async fn broadcast_message(&self, mut msg: OutgoingMessage) -> Result<String, CommsError> {
        msg.to_agent = None;
        let session = self.get_session_info(&msg.session_id).await?;
        if !session.has_participant(&msg.from_agent) {
            return Err(CommsError::NotParticipant(msg.from_agent.clone()));
        }
        let id = self.append_and_dispatch(&session, msg).await?;
        self.events.publish(CommsEvent::Broadcast {
            session_id: session.id.clone(),
            message_id: id.clone(),
        });
        Ok(id)
    }

    async fn append_and_dispatch(
        &self,
        session: &ConversationSession,
        msg: OutgoingMessage,
    ) -> Result<String, CommsError> {
        let serializer = self.serializer(&session.id);
        let _permit = serializer.admission.try_acquire().map_err(|_| CommsError::QueueFull)?;
        let _order = serializer.order.lock().await;

        let sequence = self
            .backbone
            .cache
            .update_if(
                &seq_suffix(&format!("{CONV_PREFIX}{}", session.id)),
                Box::new(|cur| {
                    let n = cur.and_then(|v| v.as_u64()).unwrap_or(0);
                    Some(serde_json::json!(n + 1))
                }),
            )
            .await
            .map_err(|_| CommsError::SessionNotFound(session.id.clone()))?
            .as_u64()
            .unwrap_or(1)
            - 1;

        let message = Message {
            id: self.backbone.ids.new_id(IdKind::Message),
            session_id: session.id.clone(),
            from_agent: msg.from_agent,
            to_agent: msg.to_agent.clone(),
            content: msg.content,
            message_type: msg.message_type,
            timestamp: self.backbone.clock.now(),
            sequence,
            metadata: msg.metadata,
        };

        self.backbone
            .cache
            .update_if(
                &format!("{CONV_PREFIX}{}", history_suffix(&session.id)),
                Box::new({
                    let message = message.clone();
                    move |cur| {
                        let mut history: Vec<Message> =
                            cur.and_then(|v| serde_json::from_value(v).ok()).unwrap_or_default();
                        history.push(message);
                        Some(serde_json::to_value(history).unwrap())
                    }
                }),
            )
            .await
            .map_err(|_| CommsError::SessionNotFound(session.id.clone()))?;

        counter!("oneagent_comms_messages_sent_total").increment(1);
        self.events.publish(CommsEvent::MessageSent {
            session_id: session.id.clone(),
            message_id: message.id.clone(),
        });

        let recipients: Vec<&String> = match &message.to_agent {
            Some(to) => vec![to],
            None => session.participants.iter().filter(|p| **p != message.from_agent).collect(),
        };
        for recipient in recipients {
            self.events.publish(CommsEvent::MessageReceived {
                session_id: session.id.clone(),
                message_id: message.id.clone(),
                to_agent: recipient.clone(),
            });
        }

        Ok(message.id)
    }

    /// spec §4.9 `GetHistory(sessionId, limit?)` — returns the most recent
    /// `limit` messages (all of them if omitted), oldest first.
    pub async fn get_history(&self, session_id: &str, limit: Option<usize>) -> Result<Vec<Message>, CommsError> {
        self.get_session_info(session_id).await?;
        let history: Vec<Message> = self
            .backbone
            .cache
            .get_typed(&format!("{CONV_PREFIX}{}", history_suffix(session_id)))
            .await
            .map_err(|_| CommsError::SessionNotFound(session_id.to_string()))?
            .unwrap_or_default();
        match limit {
            Some(n) if history.len() > n => Ok(history[history.len() - n..].to_vec()),
            _ => Ok(history),
        }
    }
}

fn mask(session_id: &str) -> String {
    session_id.chars().take(8).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AgentRegistration, AgentStatus};
    use std::collections::HashMap;
    use std::time::Duration;

    async fn setup() -> (CommunicationService, String, String) {
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
        let comms = CommunicationService::new(backbone, agents, events, 16);
        (comms, a1.id, a2.id)
    }

    fn msg(session_id: &str, from: &str, to: Option<&str>, content: &str) -> OutgoingMessage {
        OutgoingMessage {
            session_id: session_id.to_string(),
            from_agent: from.to_string(),
            to_agent: to.map(|s| s.to_string()),
            content: content.to_string(),
            message_type: MessageType::Update,
            metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn create_session_rejects_unknown_participant() {
        let (comms, a1, _a2) = setup().await;
        let cfg = SessionConfig {
            name: "s".into(),
            participants: vec![a1, "ghost".into()],
            mode: crate::comms::model::SessionMode::Collaborative,
            topic: "t".into(),
            nlacs_enabled: false,
        };
        assert!(matches!(comms.create_session(cfg).await, Err(CommsError::NotParticipant(_))));
    }

    #[tokio::test]
    async fn send_message_rejects_non_participant() {
        let (comms, a1, _a2) = setup().await;
        let cfg = SessionConfig {
            name: "s".into(),
            participants: vec![a1.clone()],
            mode: crate::comms::model::SessionMode::Collaborative,
            topic: "t".into(),
            nlacs_enabled: false,
        };
        let session_id = comms.create_session(cfg).await.unwrap();
        let result = comms.send_message(msg(&session_id, "outsider", None, "hi")).await;
        assert!(matches!(result, Err(CommsError::NotParticipant(_))));
    }

    #[tokio::test]
    async fn send_message_content_too_long_is_rejected() {
        let (comms, a1, _a2) = setup().await;
        let cfg = SessionConfig {
            name: "s".into(),
            participants: vec![a1.clone()],
            mode: crate::comms::model::SessionMode::Collaborative,
            topic: "t".into(),
            nlacs_enabled: false,
        };
        let session_id = comms.create_session(cfg).await.unwrap();
        let long = "x".repeat(MAX_MESSAGE_CONTENT_CHARS + 1);
        let result = comms.send_message(msg(&session_id, &a1, None, &long)).await;
        assert!(matches!(result, Err(CommsError::ContentTooLong)));
    }

    #[tokio::test]
    async fn history_preserves_fifo_order() {
        let (comms, a1, a2) = setup().await;
        let cfg = SessionConfig {
            name: "s".into(),
            participants: vec![a1.clone(), a2.clone()],
            mode: crate::comms::model::SessionMode::Collaborative,
            topic: "t".into(),
            nlacs_enabled: false,
        };
        let session_id = comms.create_session(cfg).await.unwrap();
        comms.send_message(msg(&session_id, &a1, Some(&a2), "one")).await.unwrap();
        comms.send_message(msg(&session_id, &a2, Some(&a1), "two")).await.unwrap();
        let history = comms.get_history(&session_id, None).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "one");
        assert_eq!(history[1].content, "two");
        assert_eq!(history[0].sequence, 0);
        assert_eq!(history[1].sequence, 1);
    }

    #[tokio::test]
    async fn join_is_idempotent() {
        let (comms, a1, a2) = setup().await;
        let cfg = SessionConfig {
            name: "s".into(),
            participants: vec![a1.clone()],
            mode: crate::comms::model::SessionMode::Collaborative,
            topic: "t".into(),
            nlacs_enabled: false,
        };
        let session_id = comms.create_session(cfg).await.unwrap();
        assert!(comms.join(&session_id, &a2).await.unwrap());
        assert!(!comms.join(&session_id, &a2).await.unwrap());
    }

    #[tokio::test]
    async fn broadcast_notifies_every_other_participant() {
        let (comms, a1, a2) = setup().await;
        let cfg = SessionConfig {
            name: "s".into(),
            participants: vec![a1.clone(), a2.clone()],
            mode: crate::comms::model::SessionMode::Collaborative,
            topic: "t".into(),
            nlacs_enabled: false,
        };
        let session_id = comms.create_session(cfg).await.unwrap();
        let sub = comms.events.subscribe();
        comms.broadcast_message(msg(&session_id, &a1, None, "all-hands")).await.unwrap();
        let mut kinds = Vec::new();
        for _ in 0..2 {
            kinds.push(sub.recv().await.kind());
        }
        assert!(kinds.contains(&"message_sent"));
        assert!(kinds.contains(&"message_received") || kinds.contains(&"broadcast"));
    }

    #[tokio::test]
    async fn get_history_respects_limit() {
        let (comms, a1, _a2) = setup().await;
        let cfg = SessionConfig {
            name: "s".into(),
            participants: vec![a1.clone()],
            mode: crate::comms::model::SessionMode::Collaborative,
            topic: "t".into(),
            nlacs_enabled: false,
        };
        let session_id = comms.create_session(cfg).await.unwrap();
        for i in 0..5 {
            comms.send_message(msg(&session_id, &a1, None, &format!("m{i}"))).await.unwrap();
        }
        let history = comms.get_history(&session_id, Some(2)).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "m3");
        assert_eq!(history[1].content, "m4");
    }
}
