//! Unified ID generator.
//!
//! Invariant (spec §4.1): no other component allocates IDs directly with
//! `Uuid::new_v4()` — everything goes through [`IdGenerator::new_id`] so a
//! single place can later swap in e.g. ULIDs or a snowflake scheme.

use uuid::Uuid;

/// Advisory tag recorded alongside the id for diagnostics; never parsed back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdKind {
    Session,
    Event,
    Tool,
    Agent,
    ConversationSession,
    Message,
    Thread,
    Insight,
}

impl IdKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdKind::Session => "session",
            IdKind::Event => "event",
            IdKind::Tool => "tool",
            IdKind::Agent => "agent",
            IdKind::ConversationSession => "conversation_session",
            IdKind::Message => "message",
            IdKind::Thread => "thread",
            IdKind::Insight => "insight",
        }
    }
}

pub trait IdGenerator: Send + Sync {
    fn new_id(&self, kind: IdKind) -> String;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn new_id(&self, _kind: IdKind) -> String {
        Uuid::new_v4().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_parseable_as_uuid() {
        let gen = UuidGenerator;
        let a = gen.new_id(IdKind::Session);
        let b = gen.new_id(IdKind::Session);
        assert_ne!(a, b);
        assert!(Uuid::parse_str(&a).is_ok());
    }
}
