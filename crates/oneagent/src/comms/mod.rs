//! Communication Service (spec §4.9, C9): the canonical multi-agent
//! messaging surface — sessions, direct/broadcast sends, and history.
//! Addressing is delegated to the Agent Registry (C8); NLACS (C10) layers
//! threads and insights on top without touching this module's state.

pub mod model;
mod service;

pub use model::{
    ConversationSession, Message, MessageType, OutgoingMessage, SessionConfig, SessionMode, SessionStatus,
    MAX_MESSAGE_CONTENT_CHARS,
};
pub use service::CommunicationService;
