//! Session Store & Event Log (C3) and Session Manager (C4) — spec §4.3-§4.4.

pub mod event_log;
pub mod manager;
pub mod model;
pub mod store;

pub use event_log::{CacheEventLog, EventLog, ReplayResult};
pub use manager::{mask_session_id, session_not_found, SessionManager, SessionManagerConfig, SessionMetrics, TouchOutcome};
pub use model::{Event, EventType, Session, SessionState};
pub use store::{CacheSessionStorage, SessionStorage};
