//! Session Manager (spec §4.4, C4) — lifecycle orchestration atop
//! [`SessionStorage`] and [`EventLog`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, gauge};
use tracing::{debug, info};

use crate::backbone::{Backbone, BackboneError, BackboneResult, IdKind, Timestamp};

use super::event_log::{EventLog, ReplayResult};
use super::model::{Event, EventType, Session, SessionState};
use super::store::SessionStorage;

/// First 8 characters of a session id — the only form allowed in log lines
/// or error bodies (spec §4.4 Security).
pub fn mask_session_id(id: &str) -> String {
    id.chars().take(8).collect()
}

#[derive(Debug, Clone)]
pub enum TouchOutcome {
    Ok,
    Expired,
    NotFound,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SessionMetrics {
    pub created_total: u64,
    pub terminated_total: u64,
    pub expired_total: u64,
    pub events_added_total: u64,
    pub events_replayed_total: u64,
    pub active_sessions: u64,
}

pub struct SessionManagerConfig {
    pub idle_timeout: chrono::Duration,
    pub event_log_ttl: Duration,
    pub cleanup_interval: Duration,
}

impl Default for SessionManagerConfig {
    fn default() -> Self {
        Self {
            idle_timeout: chrono::Duration::minutes(30),
            event_log_ttl: Duration::from_secs(3600),
            cleanup_interval: Duration::from_secs(300),
        }
    }
}

pub struct SessionManager {
    backbone: Backbone,
    storage: Arc<dyn SessionStorage>,
    events: Arc<dyn EventLog>,
    config: SessionManagerConfig,
    created_total: AtomicU64,
    terminated_total: AtomicU64,
    expired_total: AtomicU64,
    events_added_total: AtomicU64,
    events_replayed_total: AtomicU64,
}

impl SessionManager {
    pub fn new(
        backbone: Backbone,
        storage: Arc<dyn SessionStorage>,
        events: Arc<dyn EventLog>,
        config: SessionManagerConfig,
    ) -> Self {
        Self {
            backbone,
            storage,
            events,
            config,
            created_total: AtomicU64::new(0),
            terminated_total: AtomicU64::new(0),
            expired_total: AtomicU64::new(0),
            events_added_total: AtomicU64::new(0),
            events_replayed_total: AtomicU64::new(0),
        }
    }

    pub async fn create(
        &self,
        client_id: impl Into<String>,
        origin: Option<String>,
        protocol_version: impl Into<String>,
        capabilities: serde_json::Value,
        metadata: HashMap<String, serde_json::Value>,
    ) -> BackboneResult<Session> {
        let now = self.backbone.clock.now();
        let id = self.backbone.ids.new_id(IdKind::Session);
        let session = Session {
            id: id.clone(),
            client_id: client_id.into(),
            origin,
            protocol_version: protocol_version.into(),
            capabilities,
            created_at: now,
            last_activity: now,
            expires_at: now + self.config.idle_timeout,
            state: SessionState::Active,
            event_counter: 0,
            metadata,
        };
        self.storage.create(session.clone()).await?;
        self.created_total.fetch_add(1, Ordering::Relaxed);
        counter!("oneagent_sessions_created_total").increment(1);
        info!(session_id = %mask_session_id(&id), "session created");
        Ok(session)
    }

    /// Returns `None` both when the session never existed and when it has
    /// lazily expired (spec §4.4) — callers cannot distinguish the two,
    /// matching spec §3's "nil if missing, not an error" contract.
    pub async fn get(&self, id: &str) -> BackboneResult<Option<Session>> {
        let Some(session) = self.storage.get(id).await? else {
            return Ok(None);
        };
        let now = self.backbone.clock.now();
        if session.state == SessionState::Active && now >= session.expires_at {
            self.storage
                .update(id, Box::new(|s| s.state = SessionState::Expired))
                .await?;
            self.expired_total.fetch_add(1, Ordering::Relaxed);
            counter!("oneagent_sessions_expired_total").increment(1);
            return Ok(None);
        }
        if session.state != SessionState::Active {
            return Ok(None);
        }
        Ok(Some(session))
    }

    /// Re-runs the `initialize` handshake against an already-live session
    /// instead of minting a new one. Used by the stdio adapter (spec §4.7),
    /// which creates its single implicit session at process start and must
    /// not let a client-sent `initialize` frame spawn a second one.
    pub async fn reinitialize(
        &self,
        id: &str,
        client_id: impl Into<String>,
        protocol_version: impl Into<String>,
        capabilities: serde_json::Value,
    ) -> BackboneResult<Session> {
        let client_id = client_id.into();
        let protocol_version = protocol_version.into();
        let now = self.backbone.clock.now();
        let idle_timeout = self.config.idle_timeout;
        self.storage
            .update(
                id,
                Box::new(move |s| {
                    s.client_id = client_id;
                    s.protocol_version = protocol_version;
                    s.capabilities = capabilities;
                    s.last_activity = now;
                    s.expires_at = now + idle_timeout;
                }),
            )
            .await
    }

    pub async fn touch(&self, id: &str) -> BackboneResult<TouchOutcome> {
        let Some(session) = self.storage.get(id).await? else {
            return Ok(TouchOutcome::NotFound);
        };
        let now = self.backbone.clock.now();
        if session.state != SessionState::Active || now >= session.expires_at {
            return Ok(TouchOutcome::Expired);
        }
        let idle_timeout = self.config.idle_timeout;
        self.storage
            .update(
                id,
                Box::new(move |s| {
                    s.last_activity = now;
                    s.expires_at = now + idle_timeout;
                }),
            )
            .await?;
        Ok(TouchOutcome::Ok)
    }

    pub async fn terminate(&self, id: &str) -> BackboneResult<()> {
        self.storage
            .update(id, Box::new(|s| s.state = SessionState::Terminated))
            .await?;
        self.events.clear_session_events(id).await?;
        self.terminated_total.fetch_add(1, Ordering::Relaxed);
        counter!("oneagent_sessions_terminated_total").increment(1);
        info!(session_id = %mask_session_id(id), "session terminated");
        Ok(())
    }

    pub async fn add_event(
        &self,
        session_id: &str,
        stream_id: &str,
        payload: serde_json::Value,
        event_type: EventType,
    ) -> BackboneResult<Event> {
        let event = self
            .events
            .add_event(session_id, stream_id, payload, event_type)
            .await?;
        self.events_added_total.fetch_add(1, Ordering::Relaxed);
        counter!("oneagent_events_added_total").increment(1);
        // event-counter is advisory/monotonic bookkeeping on the session
        // record itself (spec §3 invariant c), independent of the
        // per-stream sequence number.
        let _ = self
            .storage
            .update(session_id, Box::new(|s| s.event_counter += 1))
            .await;
        Ok(event)
    }

    pub async fn replay_events(
        &self,
        session_id: &str,
        stream_id: &str,
        last_event_id: Option<&str>,
    ) -> BackboneResult<ReplayResult> {
        let replay = self
            .events
            .get_events_after(session_id, stream_id, last_event_id)
            .await?;
        self.events_replayed_total
            .fetch_add(replay.events.len() as u64, Ordering::Relaxed);
        Ok(replay)
    }

    pub async fn metrics(&self) -> BackboneResult<SessionMetrics> {
        let active = self.storage.list_active().await?.len() as u64;
        gauge!("oneagent_sessions_active").set(active as f64);
        Ok(SessionMetrics {
            created_total: self.created_total.load(Ordering::Relaxed),
            terminated_total: self.terminated_total.load(Ordering::Relaxed),
            expired_total: self.expired_total.load(Ordering::Relaxed),
            events_added_total: self.events_added_total.load(Ordering::Relaxed),
            events_replayed_total: self.events_replayed_total.load(Ordering::Relaxed),
            active_sessions: active,
        })
    }

    /// Cooperative background sweep (spec §4.4 Janitor). Intended to be
    /// spawned once as a `tokio::task` for the lifetime of the process.
    pub async fn run_janitor(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.config.cleanup_interval);
        loop {
            interval.tick().await;
            let now = self.backbone.clock.now();
            match self.storage.cleanup_expired(now).await {
                Ok(n) if n > 0 => {
                    self.expired_total.fetch_add(n as u64, Ordering::Relaxed);
                    debug!(count = n, "janitor expired sessions");
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "janitor session cleanup failed"),
            }
            match self.events.cleanup_old_events(self.config.event_log_ttl).await {
                Ok(n) if n > 0 => debug!(count = n, "janitor pruned stale events"),
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "janitor event cleanup failed"),
            }
        }
    }
}

pub fn session_not_found() -> BackboneError {
    BackboneError::NotFound("session_not_found".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backbone::{Backbone, FixedClock};
    use crate::session::event_log::CacheEventLog;
    use crate::session::store::CacheSessionStorage;

    fn manager_with_clock(clock: FixedClock) -> Arc<SessionManager> {
        let backbone = Backbone {
            clock: Arc::new(clock),
            ids: Arc::new(crate::backbone::UuidGenerator),
            cache: Arc::new(crate::backbone::InProcessCache::new(Arc::new(
                crate::backbone::SystemClock,
            ))),
            metadata: Arc::new(crate::backbone::MetadataService::new(
                Arc::new(crate::backbone::InProcessCache::new(Arc::new(
                    crate::backbone::SystemClock,
                ))),
                Arc::new(crate::backbone::SystemClock),
                Arc::new(crate::backbone::UuidGenerator),
            )),
        };
        let storage = Arc::new(CacheSessionStorage::new(backbone.cache.clone()));
        let events = Arc::new(CacheEventLog::new(
            backbone.cache.clone(),
            backbone.clock.clone(),
            backbone.ids.clone(),
            1000,
        ));
        Arc::new(SessionManager::new(
            backbone,
            storage,
            events,
            SessionManagerConfig::default(),
        ))
    }

    #[tokio::test]
    async fn create_then_get_returns_session() {
        let manager = manager_with_clock(FixedClock::new(chrono::Utc::now()));
        let session = manager
            .create("client-1", None, "2025-06-18", serde_json::json!({}), Default::default())
            .await
            .unwrap();
        let fetched = manager.get(&session.id).await.unwrap().unwrap();
        assert_eq!(fetched.id, session.id);
    }

    #[tokio::test]
    async fn expiry_makes_get_return_none() {
        let clock = FixedClock::new(chrono::Utc::now());
        let manager = manager_with_clock(clock.clone());
        let session = manager
            .create("client-1", None, "2025-06-18", serde_json::json!({}), Default::default())
            .await
            .unwrap();
        clock.advance(chrono::Duration::minutes(31));
        assert!(manager.get(&session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn terminate_clears_event_log() {
        let manager = manager_with_clock(FixedClock::new(chrono::Utc::now()));
        let session = manager
            .create("client-1", None, "2025-06-18", serde_json::json!({}), Default::default())
            .await
            .unwrap();
        manager
            .add_event(&session.id, "s1", serde_json::json!({"x": 1}), EventType::Message)
            .await
            .unwrap();
        manager.terminate(&session.id).await.unwrap();
        let replay = manager.replay_events(&session.id, "s1", None).await.unwrap();
        assert!(replay.events.is_empty());
        assert!(manager.get(&session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn touch_extends_expiry() {
        let clock = FixedClock::new(chrono::Utc::now());
        let manager = manager_with_clock(clock.clone());
        let session = manager
            .create("client-1", None, "2025-06-18", serde_json::json!({}), Default::default())
            .await
            .unwrap();
        clock.advance(chrono::Duration::minutes(20));
        assert!(matches!(manager.touch(&session.id).await.unwrap(), TouchOutcome::Ok));
        clock.advance(chrono::Duration::minutes(20));
        // Would have expired from creation time, but touch pushed it out.
        assert!(manager.get(&session.id).await.unwrap().is_some());
    }

    #[test]
    fn session_id_masking_takes_first_eight_chars() {
        assert_eq!(mask_session_id("0123456789abcdef"), "01234567");
    }

    /// Exercises `SessionManager::get` against a mocked `SessionStorage`
    /// rather than the cache-backed one, demonstrating the pluggable-storage
    /// contract (spec §4.3/§9): a distributed backend could stand in here
    /// without any change to the manager.
    #[tokio::test]
    async fn get_expires_session_lazily_against_mocked_storage() {
        use super::super::store::MockSessionStorage;

        let backbone = Backbone::in_process();
        let now = backbone.clock.now();
        let expired = Session {
            id: "s1".to_string(),
            client_id: "client-1".to_string(),
            origin: None,
            protocol_version: "2025-06-18".to_string(),
            capabilities: serde_json::json!({}),
            created_at: now - chrono::Duration::hours(1),
            last_activity: now - chrono::Duration::hours(1),
            expires_at: now - chrono::Duration::minutes(1),
            state: SessionState::Active,
            event_counter: 0,
            metadata: Default::default(),
        };

        let mut storage = MockSessionStorage::new();
        storage.expect_get().returning(move |_| Ok(Some(expired.clone())));
        storage.expect_update().times(1).returning(|_, _| Err(session_not_found()));

        let events = Arc::new(CacheEventLog::new(
            backbone.cache.clone(),
            backbone.clock.clone(),
            backbone.ids.clone(),
            1000,
        ));
        let manager = SessionManager::new(backbone, Arc::new(storage), events, SessionManagerConfig::default());

        // The mock's `update` is wired to fail, so `get`'s side-effecting
        // expiry write surfaces that error rather than silently succeeding —
        // proving the manager actually called through to the mocked trait
        // exactly once, the way a real distributed `SessionStorage` would be.
        assert!(manager.get("s1").await.is_err());
    }
}
