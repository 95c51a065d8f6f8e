//! `SessionStorage` — pluggable CRUD for sessions (spec §4.3, C3).
//!
//! The default implementation sits directly on [`Cache`]; a Redis/SQL backed
//! store implements the same trait without any change to [`super::manager`].

use std::sync::Arc;

use async_trait::async_trait;

use crate::backbone::{BackboneError, BackboneResult, Cache, CacheExt, Namespace};

use super::model::{Session, SessionState};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionStorage: Send + Sync {
    async fn create(&self, session: Session) -> BackboneResult<()>;
    async fn get(&self, id: &str) -> BackboneResult<Option<Session>>;
    async fn update(&self, id: &str, patch: Box<dyn FnOnce(&mut Session) + Send>) -> BackboneResult<Session>;
    async fn delete(&self, id: &str) -> BackboneResult<()>;
    async fn list_active(&self) -> BackboneResult<Vec<Session>>;
    /// Scans ACTIVE sessions whose `expires_at` has passed, flips them to
    /// EXPIRED, and returns the count. The janitor is the only caller
    /// (spec §4.4 "only component permitted to scan the store").
    async fn cleanup_expired(&self, now: crate::backbone::Timestamp) -> BackboneResult<usize>;
}

const SESSION_PREFIX: &str = "session:";
const STATE_SET_PREFIX: &str = "session:state:";

fn state_key(state: SessionState) -> String {
    match state {
        SessionState::Active => format!("{STATE_SET_PREFIX}ACTIVE"),
        SessionState::Expired => format!("{STATE_SET_PREFIX}EXPIRED"),
        SessionState::Terminated => format!("{STATE_SET_PREFIX}TERMINATED"),
    }
}

/// Cache-backed `SessionStorage`. Sessions live at `session:{id}`; membership
/// in `session:state:{ACTIVE|EXPIRED|TERMINATED}` sets is maintained as a
/// JSON array alongside, per spec §6's persisted-state-layout schema.
pub struct CacheSessionStorage {
    ns: Namespace,
    cache: Arc<dyn Cache>,
}

impl CacheSessionStorage {
    pub fn new(cache: Arc<dyn Cache>) -> Self {
        Self {
            ns: Namespace::new(cache.clone(), SESSION_PREFIX),
            cache,
        }
    }

    async fn add_to_state_set(&self, state: SessionState, id: &str) -> BackboneResult<()> {
        let key = state_key(state);
        self.cache
            .update_if(
                &key,
                Box::new({
                    let id = id.to_string();
                    move |cur| {
                        let mut set: Vec<String> = cur
                            .and_then(|v| serde_json::from_value(v).ok())
                            .unwrap_or_default();
                        if !set.contains(&id) {
                            set.push(id);
                        }
                        Some(serde_json::to_value(set).unwrap())
                    }
                }),
            )
            .await?;
        Ok(())
    }

    async fn remove_from_state_set(&self, state: SessionState, id: &str) -> BackboneResult<()> {
        let key = state_key(state);
        self.cache
            .update_if(
                &key,
                Box::new({
                    let id = id.to_string();
                    move |cur| {
                        let mut set: Vec<String> = cur
                            .and_then(|v| serde_json::from_value(v).ok())
                            .unwrap_or_default();
                        set.retain(|existing| existing != &id);
                        Some(serde_json::to_value(set).unwrap())
                    }
                }),
            )
            .await?;
        Ok(())
    }

    async fn move_state(&self, id: &str, from: SessionState, to: SessionState) -> BackboneResult<()> {
        self.remove_from_state_set(from, id).await?;
        self.add_to_state_set(to, id).await?;
        Ok(())
    }
}

#[async_trait]
impl SessionStorage for CacheSessionStorage {
    async fn create(&self, session: Session) -> BackboneResult<()> {
        if self.ns.get_typed::<Session>(&session.id).await?.is_some() {
            return Err(BackboneError::Conflict(format!(
                "session {} already exists",
                session.id
            )));
        }
        self.ns.set_typed(&session.id, &session, None).await?;
        self.add_to_state_set(session.state, &session.id).await?;
        Ok(())
    }

    async fn get(&self, id: &str) -> BackboneResult<Option<Session>> {
        self.ns.get_typed(id).await
    }

    async fn update(&self, id: &str, patch: Box<dyn FnOnce(&mut Session) + Send>) -> BackboneResult<Session> {
        let mut session = self
            .ns
            .get_typed::<Session>(id)
            .await?
            .ok_or_else(|| BackboneError::NotFound(format!("session {id}")))?;
        let prev_state = session.state;
        patch(&mut session);
        self.ns.set_typed(id, &session, None).await?;
        if session.state != prev_state {
            self.move_state(id, prev_state, session.state).await?;
        }
        Ok(session)
    }

    async fn delete(&self, id: &str) -> BackboneResult<()> {
        if let Some(session) = self.ns.get_typed::<Session>(id).await? {
            self.remove_from_state_set(session.state, id).await?;
        }
        self.ns.delete(id).await
    }

    async fn list_active(&self) -> BackboneResult<Vec<Session>> {
        let key = state_key(SessionState::Active);
        let ids: Vec<String> = self
            .cache
            .get(&key)
            .await?
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();
        let mut sessions = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(s) = self.ns.get_typed::<Session>(&id).await? {
                sessions.push(s);
            }
        }
        Ok(sessions)
    }

    async fn cleanup_expired(&self, now: crate::backbone::Timestamp) -> BackboneResult<usize> {
        let active = self.list_active().await?;
        let mut count = 0;
        for session in active {
            if now >= session.expires_at {
                let id = session.id.clone();
                self.update(&id, Box::new(move |s| s.state = SessionState::Expired))
                    .await?;
                count += 1;
            }
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backbone::{InProcessCache, SystemClock};
    use chrono::Duration;

    fn store() -> CacheSessionStorage {
        let cache: Arc<dyn Cache> = Arc::new(InProcessCache::new(Arc::new(SystemClock)));
        CacheSessionStorage::new(cache)
    }

    fn sample(id: &str) -> Session {
        let now = chrono::Utc::now();
        Session {
            id: id.to_string(),
            client_id: "client-1".to_string(),
            origin: Some("http://localhost:3000".to_string()),
            protocol_version: "2025-06-18".to_string(),
            capabilities: serde_json::json!({}),
            created_at: now,
            last_activity: now,
            expires_at: now + Duration::minutes(30),
            state: SessionState::Active,
            event_counter: 0,
            metadata: Default::default(),
        }
    }

    #[tokio::test]
    async fn create_then_get_roundtrips() {
        use pretty_assertions::assert_eq;

        let store = store();
        let session = sample("s1");
        store.create(session.clone()).await.unwrap();
        let got = store.get("s1").await.unwrap().unwrap();
        assert_eq!(got, session);
    }

    #[tokio::test]
    async fn duplicate_create_fails_conflict() {
        let store = store();
        store.create(sample("s1")).await.unwrap();
        let err = store.create(sample("s1")).await.unwrap_err();
        assert!(matches!(err, BackboneError::Conflict(_)));
    }

    #[tokio::test]
    async fn missing_get_returns_none_not_error() {
        let store = store();
        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cleanup_expired_moves_state_and_counts() {
        let store = store();
        let mut expired = sample("s1");
        expired.expires_at = chrono::Utc::now() - Duration::seconds(1);
        store.create(expired).await.unwrap();
        store.create(sample("s2")).await.unwrap();

        let count = store.cleanup_expired(chrono::Utc::now()).await.unwrap();
        assert_eq!(count, 1);
        assert_eq!(store.list_active().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_clears_state_membership() {
        let store = store();
        store.create(sample("s1")).await.unwrap();
        store.delete("s1").await.unwrap();
        assert!(store.get("s1").await.unwrap().is_none());
        assert_eq!(store.list_active().await.unwrap().len(), 0);
    }
}
