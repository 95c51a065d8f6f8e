//! `EventLog` — circular, TTL-bounded per-session event buffer (spec §4.3, C3).
//!
//! Spec §9 flags that "circular buffer" and "TTL" are both described for the
//! same bound and that applying only one can fail under different failure
//! modes (a burst without a TTL drops recent events; a TTL without a cap can
//! exhaust memory). This implementation enforces both unconditionally.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration as ChronoDuration;

use crate::backbone::{BackboneError, BackboneResult, Cache, CacheExt, Clock, IdGenerator, IdKind, Namespace};

use super::model::{Event, EventType};

const MAX_SEQUENCE_RETRY: usize = 16;

#[derive(Debug, Clone)]
pub struct ReplayResult {
    pub events: Vec<Event>,
    pub warnings: Vec<String>,
}

#[async_trait]
pub trait EventLog: Send + Sync {
    async fn add_event(
        &self,
        session_id: &str,
        stream_id: &str,
        payload: serde_json::Value,
        event_type: EventType,
    ) -> BackboneResult<Event>;

    async fn get_events_after(
        &self,
        session_id: &str,
        stream_id: &str,
        last_event_id: Option<&str>,
    ) -> BackboneResult<ReplayResult>;

    async fn clear_session_events(&self, session_id: &str) -> BackboneResult<()>;

    /// Sweeps events older than `ttl` across all sessions/streams; returns
    /// the number removed. Called by the janitor alongside the session
    /// store's `cleanup_expired` (spec §4.4).
    async fn cleanup_old_events(&self, ttl: std::time::Duration) -> BackboneResult<usize>;
}

pub struct CacheEventLog {
    cache: Arc<dyn Cache>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    max_events_per_session: usize,
}

fn events_key(session_id: &str, stream_id: &str) -> String {
    format!("events:{session_id}:{stream_id}")
}

fn counter_key(session_id: &str, stream_id: &str) -> String {
    format!("events:counter:{session_id}:{stream_id}")
}

fn streams_key(session_id: &str) -> String {
    format!("events:streams:{session_id}")
}

impl CacheEventLog {
    pub fn new(
        cache: Arc<dyn Cache>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        max_events_per_session: usize,
    ) -> Self {
        Self {
            cache,
            clock,
            ids,
            max_events_per_session,
        }
    }

    async fn next_sequence(&self, session_id: &str, stream_id: &str) -> BackboneResult<u64> {
        let key = counter_key(session_id, stream_id);
        for _ in 0..MAX_SEQUENCE_RETRY {
            let result = self
                .cache
                .update_if(
                    &key,
                    Box::new(|cur| {
                        let n = cur.and_then(|v| v.as_u64()).unwrap_or(0);
                        Some(serde_json::json!(n + 1))
                    }),
                )
                .await;
            match result {
                Ok(value) => return Ok(value.as_u64().unwrap_or(1) - 1),
                Err(BackboneError::Conflict(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(BackboneError::Conflict("sequence_contention".to_string()))
    }

    async fn register_stream(&self, session_id: &str, stream_id: &str) -> BackboneResult<()> {
        self.cache
            .update_if(
                &streams_key(session_id),
                Box::new({
                    let stream_id = stream_id.to_string();
                    move |cur| {
                        let mut streams: Vec<String> = cur
                            .and_then(|v| serde_json::from_value(v).ok())
                            .unwrap_or_default();
                        if !streams.contains(&stream_id) {
                            streams.push(stream_id);
                        }
                        Some(serde_json::to_value(streams).unwrap())
                    }
                }),
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl EventLog for CacheEventLog {
    async fn add_event(
        &self,
        session_id: &str,
        stream_id: &str,
        payload: serde_json::Value,
        event_type: EventType,
    ) -> BackboneResult<Event> {
        self.register_stream(session_id, stream_id).await?;
        let sequence = self.next_sequence(session_id, stream_id).await?;
        let event = Event {
            id: self.ids.new_id(IdKind::Event),
            session_id: session_id.to_string(),
            stream_id: stream_id.to_string(),
            sequence,
            timestamp: self.clock.now(),
            payload,
            event_type,
        };

        let key = events_key(session_id, stream_id);
        let max = self.max_events_per_session;
        self.cache
            .update_if(
                &key,
                Box::new({
                    let event = event.clone();
                    move |cur| {
                        let mut events: Vec<Event> = cur
                            .and_then(|v| serde_json::from_value(v).ok())
                            .unwrap_or_default();
                        events.push(event);
                        if events.len() > max {
                            let excess = events.len() - max;
                            events.drain(0..excess);
                        }
                        Some(serde_json::to_value(events).unwrap())
                    }
                }),
            )
            .await?;
        Ok(event)
    }

    async fn get_events_after(
        &self,
        session_id: &str,
        stream_id: &str,
        last_event_id: Option<&str>,
    ) -> BackboneResult<ReplayResult> {
        let key = events_key(session_id, stream_id);
        let events: Vec<Event> = self
            .cache
            .get_typed(&key)
            .await?
            .unwrap_or_default();

        let Some(last_id) = last_event_id else {
            return Ok(ReplayResult {
                events,
                warnings: Vec::new(),
            });
        };

        match events.iter().position(|e| e.id == last_id) {
            Some(idx) => Ok(ReplayResult {
                events: events[idx + 1..].to_vec(),
                warnings: Vec::new(),
            }),
            None => Ok(ReplayResult {
                events,
                warnings: vec!["unknown_last_event".to_string()],
            }),
        }
    }

    async fn clear_session_events(&self, session_id: &str) -> BackboneResult<()> {
        let streams: Vec<String> = self
            .cache
            .get_typed(&streams_key(session_id))
            .await?
            .unwrap_or_default();
        for stream_id in &streams {
            self.cache.delete(&events_key(session_id, stream_id)).await?;
            self.cache.delete(&counter_key(session_id, stream_id)).await?;
        }
        self.cache.delete(&streams_key(session_id)).await?;
        Ok(())
    }

    async fn cleanup_old_events(&self, ttl: std::time::Duration) -> BackboneResult<usize> {
        let ttl = ChronoDuration::from_std(ttl).unwrap_or_else(|_| ChronoDuration::seconds(0));
        let cutoff = self.clock.now() - ttl;
        let mut removed = 0;
        for key in self.cache.list_by_prefix("events:").await? {
            // Skip the counter/streams index keys, only trim event lists.
            if key.starts_with("events:counter:") || key.starts_with("events:streams:") {
                continue;
            }
            let events: Vec<Event> = self.cache.get_typed(&key).await?.unwrap_or_default();
            let kept: Vec<Event> = events
                .iter()
                .filter(|e| e.timestamp >= cutoff)
                .cloned()
                .collect();
            removed += events.len() - kept.len();
            if kept.is_empty() {
                self.cache.delete(&key).await?;
            } else if kept.len() != events.len() {
                self.cache.set(&key, serde_json::to_value(kept).unwrap(), None).await?;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backbone::{InProcessCache, SystemClock, UuidGenerator};

    fn log() -> CacheEventLog {
        let clock = Arc::new(SystemClock);
        let cache: Arc<dyn Cache> = Arc::new(InProcessCache::new(clock.clone()));
        CacheEventLog::new(cache, clock, Arc::new(UuidGenerator), 1000)
    }

    #[tokio::test]
    async fn sequence_numbers_strictly_increase() {
        let log = log();
        let e1 = log.add_event("s1", "k1", serde_json::json!(1), EventType::Message).await.unwrap();
        let e2 = log.add_event("s1", "k1", serde_json::json!(2), EventType::Message).await.unwrap();
        assert_eq!(e1.sequence, 0);
        assert_eq!(e2.sequence, 1);
    }

    #[tokio::test]
    async fn replay_after_known_id_returns_only_later_events() {
        let log = log();
        let e1 = log.add_event("s1", "k1", serde_json::json!(1), EventType::Message).await.unwrap();
        let e2 = log.add_event("s1", "k1", serde_json::json!(2), EventType::Message).await.unwrap();
        let e3 = log.add_event("s1", "k1", serde_json::json!(3), EventType::Message).await.unwrap();

        let replay = log.get_events_after("s1", "k1", Some(&e1.id)).await.unwrap();
        assert_eq!(replay.events.len(), 2);
        assert_eq!(replay.events[0].id, e2.id);
        assert_eq!(replay.events[1].id, e3.id);
        assert!(replay.warnings.is_empty());
    }

    #[tokio::test]
    async fn replay_unknown_last_event_id_returns_full_buffer_with_warning() {
        let log = log();
        log.add_event("s1", "k1", serde_json::json!(1), EventType::Message).await.unwrap();
        let replay = log.get_events_after("s1", "k1", Some("does-not-exist")).await.unwrap();
        assert_eq!(replay.events.len(), 1);
        assert_eq!(replay.warnings, vec!["unknown_last_event".to_string()]);
    }

    #[tokio::test]
    async fn buffer_is_bounded_and_drops_oldest() {
        let clock = Arc::new(SystemClock);
        let cache: Arc<dyn Cache> = Arc::new(InProcessCache::new(clock.clone()));
        let log = CacheEventLog::new(cache, clock, Arc::new(UuidGenerator), 3);
        for i in 0..5 {
            log.add_event("s1", "k1", serde_json::json!(i), EventType::Message).await.unwrap();
        }
        let replay = log.get_events_after("s1", "k1", None).await.unwrap();
        assert_eq!(replay.events.len(), 3);
        assert_eq!(replay.events[0].payload, serde_json::json!(2));
    }

    #[tokio::test]
    async fn clear_session_events_removes_everything() {
        let log = log();
        log.add_event("s1", "k1", serde_json::json!(1), EventType::Message).await.unwrap();
        log.clear_session_events("s1").await.unwrap();
        let replay = log.get_events_after("s1", "k1", None).await.unwrap();
        assert!(replay.events.is_empty());
    }
}
