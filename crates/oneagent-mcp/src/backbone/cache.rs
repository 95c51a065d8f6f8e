//! Namespaced cache — the only allowed in-process shared state store (spec §4.1).
//!
//! Every component that needs to remember something between calls goes through
//! a [`Cache`] handle rather than keeping its own `HashMap`/`DashMap`. The
//! default implementation is in-process (`dashmap`-backed); a distributed
//! backend (Redis, SQL) can replace it without any other component changing,
//! because nothing outside this module is allowed to assume in-process
//! semantics beyond what the trait promises.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{de::DeserializeOwned, Serialize};

use super::error::{BackboneError, BackboneResult};
use super::time::{Clock, Timestamp};

/// Key/value cache with TTL and optimistic-locking support.
///
/// Values are stored as `serde_json::Value` so the trait stays
/// object-safe and a single cache instance can back heterogeneous
/// components (sessions, tools, agents, conversations, ...).
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> BackboneResult<Option<serde_json::Value>>;

    async fn set(
        &self,
        key: &str,
        value: serde_json::Value,
        ttl: Option<Duration>,
    ) -> BackboneResult<()>;

    async fn delete(&self, key: &str) -> BackboneResult<()>;

    /// Returns all keys currently stored with the given prefix (inclusive).
    async fn list_by_prefix(&self, prefix: &str) -> BackboneResult<Vec<String>>;

    /// Atomic compare-and-swap: reads the current value, passes it to
    /// `update`, and stores the result iff nothing else wrote to `key`
    /// in between. Returns the new value on success.
    ///
    /// Used by the Session Store's sequence counters (spec §4.3) to avoid
    /// losing updates under concurrent `addEvent` calls.
    async fn update_if(
        &self,
        key: &str,
        update: Box<dyn FnOnce(Option<serde_json::Value>) -> Option<serde_json::Value> + Send>,
    ) -> BackboneResult<serde_json::Value>;
}

/// Typed convenience helpers layered over the raw [`Cache`] trait. Every
/// component stores strongly typed records through these rather than
/// hand-rolling `serde_json::to_value`/`from_value` at each call site.
#[async_trait]
pub trait CacheExt: Cache {
    async fn get_typed<T: DeserializeOwned>(&self, key: &str) -> BackboneResult<Option<T>> {
        match self.get(key).await? {
            Some(v) => Ok(Some(serde_json::from_value(v).map_err(|e| {
                BackboneError::BackendUnavailable(format!("corrupt cache entry {key}: {e}"))
            })?)),
            None => Ok(None),
        }
    }

    async fn set_typed<T: Serialize + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> BackboneResult<()> {
        let v = serde_json::to_value(value)
            .map_err(|e| BackboneError::Conflict(format!("unserializable value: {e}")))?;
        self.set(key, v, ttl).await
    }

    /// Returns the existing value for `key`, or computes, stores, and
    /// returns `create()`'s result if absent.
    async fn get_or_create<T, F>(&self, key: &str, ttl: Option<Duration>, create: F) -> BackboneResult<T>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
        F: FnOnce() -> T + Send,
    {
        if let Some(existing) = self.get_typed::<T>(key).await? {
            return Ok(existing);
        }
        let created = create();
        self.set_typed(key, &created, ttl).await?;
        Ok(created)
    }
}

impl<T: Cache + ?Sized> CacheExt for T {}

/// A key-prefixed view over a shared [`Cache`], so components don't need to
/// remember their own prefix string at every call site (spec §4.1
/// `Namespace(prefix)`).
#[derive(Clone)]
pub struct Namespace {
    inner: Arc<dyn Cache>,
    prefix: String,
}

impl Namespace {
    pub fn new(inner: Arc<dyn Cache>, prefix: impl Into<String>) -> Self {
        Self {
            inner,
            prefix: prefix.into(),
        }
    }

    fn key(&self, suffix: &str) -> String {
        format!("{}{}", self.prefix, suffix)
    }

    pub async fn get(&self, suffix: &str) -> BackboneResult<Option<serde_json::Value>> {
        self.inner.get(&self.key(suffix)).await
    }

    pub async fn set(
        &self,
        suffix: &str,
        value: serde_json::Value,
        ttl: Option<Duration>,
    ) -> BackboneResult<()> {
        self.inner.set(&self.key(suffix), value, ttl).await
    }

    pub async fn delete(&self, suffix: &str) -> BackboneResult<()> {
        self.inner.delete(&self.key(suffix)).await
    }

    pub async fn list_by_prefix(&self, suffix_prefix: &str) -> BackboneResult<Vec<String>> {
        let full = self.key(suffix_prefix);
        let keys = self.inner.list_by_prefix(&full).await?;
        Ok(keys
            .into_iter()
            .map(|k| k.trim_start_matches(&self.prefix).to_string())
            .collect())
    }

    pub async fn update_if(
        &self,
        suffix: &str,
        update: Box<dyn FnOnce(Option<serde_json::Value>) -> Option<serde_json::Value> + Send>,
    ) -> BackboneResult<serde_json::Value> {
        self.inner.update_if(&self.key(suffix), update).await
    }
}

impl CacheExt for Namespace {}

#[async_trait]
impl Cache for Namespace {
    async fn get(&self, key: &str) -> BackboneResult<Option<serde_json::Value>> {
        Namespace::get(self, key).await
    }

    async fn set(
        &self,
        key: &str,
        value: serde_json::Value,
        ttl: Option<Duration>,
    ) -> BackboneResult<()> {
        Namespace::set(self, key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> BackboneResult<()> {
        Namespace::delete(self, key).await
    }

    async fn list_by_prefix(&self, prefix: &str) -> BackboneResult<Vec<String>> {
        Namespace::list_by_prefix(self, prefix).await
    }

    async fn update_if(
        &self,
        key: &str,
        update: Box<dyn FnOnce(Option<serde_json::Value>) -> Option<serde_json::Value> + Send>,
    ) -> BackboneResult<serde_json::Value> {
        Namespace::update_if(self, key, update).await
    }
}

struct Entry {
    value: serde_json::Value,
    expires_at: Option<Timestamp>,
}

/// Default in-process cache. Backed by a sharded concurrent map so reads and
/// writes to unrelated keys never contend; `update_if` takes the shard lock
/// for its key only, which is what gives the session event counter its
/// per-(session,stream) isolation.
pub struct InProcessCache {
    entries: DashMap<String, Entry>,
    clock: Arc<dyn Clock>,
}

impl InProcessCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    fn is_live(&self, entry: &Entry) -> bool {
        match entry.expires_at {
            Some(exp) => self.clock.now() < exp,
            None => true,
        }
    }
}

#[async_trait]
impl Cache for InProcessCache {
    async fn get(&self, key: &str) -> BackboneResult<Option<serde_json::Value>> {
        let live = match self.entries.get(key) {
            Some(entry) if self.is_live(&entry) => return Ok(Some(entry.value.clone())),
            Some(_) => false,
            None => return Ok(None),
        };
        if !live {
            self.entries.remove(key);
        }
        Ok(None)
    }

    async fn set(
        &self,
        key: &str,
        value: serde_json::Value,
        ttl: Option<Duration>,
    ) -> BackboneResult<()> {
        let expires_at = ttl.map(|d| {
            self.clock.now()
                + chrono::Duration::from_std(d)
                    .unwrap_or_else(|_| chrono::Duration::seconds(0))
        });
        self.entries.insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> BackboneResult<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn list_by_prefix(&self, prefix: &str) -> BackboneResult<Vec<String>> {
        let mut keys: BTreeSet<String> = BTreeSet::new();
        for entry in self.entries.iter() {
            if entry.key().starts_with(prefix) && self.is_live(entry.value()) {
                keys.insert(entry.key().clone());
            }
        }
        Ok(keys.into_iter().collect())
    }

    async fn update_if(
        &self,
        key: &str,
        update: Box<dyn FnOnce(Option<serde_json::Value>) -> Option<serde_json::Value> + Send>,
    ) -> BackboneResult<serde_json::Value> {
        // `DashMap::entry` holds the shard write-lock for the duration of
        // the match arm below, so the read, the closure, and the write all
        // happen under the same lock acquisition — a concurrent writer to
        // this key blocks until we're done rather than racing us between a
        // separate read and write. That's what makes this a true
        // compare-and-swap instead of read-then-blind-overwrite.
        use dashmap::mapref::entry::Entry as DashEntry;
        match self.entries.entry(key.to_string()) {
            DashEntry::Occupied(mut o) => {
                let current = if self.is_live(o.get()) {
                    Some(o.get().value.clone())
                } else {
                    None
                };
                let updated = update(current).ok_or_else(|| {
                    BackboneError::Conflict(format!("update_if rejected write to {key}"))
                })?;
                o.get_mut().value = updated.clone();
                Ok(updated)
            }
            DashEntry::Vacant(v) => {
                let updated = update(None).ok_or_else(|| {
                    BackboneError::Conflict(format!("update_if rejected write to {key}"))
                })?;
                v.insert(Entry {
                    value: updated.clone(),
                    expires_at: None,
                });
                Ok(updated)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backbone::time::SystemClock;

    fn cache() -> InProcessCache {
        InProcessCache::new(Arc::new(SystemClock))
    }

    #[tokio::test]
    async fn set_then_get_roundtrips() {
        let c = cache();
        c.set("a:1", serde_json::json!({"x": 1}), None).await.unwrap();
        assert_eq!(c.get("a:1").await.unwrap(), Some(serde_json::json!({"x": 1})));
    }

    #[tokio::test]
    async fn expired_entries_are_invisible() {
        let c = cache();
        c.set("a:1", serde_json::json!(1), Some(Duration::from_millis(1)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(c.get("a:1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn list_by_prefix_filters() {
        let c = cache();
        c.set("session:a", serde_json::json!(1), None).await.unwrap();
        c.set("session:b", serde_json::json!(1), None).await.unwrap();
        c.set("tool:a", serde_json::json!(1), None).await.unwrap();
        let mut keys = c.list_by_prefix("session:").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["session:a".to_string(), "session:b".to_string()]);
    }

    #[tokio::test]
    async fn update_if_is_atomic_counter() {
        let c = Arc::new(cache());
        let mut handles = Vec::new();
        for _ in 0..50 {
            let c = c.clone();
            handles.push(tokio::spawn(async move {
                c.update_if(
                    "counter",
                    Box::new(|cur| {
                        let n = cur.and_then(|v| v.as_i64()).unwrap_or(0);
                        Some(serde_json::json!(n + 1))
                    }),
                )
                .await
                .unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(c.get("counter").await.unwrap(), Some(serde_json::json!(50)));
    }

    #[tokio::test]
    async fn namespace_scopes_keys() {
        let inner: Arc<dyn Cache> = Arc::new(cache());
        let ns = Namespace::new(inner.clone(), "session:");
        ns.set("42", serde_json::json!("hi"), None).await.unwrap();
        assert_eq!(
            inner.get("session:42").await.unwrap(),
            Some(serde_json::json!("hi"))
        );
    }
}
