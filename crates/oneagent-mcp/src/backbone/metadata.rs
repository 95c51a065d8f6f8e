//! Canonical content metadata service (spec §4.1, §9 Open Question 1).
//!
//! The source material carried two divergent `UnifiedMetadata` shapes — one
//! with an `accessed` timestamp and a tagged `agent` reference, one without.
//! This is the single definition the rewrite settles on; nothing else in the
//! workspace is allowed to define a competing metadata struct.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::cache::{Cache, CacheExt, Namespace};
use super::error::{BackboneError, BackboneResult};
use super::id::{IdGenerator, IdKind};
use super::time::{Clock, Timestamp};

/// Who last touched a piece of content. Modeled as a tagged union (per
/// spec §9's "duck-typed records → tagged variants" design note) rather than
/// a free-form string, with a catch-all variant for forward compatibility.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AgentRef {
    System,
    User { id: String },
    Agent { id: String },
    Other { label: String },
}

/// Canonical content metadata envelope. Any component that wants to attach
/// provenance to a blob of content (a tool result, an insight, a stored
/// memory record) creates/updates one of these rather than inventing its own
/// bag of fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedMetadata {
    pub id: String,
    pub content_type: String,
    pub agent: AgentRef,
    pub created: Timestamp,
    pub updated: Timestamp,
    pub accessed: Timestamp,
    /// Forward-compatible bag for fields not yet promoted to the struct.
    #[serde(default)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

pub struct MetadataService {
    ns: Namespace,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl MetadataService {
    pub fn new(cache: Arc<dyn Cache>, clock: Arc<dyn Clock>, ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            ns: Namespace::new(cache, "metadata:"),
            clock,
            ids,
        }
    }

    pub async fn create(&self, content_type: impl Into<String>, agent: AgentRef) -> BackboneResult<UnifiedMetadata> {
        let now = self.clock.now();
        let record = UnifiedMetadata {
            id: self.ids.new_id(IdKind::Session), // advisory kind only; metadata ids share the uuid pool
            content_type: content_type.into(),
            agent,
            created: now,
            updated: now,
            accessed: now,
            extra: Default::default(),
        };
        self.ns.set_typed(&record.id, &record, None).await?;
        Ok(record)
    }

    pub async fn retrieve(&self, id: &str) -> BackboneResult<UnifiedMetadata> {
        let mut record: UnifiedMetadata = self
            .ns
            .get_typed(id)
            .await?
            .ok_or_else(|| BackboneError::NotFound(format!("metadata {id}")))?;
        record.accessed = self.clock.now();
        self.ns.set_typed(id, &record, None).await?;
        Ok(record)
    }

    pub async fn update<F>(&self, id: &str, patch: F) -> BackboneResult<UnifiedMetadata>
    where
        F: FnOnce(&mut UnifiedMetadata),
    {
        let mut record: UnifiedMetadata = self
            .ns
            .get_typed(id)
            .await?
            .ok_or_else(|| BackboneError::NotFound(format!("metadata {id}")))?;
        patch(&mut record);
        record.updated = self.clock.now();
        self.ns.set_typed(id, &record, None).await?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backbone::cache::InProcessCache;
    use crate::backbone::id::UuidGenerator;
    use crate::backbone::time::SystemClock;

    fn service() -> MetadataService {
        let clock = Arc::new(SystemClock);
        let cache: Arc<dyn Cache> = Arc::new(InProcessCache::new(clock.clone()));
        MetadataService::new(cache, clock, Arc::new(UuidGenerator))
    }

    #[tokio::test]
    async fn create_then_retrieve_roundtrips_and_bumps_accessed() {
        let svc = service();
        let created = svc.create("tool-result", AgentRef::System).await.unwrap();
        let first = svc.retrieve(&created.id).await.unwrap();
        assert_eq!(first.id, created.id);
        assert!(first.accessed >= created.accessed);
    }

    #[tokio::test]
    async fn retrieve_unknown_id_is_not_found() {
        let svc = service();
        let err = svc.retrieve("missing").await.unwrap_err();
        assert!(matches!(err, BackboneError::NotFound(_)));
    }
}
