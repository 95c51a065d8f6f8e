//! Backbone — unified time, id, cache, and metadata services (spec §4.1, C1).
//!
//! Every other component in this crate (and in `oneagent`) is required to
//! obtain timestamps, ids, and shared mutable state through this module. The
//! "no parallel systems" invariant is enforced by convention, not the type
//! system: nothing outside `backbone` should call `Utc::now()`,
//! `Uuid::new_v4()`, or keep its own process-wide `HashMap`/`DashMap` of
//! domain state.

pub mod cache;
pub mod error;
pub mod id;
pub mod metadata;
pub mod time;

pub use cache::{Cache, CacheExt, InProcessCache, Namespace};
pub use error::{BackboneError, BackboneResult};
pub use id::{IdGenerator, IdKind, UuidGenerator};
pub use metadata::{AgentRef, MetadataService, UnifiedMetadata};
pub use time::{Clock, FixedClock, SystemClock, Timestamp};

use std::sync::Arc;

/// Bundle of the four backbone handles, threaded through every component
/// constructor so call sites never have to assemble them individually.
#[derive(Clone)]
pub struct Backbone {
    pub clock: Arc<dyn Clock>,
    pub ids: Arc<dyn IdGenerator>,
    pub cache: Arc<dyn Cache>,
    pub metadata: Arc<MetadataService>,
}

impl Backbone {
    pub fn in_process() -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let ids: Arc<dyn IdGenerator> = Arc::new(UuidGenerator);
        let cache: Arc<dyn Cache> = Arc::new(InProcessCache::new(clock.clone()));
        let metadata = Arc::new(MetadataService::new(cache.clone(), clock.clone(), ids.clone()));
        Self {
            clock,
            ids,
            cache,
            metadata,
        }
    }

    pub fn namespace(&self, prefix: impl Into<String>) -> Namespace {
        Namespace::new(self.cache.clone(), prefix)
    }
}
