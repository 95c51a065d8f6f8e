//! Unified time source.
//!
//! Invariant (spec §4.1): no other component may read the wall clock directly.
//! Everything that needs "now" goes through [`Clock::now`].

use chrono::{DateTime, Utc};
use std::sync::Arc;

pub type Timestamp = DateTime<Utc>;

/// Abstracts the wall clock so tests can control time deterministically
/// without every call site threading a `Timestamp` parameter through.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Production clock backed by the system wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}

/// Fixed/steppable clock for deterministic tests of expiry and TTL logic.
#[derive(Clone)]
pub struct FixedClock {
    inner: Arc<std::sync::Mutex<Timestamp>>,
}

impl FixedClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(start)),
        }
    }

    pub fn advance(&self, delta: chrono::Duration) {
        let mut guard = self.inner.lock().unwrap();
        *guard += delta;
    }

    pub fn set(&self, at: Timestamp) {
        *self.inner.lock().unwrap() = at;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        *self.inner.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_advances_monotonically() {
        let clock = FixedClock::new(Utc::now());
        let t0 = clock.now();
        clock.advance(chrono::Duration::seconds(5));
        let t1 = clock.now();
        assert!(t1 > t0);
    }
}
