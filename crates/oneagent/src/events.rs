//! Shared event bus for the Agent Registry (C8), Communication Service
//! (C9), and NLACS layer (C10) — spec §4.9 `On`/`Off` subscription surface.
//!
//! Delivery is at-most-once per subscriber per event; a slow subscriber
//! cannot stall delivery to others because `publish` never blocks on a
//! subscriber — it pushes into that subscriber's own bounded, drop-oldest
//! queue and moves on (spec §4.9 Concurrency model / Backpressure).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};

use serde::Serialize;
use tokio::sync::Notify;

use oneagent_mcp::backbone::Timestamp;

/// Every event kind the communication surface can emit (spec §4.9 `events`
/// enumeration plus C8's `agent_status_changed`/health transitions and
/// C10's `nlacs_event`).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommsEvent {
    AgentRegistered { agent_id: String },
    AgentDeregistered { agent_id: String },
    AgentStatusChanged { agent_id: String, status: String },
    HealthChanged { agent_id: String },
    SessionCreated { session_id: String },
    SessionJoined { session_id: String, agent_id: String },
    SessionLeft { session_id: String, agent_id: String },
    MessageSent { session_id: String, message_id: String },
    MessageReceived { session_id: String, message_id: String, to_agent: String },
    Broadcast { session_id: String, message_id: String },
    NlacsEvent { thread_id: String, payload: serde_json::Value, at: Timestamp },
}

impl CommsEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            CommsEvent::AgentRegistered { .. } => "agent_registered",
            CommsEvent::AgentDeregistered { .. } => "agent_deregistered",
            CommsEvent::AgentStatusChanged { .. } => "agent_status_changed",
            CommsEvent::HealthChanged { .. } => "health_changed",
            CommsEvent::SessionCreated { .. } => "session_created",
            CommsEvent::SessionJoined { .. } => "session_joined",
            CommsEvent::SessionLeft { .. } => "session_left",
            CommsEvent::MessageSent { .. } => "message_sent",
            CommsEvent::MessageReceived { .. } => "message_received",
            CommsEvent::Broadcast { .. } => "broadcast",
            CommsEvent::NlacsEvent { .. } => "nlacs_event",
        }
    }
}

struct SubscriberQueue {
    buffer: Mutex<VecDeque<CommsEvent>>,
    notify: Notify,
    bound: usize,
    dropped: AtomicU64,
}

impl SubscriberQueue {
    fn new(bound: usize) -> Self {
        Self {
            buffer: Mutex::new(VecDeque::with_capacity(bound.min(64))),
            notify: Notify::new(),
            bound,
            dropped: AtomicU64::new(0),
        }
    }

    fn push(&self, event: CommsEvent) {
        let mut buf = self.buffer.lock().unwrap();
        if buf.len() >= self.bound {
            buf.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        buf.push_back(event);
        drop(buf);
        self.notify.notify_waiters();
    }

    async fn recv(&self) -> CommsEvent {
        loop {
            {
                let mut buf = self.buffer.lock().unwrap();
                if let Some(event) = buf.pop_front() {
                    return event;
                }
            }
            self.notify.notified().await;
        }
    }
}

/// A live subscription returned by [`EventBus::subscribe`]. Dropping it
/// without calling [`EventBus::unsubscribe`] leaves the queue registered
/// (and growing up to its bound, then dropping-oldest) until explicitly
/// removed — callers that want to stop listening should unsubscribe.
pub struct Subscription {
    pub id: u64,
    queue: std::sync::Arc<SubscriberQueue>,
}

impl Subscription {
    pub async fn recv(&self) -> CommsEvent {
        self.queue.recv().await
    }

    pub fn dropped_count(&self) -> u64 {
        self.queue.dropped.load(Ordering::Relaxed)
    }
}

pub struct EventBus {
    next_id: AtomicU64,
    subscribers: RwLock<Vec<(u64, std::sync::Arc<SubscriberQueue>)>>,
    queue_bound: usize,
}

impl EventBus {
    pub fn new(queue_bound: usize) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            subscribers: RwLock::new(Vec::new()),
            queue_bound,
        }
    }

    /// spec §4.9 `On(event, handler)` — here, handlers pull from the
    /// returned [`Subscription`] rather than being invoked as callbacks,
    /// which keeps a slow consumer from blocking `publish`.
    pub fn subscribe(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let queue = std::sync::Arc::new(SubscriberQueue::new(self.queue_bound));
        self.subscribers.write().unwrap().push((id, queue.clone()));
        Subscription { id, queue }
    }

    /// spec §4.9 `Off(...)`.
    pub fn unsubscribe(&self, id: u64) {
        self.subscribers.write().unwrap().retain(|(sub_id, _)| *sub_id != id);
    }

    pub fn publish(&self, event: CommsEvent) {
        let subscribers = self.subscribers.read().unwrap();
        for (_, queue) in subscribers.iter() {
            queue.push(event.clone());
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().unwrap().len()
    }
}
