//! Agent Registry (spec §4.8, C8).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use oneagent_mcp::backbone::{Backbone, BackboneError, BackboneResult, CacheExt, IdKind, Namespace};
use tracing::{debug, info};

use crate::error::AgentError;
use crate::events::{CommsEvent, EventBus};

use super::model::{Agent, AgentFilter, AgentRegistration, AgentStatus, HealthSnapshot};

const AGENT_PREFIX: &str = "agent:";
const AGENT_IDS_KEY: &str = "agent:ids";

fn capability_key(capability: &str) -> String {
    format!("agent:capability:{capability}")
}

pub struct AgentRegistry {
    ns: Namespace,
    backbone: Backbone,
    events: Arc<EventBus>,
    heartbeat_timeout: Duration,
}

impl AgentRegistry {
    pub fn new(backbone: Backbone, events: Arc<EventBus>, heartbeat_timeout: Duration) -> Self {
        Self {
            ns: backbone.namespace(AGENT_PREFIX),
            backbone,
            events,
            heartbeat_timeout,
        }
    }

    /// Generates an id if absent; last-write-wins on a duplicate id (spec
    /// §4.8, §3 invariant "at most one agent per id").
    pub async fn register(&self, registration: AgentRegistration) -> BackboneResult<Agent> {
        let now = self.backbone.clock.now();
        let id = registration
            .id
            .unwrap_or_else(|| self.backbone.ids.new_id(IdKind::Agent));
        let is_new = self.ns.get_typed::<Agent>(&id).await?.is_none();

        let agent = Agent {
            id: id.clone(),
            name: registration.name,
            capabilities: registration.capabilities,
            status: AgentStatus::Online,
            health: HealthSnapshot::initial(now),
            registered_at: now,
            metadata: registration.metadata,
        };
        self.ns.set_typed(&id, &agent, None).await?;
        self.add_to_set(AGENT_IDS_KEY, &id).await?;
        for cap in &agent.capabilities {
            self.add_to_set(&capability_key(cap), &id).await?;
        }

        if is_new {
            counter!("oneagent_agents_registered_total").increment(1);
            self.events.publish(CommsEvent::AgentRegistered { agent_id: id.clone() });
            info!(agent_id = %id, "agent registered");
        }
        Ok(agent)
    }

    pub async fn deregister(&self, id: &str) -> BackboneResult<()> {
        if let Some(agent) = self.ns.get_typed::<Agent>(id).await? {
            for cap in &agent.capabilities {
                self.remove_from_set(&capability_key(cap), id).await?;
            }
        }
        self.remove_from_set(AGENT_IDS_KEY, id).await?;
        self.ns.delete(id).await?;
        self.events.publish(CommsEvent::AgentDeregistered { agent_id: id.to_string() });
        Ok(())
    }

    pub async fn get(&self, id: &str) -> BackboneResult<Option<Agent>> {
        self.ns.get_typed(id).await
    }

    /// spec §4.8 `Discover(filter)` — matches on capability subset, status,
    /// and health class.
    pub async fn discover(&self, filter: AgentFilter) -> BackboneResult<Vec<Agent>> {
        let ids: Vec<String> = if let Some(cap) = &filter.capability {
            self.backbone
                .cache
                .get_typed(&capability_key(cap))
                .await?
                .unwrap_or_default()
        } else {
            self.backbone.cache.get_typed(AGENT_IDS_KEY).await?.unwrap_or_default()
        };
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(agent) = self.ns.get_typed::<Agent>(&id).await? {
                if filter.matches(&agent) {
                    out.push(agent);
                }
            }
        }
        Ok(out)
    }

    pub async fn update_status(&self, id: &str, status: AgentStatus) -> Result<(), AgentError> {
        let mut agent = self
            .ns
            .get_typed::<Agent>(id)
            .await
            .map_err(backbone_to_agent_error)?
            .ok_or_else(|| AgentError::NotFound(id.to_string()))?;
        agent.status = status;
        agent.health.status = status;
        agent.health.last_activity = self.backbone.clock.now();
        self.ns
            .set_typed(id, &agent, None)
            .await
            .map_err(backbone_to_agent_error)?;
        self.events.publish(CommsEvent::AgentStatusChanged {
            agent_id: id.to_string(),
            status: status.as_str().to_string(),
        });
        Ok(())
    }

    /// Records a heartbeat: bumps `last_activity` and flips `offline`
    /// agents back to `online` (spec §4.8 "Health is passive ... plus a
    /// liveness check").
    pub async fn heartbeat(&self, id: &str, response_time_ms: f64, error_rate: f64) -> Result<(), AgentError> {
        let now = self.backbone.clock.now();
        let mut agent = self
            .ns
            .get_typed::<Agent>(id)
            .await
            .map_err(backbone_to_agent_error)?
            .ok_or_else(|| AgentError::NotFound(id.to_string()))?;
        agent.health.last_activity = now;
        agent.health.response_time_ms = response_time_ms;
        agent.health.error_rate = error_rate;
        if agent.status == AgentStatus::Offline {
            agent.status = AgentStatus::Online;
            agent.health.status = AgentStatus::Online;
        }
        self.ns
            .set_typed(id, &agent, None)
            .await
            .map_err(backbone_to_agent_error)?;
        self.events.publish(CommsEvent::HealthChanged { agent_id: id.to_string() });
        Ok(())
    }

    pub async fn health(&self, id: &str) -> Result<HealthSnapshot, AgentError> {
        let agent = self
            .ns
            .get_typed::<Agent>(id)
            .await
            .map_err(backbone_to_agent_error)?
            .ok_or_else(|| AgentError::NotFound(id.to_string()))?;
        Ok(agent.health)
    }

    async fn add_to_set(&self, key: &str, id: &str) -> BackboneResult<()> {
        self.backbone
            .cache
            .update_if(
                key,
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

    async fn remove_from_set(&self, key: &str, id: &str) -> BackboneResult<()> {
        self.backbone
            .cache
            .update_if(
                key,
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

    /// Cooperative liveness sweep (spec §4.8): agents missing heartbeats
    /// for `heartbeatTimeoutMs` transition to `offline`. Mirrors the
    /// Session Manager's janitor (§4.4) rather than polling from handlers.
    pub async fn run_liveness_task(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.heartbeat_timeout / 3);
        loop {
            interval.tick().await;
            if let Err(e) = self.sweep_stale_agents().await {
                tracing::warn!(error = %e, "agent liveness sweep failed");
            }
        }
    }

    async fn sweep_stale_agents(&self) -> BackboneResult<()> {
        let ids: Vec<String> = self.backbone.cache.get_typed(AGENT_IDS_KEY).await?.unwrap_or_default();
        let now = self.backbone.clock.now();
        let timeout = chrono::Duration::from_std(self.heartbeat_timeout).unwrap_or_default();
        for id in ids {
            let Some(mut agent) = self.ns.get_typed::<Agent>(&id).await? else {
                continue;
            };
            if agent.status != AgentStatus::Offline && now - agent.health.last_activity > timeout {
                agent.status = AgentStatus::Offline;
                agent.health.status = AgentStatus::Offline;
                self.ns.set_typed(&id, &agent, None).await?;
                debug!(agent_id = %id, "agent marked offline (heartbeat timeout)");
                self.events.publish(CommsEvent::AgentStatusChanged {
                    agent_id: id.clone(),
                    status: "offline".to_string(),
                });
            }
        }
        Ok(())
    }
}

fn backbone_to_agent_error(_: BackboneError) -> AgentError {
    AgentError::NotFound("lookup failed".to_string())
}
