//! Agent Runtime
//!
//! Drives every registered agent's lifecycle and wraps its `process` call as
//! a bus subscription. A `process` error or panic never propagates to the
//! bus's dispatch loop as a crash — it is turned into a `RISK_DETECTED`
//! event and the originating event is not re-delivered (at-least-once
//! delivery comes from the store's stream, not from retrying dispatch).

use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use crate::bus::{BusError, BusHandler, SharedBus};
use crate::domain::{Emitter, EventEnvelope, EventPayload, RiskSeverity};
use crate::event_store::{ApprovalStore, EventStore};

use super::context::AgentContext;
use super::mandate::AgentMandate;

#[async_trait]
pub trait Agent: Send + Sync {
    fn mandate(&self) -> AgentMandate;

    async fn initialize(&self, _ctx: &AgentContext) -> Result<(), super::error::AgentError> {
        Ok(())
    }

    async fn process(
        &self,
        event: &EventEnvelope,
        ctx: &AgentContext,
    ) -> Result<(), super::error::AgentError>;

    async fn shutdown(&self, _ctx: &AgentContext) -> Result<(), super::error::AgentError> {
        Ok(())
    }
}

/// Adapts a registered `Agent` into a `BusHandler`, owning the
/// `AgentContext` it was registered with.
struct AgentDispatcher {
    agent: Arc<dyn Agent>,
    ctx: AgentContext,
    store: EventStore,
    bus: SharedBus,
}

#[async_trait]
impl BusHandler for AgentDispatcher {
    async fn handle(&self, event: &EventEnvelope) -> Result<(), BusError> {
        if let Err(e) = self.agent.process(event, &self.ctx).await {
            tracing::error!(
                agent = %self.ctx.agent_id(),
                event_id = %event.event_id,
                error = %e,
                "agent process failed"
            );
            emit_process_failure_risk(&self.store, &self.bus, self.ctx.agent_id(), event, &e.to_string())
                .await;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        self.ctx.agent_id()
    }
}

async fn emit_process_failure_risk(
    store: &EventStore,
    bus: &SharedBus,
    agent_id: &str,
    event: &EventEnvelope,
    reason: &str,
) {
    let envelope = EventEnvelope::new(
        event.aggregate_type.clone(),
        event.aggregate_id,
        EventPayload::RiskDetected {
            severity: RiskSeverity::High,
            reason: format!("agent {agent_id} failed processing {}: {reason}", event.event_type),
            source: Some(agent_id.to_string()),
        },
        Emitter::System,
        1.0,
        true,
    )
    .caused_by(event);

    match store.append(envelope).await {
        Ok(stored) => bus.publish(stored).await,
        Err(e) => tracing::error!(error = %e, "failed to append agent-failure RISK_DETECTED event"),
    }
}

/// Registers agents onto the bus according to their mandate and tracks
/// subscription ids so `shutdown_all` can unsubscribe cleanly.
pub struct AgentRuntime {
    store: EventStore,
    bus: SharedBus,
    approvals: ApprovalStore,
    registrations: Vec<(Arc<dyn Agent>, AgentContext, Vec<Uuid>)>,
}

impl AgentRuntime {
    pub fn new(store: EventStore, bus: SharedBus, approvals: ApprovalStore) -> Self {
        Self {
            store,
            bus,
            approvals,
            registrations: Vec::new(),
        }
    }

    /// Register an agent: build its context, run its `initialize` hook,
    /// then subscribe it to the bus per its mandate.
    pub async fn register(&mut self, agent: Arc<dyn Agent>) -> Result<(), super::error::AgentError> {
        let mandate = agent.mandate();
        let agent_id = mandate.name.clone();
        let ctx = AgentContext::new(
            agent_id.clone(),
            mandate.clone(),
            self.store.clone(),
            self.bus.clone(),
            self.approvals.clone(),
        );

        agent.initialize(&ctx).await?;

        let dispatcher: Arc<dyn BusHandler> = Arc::new(AgentDispatcher {
            agent: agent.clone(),
            ctx: AgentContext::new(
                agent_id.clone(),
                mandate.clone(),
                self.store.clone(),
                self.bus.clone(),
                self.approvals.clone(),
            ),
            store: self.store.clone(),
            bus: self.bus.clone(),
        });

        let subscription_ids = if mandate.wildcard {
            vec![self.bus.subscribe(dispatcher)]
        } else {
            // One subscription per declared type so each is independently
            // unsubscribable, matching the bus's per-subscription model.
            mandate
                .subscribes
                .iter()
                .map(|event_type| self.bus.subscribe_type(*event_type, dispatcher.clone()))
                .collect()
        };

        self.registrations.push((agent, ctx, subscription_ids));
        Ok(())
    }

    pub async fn shutdown_all(&mut self) {
        for (agent, ctx, subscription_ids) in self.registrations.drain(..) {
            for subscription_id in subscription_ids {
                self.bus.unsubscribe(subscription_id);
            }
            if let Err(e) = agent.shutdown(&ctx).await {
                tracing::error!(agent = %ctx.agent_id(), error = %e, "agent shutdown failed");
            }
        }
    }
}
