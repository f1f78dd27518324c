//! Agent Context
//!
//! The handle an agent's `process` implementation uses to act: `emit` and
//! `request_approval`. Both enforce the mandate and go through the store
//! before the bus, keeping the causal chain serialised per §5.

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::bus::SharedBus;
use crate::domain::{Emitter, EventEnvelope, EventPayload};
use crate::event_store::{ApprovalStore, Decision, EventStore};

use super::error::AgentError;
use super::mandate::AgentMandate;

pub struct AgentContext {
    agent_id: String,
    mandate: AgentMandate,
    store: EventStore,
    bus: SharedBus,
    approvals: ApprovalStore,
}

impl AgentContext {
    pub fn new(
        agent_id: impl Into<String>,
        mandate: AgentMandate,
        store: EventStore,
        bus: SharedBus,
        approvals: ApprovalStore,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            mandate,
            store,
            bus,
            approvals,
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn mandate(&self) -> &AgentMandate {
        &self.mandate
    }

    /// Build, append, then publish an event authored by this agent. Forces
    /// `requires_human = true` when confidence falls below the mandate's
    /// threshold, regardless of what the caller passed.
    pub async fn emit(
        &self,
        aggregate_type: impl Into<String>,
        aggregate_id: Uuid,
        payload: EventPayload,
        confidence: f64,
        requires_human: bool,
        causation: Option<&EventEnvelope>,
    ) -> Result<EventEnvelope, AgentError> {
        let event_type = payload.event_type();
        if !self.mandate.may_emit(event_type) {
            return Err(AgentError::OutOfMandate {
                agent_id: self.agent_id.clone(),
                event_type,
            });
        }

        let forced_requires_human = requires_human || confidence < self.mandate.confidence_threshold;

        let mut envelope = EventEnvelope::new(
            aggregate_type,
            aggregate_id,
            payload,
            Emitter::Agent {
                agent_id: self.agent_id.clone(),
            },
            confidence,
            forced_requires_human,
        );
        if let Some(parent) = causation {
            envelope = envelope.caused_by(parent);
        }

        let stored = self.store.append(envelope).await?;
        self.bus.publish(stored.clone()).await;
        Ok(stored)
    }

    /// Materialise a pending approval row and emit `HUMAN_APPROVAL_REQUESTED`
    /// describing it.
    pub async fn request_approval(
        &self,
        triggering_event: &EventEnvelope,
        reason: impl Into<String>,
        decision_context: serde_json::Value,
        recommended_action: impl Into<String>,
        confidence: f64,
        timeout_hours: i64,
    ) -> Result<crate::event_store::Approval, AgentError> {
        let recommended_action = recommended_action.into();
        let timeout_at = Utc::now() + Duration::hours(timeout_hours);

        let approval = self
            .approvals
            .create(
                triggering_event.event_id,
                &self.agent_id,
                decision_context,
                &recommended_action,
                confidence,
                timeout_at,
            )
            .await?;

        self.emit(
            triggering_event.aggregate_type.clone(),
            triggering_event.aggregate_id,
            EventPayload::HumanApprovalRequested {
                approval_id: approval.approval_id,
                reason: reason.into(),
            },
            confidence,
            true,
            Some(triggering_event),
        )
        .await?;

        Ok(approval)
    }

    pub async fn resolve_approval(
        &self,
        approval_id: Uuid,
        decision: Decision,
        resolver: &str,
        notes: Option<String>,
    ) -> Result<crate::event_store::Approval, AgentError> {
        self.approvals
            .resolve(approval_id, decision, resolver, notes)
            .await
            .map_err(AgentError::from)
    }
}
