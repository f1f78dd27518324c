//! SOP Executor Agent
//!
//! Resolves the matching SOP for each event and either runs its first
//! matching step autonomously or escalates it as a human approval, carrying
//! `sop_id`/`step_id` in the approval's decision context so the timeout
//! sweep can look the step back up without a dedicated execution table.

use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::{Emitter, EventEnvelope, EventPayload, EventType};
use crate::sop::{ResolutionContext, SopRegistry};

use super::context::AgentContext;
use super::error::AgentError;
use super::mandate::AgentMandate;
use super::runtime::Agent;

pub const AGENT_ID: &str = "sop_executor";

pub struct SopExecutorAgent {
    registry: Arc<SopRegistry>,
}

impl SopExecutorAgent {
    pub fn new(registry: Arc<SopRegistry>) -> Self {
        Self { registry }
    }

    fn is_own_emission(&self, event: &EventEnvelope) -> bool {
        matches!(&event.emitted_by, Emitter::Agent { agent_id } if agent_id == AGENT_ID)
    }
}

#[async_trait]
impl Agent for SopExecutorAgent {
    fn mandate(&self) -> AgentMandate {
        AgentMandate::new(AGENT_ID, "Resolves and runs the matching SOP step for each event")
            .wildcard()
            .emitting(vec![
                EventType::SopExecutionCompleted,
                EventType::HumanApprovalRequested,
            ])
    }

    async fn process(&self, event: &EventEnvelope, ctx: &AgentContext) -> Result<(), AgentError> {
        if self.is_own_emission(event) {
            return Ok(());
        }

        let resolution_ctx = ResolutionContext::from_event(event);
        let Some(sop) = self.registry.resolve(event, &resolution_ctx) else {
            return Ok(());
        };
        let Some(step) = sop.steps.first() else {
            return Ok(());
        };

        if self.registry.can_automate(&sop, &step.id, event.confidence) {
            ctx.emit(
                event.aggregate_type.clone(),
                event.aggregate_id,
                EventPayload::SopExecutionCompleted {
                    sop_id: sop.id.clone(),
                    outcome: format!("step {} executed automatically", step.id),
                },
                event.confidence,
                false,
                Some(event),
            )
            .await?;
            return Ok(());
        }

        ctx.request_approval(
            event,
            format!("SOP {} step {} requires human sign-off", sop.id, step.id),
            serde_json::json!({
                "sop_id": sop.id,
                "step_id": step.id,
                "actions": step.actions,
            }),
            step.actions.join(", "),
            event.confidence,
            step.timeout_hours as i64,
        )
        .await?;

        Ok(())
    }
}
