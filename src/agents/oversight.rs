//! Oversight Agent
//!
//! Subscribes to everything and decides, per event, whether it can proceed
//! autonomously or must escalate to a human. Ignores its own emissions and
//! `HUMAN_APPROVAL_REQUESTED` events to avoid escalation ping-pong.

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::domain::{Emitter, EventEnvelope, EventPayload, EventType, RiskSeverity};

use super::context::AgentContext;
use super::decision_log::{DecisionLog, DecisionOutcome};
use super::error::AgentError;
use super::mandate::AgentMandate;
use super::runtime::Agent;

pub const AGENT_ID: &str = "oversight";

pub struct OversightAgent {
    confidence_threshold: f64,
    financial_limit: Decimal,
    auto_decision_threshold: f64,
    decisions: DecisionLog,
}

impl OversightAgent {
    pub fn new(confidence_threshold: f64, financial_limit: Decimal) -> Self {
        Self {
            confidence_threshold,
            financial_limit,
            auto_decision_threshold: 0.9,
            decisions: DecisionLog::new(),
        }
    }

    pub fn decisions(&self) -> &DecisionLog {
        &self.decisions
    }

    fn is_own_emission(&self, event: &EventEnvelope) -> bool {
        matches!(&event.emitted_by, Emitter::Agent { agent_id } if agent_id == AGENT_ID)
    }

    async fn escalate(
        &self,
        event: &EventEnvelope,
        ctx: &AgentContext,
        reason: String,
    ) -> Result<(), AgentError> {
        ctx.request_approval(
            event,
            reason.clone(),
            serde_json::json!({
                "request_type": "oversight_escalation",
                "event_type": event.event_type.as_str(),
            }),
            "review_and_decide",
            event.confidence,
            24,
        )
        .await?;
        self.decisions
            .record(event.event_id, DecisionOutcome::Escalated, reason);
        Ok(())
    }

    async fn approve(&self, event: &EventEnvelope, ctx: &AgentContext) -> Result<(), AgentError> {
        self.decisions.record(
            event.event_id,
            DecisionOutcome::Approved,
            format!("auto-approved {}", event.event_type),
        );

        if event.confidence >= self.auto_decision_threshold {
            ctx.emit(
                event.aggregate_type.clone(),
                event.aggregate_id,
                EventPayload::AutonomicDecisionExecuted {
                    decision_id: event.event_id,
                    summary: format!("autonomic execution of {}", event.event_type),
                },
                event.confidence,
                false,
                Some(event),
            )
            .await?;
        }

        Ok(())
    }
}

#[async_trait]
impl Agent for OversightAgent {
    fn mandate(&self) -> AgentMandate {
        AgentMandate::new(AGENT_ID, "Evaluates every event for autonomous execution or escalation")
            .wildcard()
            .emitting(vec![
                EventType::HumanApprovalRequested,
                EventType::AutonomicDecisionExecuted,
                EventType::RiskDetected,
            ])
            .with_confidence_threshold(self.confidence_threshold)
    }

    async fn process(&self, event: &EventEnvelope, ctx: &AgentContext) -> Result<(), AgentError> {
        if self.is_own_emission(event) {
            return Ok(());
        }
        // Ping-pong guard: never escalate on the escalation request itself.
        if event.event_type == EventType::HumanApprovalRequested {
            return Ok(());
        }

        if event.confidence < self.confidence_threshold {
            return self
                .escalate(event, ctx, format!("confidence {} below oversight threshold", event.confidence))
                .await;
        }

        if event.requires_human {
            return self.escalate(event, ctx, "event flagged requires_human".to_string()).await;
        }

        if event.event_type.is_financial() {
            if let Some(amount) = event.payload.financial_amount() {
                if amount > self.financial_limit {
                    return self
                        .escalate(
                            event,
                            ctx,
                            format!(
                                "amount {amount} exceeds financial limit {}",
                                self.financial_limit
                            ),
                        )
                        .await;
                }
            }
        }

        if let Some(RiskSeverity::Critical) = event.payload.risk_severity() {
            return self
                .escalate(event, ctx, "critical risk detected".to_string())
                .await;
        }

        if event.event_type == EventType::HumanOverride {
            return self.approve(event, ctx).await;
        }

        self.approve(event, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn agent() -> OversightAgent {
        OversightAgent::new(0.75, dec!(10000))
    }

    fn risk_event(severity: RiskSeverity) -> EventEnvelope {
        EventEnvelope::new(
            "system",
            Uuid::nil(),
            EventPayload::RiskDetected {
                severity,
                reason: "test".into(),
                source: None,
            },
            Emitter::System,
            0.95,
            false,
        )
    }

    #[test]
    fn own_emission_is_recognised() {
        let a = agent();
        let mut event = risk_event(RiskSeverity::Low);
        event.emitted_by = Emitter::Agent { agent_id: AGENT_ID.to_string() };
        assert!(a.is_own_emission(&event));
    }

    #[test]
    fn mandate_allows_universal_risk_detected_emission() {
        let a = agent();
        assert!(a.mandate().may_emit(EventType::RiskDetected));
    }

    // Full evaluation-order behaviour (escalate vs approve, approval row
    // creation, AUTONOMIC_DECISION_EXECUTED emission) is exercised in the
    // integration suite against a real store, since it requires a database.
}
