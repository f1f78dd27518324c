//! Resolution context
//!
//! The business-level context a caller supplies to `SopRegistry::resolve`,
//! matched against a SOP's `preconditions`. Distinct from
//! `domain::RequestContext`, which is HTTP/tracing metadata.

use rust_decimal::Decimal;
use std::collections::HashMap;

use crate::domain::EventEnvelope;

#[derive(Debug, Clone, Default)]
pub struct ResolutionContext {
    pub entity_type: Option<String>,
    pub client_tier: Option<String>,
    pub budget: Option<Decimal>,
    pub service_type: Option<String>,
    pub custom: HashMap<String, String>,
}

impl ResolutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive a resolution context straight from the triggering event:
    /// `entity_type` from its aggregate type, `budget` from any financial
    /// amount it carries. Callers can still override individual fields
    /// (client tier, service type) before matching.
    pub fn from_event(event: &EventEnvelope) -> Self {
        Self {
            entity_type: Some(event.aggregate_type.clone()),
            budget: event.payload.financial_amount(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Emitter, EventPayload};
    use uuid::Uuid;

    #[test]
    fn from_event_derives_entity_type_from_aggregate_type() {
        let event = EventEnvelope::new(
            "lead",
            Uuid::new_v4(),
            EventPayload::LeadReceived {
                lead_source: "web".into(),
                contact_email: "a@b".into(),
                urgency: "high".into(),
                initial_message: "hi".into(),
            },
            Emitter::System,
            0.9,
            false,
        );

        let ctx = ResolutionContext::from_event(&event);
        assert_eq!(ctx.entity_type.as_deref(), Some("lead"));
        assert!(ctx.budget.is_none());
    }

    #[test]
    fn from_event_derives_budget_from_financial_payload() {
        let event = EventEnvelope::new(
            "client",
            Uuid::new_v4(),
            EventPayload::QuoteGenerated {
                quote_id: Uuid::new_v4(),
                client_id: Uuid::new_v4(),
                amount: Decimal::new(50_000, 0),
            },
            Emitter::System,
            0.9,
            false,
        );

        let ctx = ResolutionContext::from_event(&event);
        assert_eq!(ctx.entity_type.as_deref(), Some("client"));
        assert_eq!(ctx.budget, Some(Decimal::new(50_000, 0)));
    }
}
