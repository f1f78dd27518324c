//! Agent Mandate

use crate::domain::EventType;

/// Declares what an agent is authorised to consume and produce. The runtime
/// enforces this at the edges — `AgentContext::emit` rejects anything
/// outside `emits` (besides the universal `RISK_DETECTED`), and subscription
/// registration uses `subscribes`/`wildcard` to decide what the agent sees.
#[derive(Debug, Clone)]
pub struct AgentMandate {
    pub name: String,
    pub description: String,
    /// Event types this agent subscribes to. Empty + `wildcard = false`
    /// means the agent receives nothing until configured; empty +
    /// `wildcard = true` is the explicit opt-in to see everything.
    pub subscribes: Vec<EventType>,
    pub wildcard: bool,
    pub emits: Vec<EventType>,
    pub confidence_threshold: f64,
}

impl AgentMandate {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            subscribes: Vec::new(),
            wildcard: false,
            emits: Vec::new(),
            confidence_threshold: 0.0,
        }
    }

    pub fn subscribing_to(mut self, types: Vec<EventType>) -> Self {
        self.subscribes = types;
        self
    }

    pub fn wildcard(mut self) -> Self {
        self.wildcard = true;
        self
    }

    pub fn emitting(mut self, types: Vec<EventType>) -> Self {
        self.emits = types;
        self
    }

    pub fn with_confidence_threshold(mut self, threshold: f64) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    pub fn may_emit(&self, event_type: EventType) -> bool {
        event_type == EventType::RiskDetected || self.emits.contains(&event_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn may_emit_always_allows_risk_detected() {
        let mandate = AgentMandate::new("intake", "qualifies leads").emitting(vec![EventType::LeadQualified]);
        assert!(mandate.may_emit(EventType::RiskDetected));
        assert!(mandate.may_emit(EventType::LeadQualified));
        assert!(!mandate.may_emit(EventType::PaymentReceived));
    }
}
