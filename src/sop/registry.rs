//! SOP Registry
//!
//! Holds the active set of loaded SOP definitions and resolves them against
//! incoming events. Reload replaces the whole set atomically so a resolve
//! in flight never observes a half-updated registry.

use std::sync::RwLock;

use crate::domain::EventEnvelope;

use super::context::ResolutionContext;
use super::source::{SopSource, SopSourceError};
use super::types::{AutomationLevel, EscalationRule, Preconditions, SopDefinition};

#[derive(Debug, thiserror::Error)]
pub enum SopRegistryError {
    #[error("SOP source error: {0}")]
    Source(#[from] SopSourceError),

    #[error("invalid SOP definition: {0}")]
    Invalid(String),
}

pub struct SopRegistry {
    source: Box<dyn SopSource>,
    definitions: RwLock<Vec<SopDefinition>>,
}

impl SopRegistry {
    /// Loads and validates every definition at construction. An invalid
    /// definition refuses the whole load — a registry is either fully
    /// trustworthy or not constructed.
    pub async fn load(source: Box<dyn SopSource>) -> Result<Self, SopRegistryError> {
        let definitions = load_and_validate(source.as_ref()).await?;
        Ok(Self {
            source,
            definitions: RwLock::new(definitions),
        })
    }

    /// Reload from source, replacing the active set. Already-resolved SOPs
    /// held by callers are unaffected; only future `resolve` calls see the
    /// new versions.
    pub async fn reload(&self) -> Result<(), SopRegistryError> {
        let definitions = load_and_validate(self.source.as_ref()).await?;
        *self.definitions.write().expect("SOP registry lock poisoned") = definitions;
        Ok(())
    }

    /// Returns the first active SOP whose preconditions match, in stable
    /// id order, or `None`.
    pub fn resolve(&self, event: &EventEnvelope, context: &ResolutionContext) -> Option<SopDefinition> {
        let definitions = self.definitions.read().expect("SOP registry lock poisoned");
        definitions
            .iter()
            .filter(|sop| sop.active)
            .find(|sop| preconditions_match(&sop.preconditions, event, context))
            .cloned()
    }

    pub fn can_automate(&self, sop: &SopDefinition, step_id: &str, confidence: f64) -> bool {
        match sop.step(step_id) {
            Some(step) => {
                step.automation_level != AutomationLevel::Manual
                    && !step.requires_human
                    && confidence >= sop.automation_policy.confidence_threshold
            }
            None => false,
        }
    }

    pub fn escalation_rule_for<'a>(
        &self,
        sop: &'a SopDefinition,
        trigger: &str,
    ) -> Option<&'a EscalationRule> {
        sop.escalation_rule_for(trigger)
    }

    pub fn len(&self) -> usize {
        self.definitions.read().expect("SOP registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

async fn load_and_validate(source: &dyn SopSource) -> Result<Vec<SopDefinition>, SopRegistryError> {
    let definitions = source.load_all().await?;
    for definition in &definitions {
        definition
            .validate()
            .map_err(SopRegistryError::Invalid)?;
    }
    // Stable-by-id iteration order is a contract of `resolve`, not an
    // accident of load order.
    let mut definitions = definitions;
    definitions.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(definitions)
}

fn preconditions_match(
    preconditions: &Preconditions,
    event: &EventEnvelope,
    context: &ResolutionContext,
) -> bool {
    if !preconditions.event_types.is_empty() && !preconditions.event_types.contains(&event.event_type) {
        return false;
    }

    if !preconditions.entity_types.is_empty() {
        match &context.entity_type {
            Some(entity_type) if preconditions.entity_types.iter().any(|t| t == entity_type) => {}
            _ => return false,
        }
    }

    if let Some(tier) = &preconditions.client_tier {
        if context.client_tier.as_deref() != Some(tier.as_str()) {
            return false;
        }
    }

    if let Some(service_type) = &preconditions.service_type {
        if context.service_type.as_deref() != Some(service_type.as_str()) {
            return false;
        }
    }

    if let Some(budget) = context.budget {
        if let Some(min) = preconditions.budget_min {
            if budget < min {
                return false;
            }
        }
        if let Some(max) = preconditions.budget_max {
            if budget > max {
                return false;
            }
        }
    }

    for (key, expected) in &preconditions.custom {
        match context.custom.get(key) {
            Some(actual) if actual == expected => {}
            _ => return false,
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Emitter, EventPayload};
    use crate::sop::types::{AutomationPolicy, SopMetadata, SopMetrics, SopStep};
    use async_trait::async_trait;
    use uuid::Uuid;

    struct StaticSource(Vec<SopDefinition>);

    #[async_trait]
    impl SopSource for StaticSource {
        async fn load_all(&self) -> Result<Vec<SopDefinition>, SopSourceError> {
            Ok(self.0.clone())
        }
    }

    fn sop(id: &str, event_types: Vec<crate::domain::EventType>) -> SopDefinition {
        SopDefinition {
            id: id.to_string(),
            version: 1,
            active: true,
            metadata: SopMetadata {
                name: id.to_string(),
                description: String::new(),
                owner: None,
            },
            preconditions: Preconditions {
                event_types,
                ..Default::default()
            },
            steps: vec![SopStep {
                id: "only_step".into(),
                automation_level: AutomationLevel::Full,
                responsible_agent: "intake".into(),
                requires_human: false,
                timeout_hours: 24,
                actions: vec![],
                failure_handling: None,
            }],
            automation_policy: AutomationPolicy {
                allowed_actions: vec![],
                forbidden_actions: vec![],
                confidence_threshold: 0.7,
                financial_limit: None,
                dual_approval: false,
                time_restrictions: None,
            },
            escalation_rules: vec![],
            metrics: SopMetrics::default(),
        }
    }

    fn lead_event() -> EventEnvelope {
        EventEnvelope::new(
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
        )
    }

    #[tokio::test]
    async fn resolve_picks_first_matching_sop_in_stable_id_order() {
        let registry = SopRegistry::load(Box::new(StaticSource(vec![
            sop("z-sop", vec![crate::domain::EventType::LeadReceived]),
            sop("a-sop", vec![crate::domain::EventType::LeadReceived]),
        ])))
        .await
        .unwrap();

        let resolved = registry.resolve(&lead_event(), &ResolutionContext::new());
        assert_eq!(resolved.unwrap().id, "a-sop");
    }

    #[tokio::test]
    async fn resolve_returns_none_when_no_sop_matches() {
        let registry = SopRegistry::load(Box::new(StaticSource(vec![sop(
            "only",
            vec![crate::domain::EventType::TaskCreated],
        )])))
        .await
        .unwrap();

        assert!(registry.resolve(&lead_event(), &ResolutionContext::new()).is_none());
    }

    #[tokio::test]
    async fn can_automate_requires_non_manual_no_human_and_confidence() {
        let registry = SopRegistry::load(Box::new(StaticSource(vec![sop(
            "only",
            vec![crate::domain::EventType::LeadReceived],
        )])))
        .await
        .unwrap();
        let sop = registry.resolve(&lead_event(), &ResolutionContext::new()).unwrap();

        assert!(registry.can_automate(&sop, "only_step", 0.8));
        assert!(!registry.can_automate(&sop, "only_step", 0.5));
        assert!(!registry.can_automate(&sop, "missing_step", 0.9));
    }

    #[tokio::test]
    async fn load_rejects_invalid_definition() {
        let mut bad = sop("bad", vec![]);
        bad.steps.clear();
        let result = SopRegistry::load(Box::new(StaticSource(vec![bad]))).await;
        assert!(result.is_err());
    }
}
