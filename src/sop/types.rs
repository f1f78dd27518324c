//! SOP definition types
//!
//! A Standard Operating Procedure is a declarative, versioned contract. It is
//! loaded from an external source (filesystem or database), never
//! constructed ad-hoc by an agent.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::EventType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutomationLevel {
    Full,
    Assisted,
    Manual,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Preconditions {
    #[serde(default)]
    pub event_types: Vec<EventType>,
    #[serde(default)]
    pub entity_types: Vec<String>,
    #[serde(default)]
    pub client_tier: Option<String>,
    #[serde(default)]
    pub budget_min: Option<Decimal>,
    #[serde(default)]
    pub budget_max: Option<Decimal>,
    #[serde(default)]
    pub service_type: Option<String>,
    /// Arbitrary key/value predicates matched against `EventEnvelope::metadata`.
    #[serde(default)]
    pub custom: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SopStep {
    pub id: String,
    pub automation_level: AutomationLevel,
    pub responsible_agent: String,
    #[serde(default)]
    pub requires_human: bool,
    pub timeout_hours: u32,
    #[serde(default)]
    pub actions: Vec<String>,
    #[serde(default)]
    pub failure_handling: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationPolicy {
    #[serde(default)]
    pub allowed_actions: Vec<String>,
    #[serde(default)]
    pub forbidden_actions: Vec<String>,
    pub confidence_threshold: f64,
    #[serde(default)]
    pub financial_limit: Option<Decimal>,
    #[serde(default)]
    pub dual_approval: bool,
    #[serde(default)]
    pub time_restrictions: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationRule {
    pub trigger: String,
    pub action: String,
    #[serde(default)]
    pub notify: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SopMetrics {
    #[serde(default)]
    pub targets: HashMap<String, f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SopMetadata {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub owner: Option<String>,
}

/// A declarative, versioned SOP. Loaded from `SopSource`, never mutated in
/// place — a new version supersedes the prior one without deleting it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SopDefinition {
    pub id: String,
    pub version: i32,
    pub active: bool,
    pub metadata: SopMetadata,
    pub preconditions: Preconditions,
    pub steps: Vec<SopStep>,
    pub automation_policy: AutomationPolicy,
    #[serde(default)]
    pub escalation_rules: Vec<EscalationRule>,
    #[serde(default)]
    pub metrics: SopMetrics,
}

impl SopDefinition {
    pub fn step(&self, step_id: &str) -> Option<&SopStep> {
        self.steps.iter().find(|s| s.id == step_id)
    }

    pub fn escalation_rule_for(&self, trigger: &str) -> Option<&EscalationRule> {
        self.escalation_rules.iter().find(|r| r.trigger == trigger)
    }

    /// Structural validation against the schema described above; invalid
    /// definitions are refused by the registry at load time.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("SOP id must not be empty".to_string());
        }
        if self.steps.is_empty() {
            return Err(format!("SOP {} has no steps", self.id));
        }
        if !(0.0..=1.0).contains(&self.automation_policy.confidence_threshold) {
            return Err(format!(
                "SOP {} automation_policy.confidence_threshold must be in [0,1]",
                self.id
            ));
        }
        let mut seen_step_ids = std::collections::HashSet::new();
        for step in &self.steps {
            if step.id.trim().is_empty() {
                return Err(format!("SOP {} has a step with an empty id", self.id));
            }
            if !seen_step_ids.insert(&step.id) {
                return Err(format!("SOP {} has duplicate step id {}", self.id, step.id));
            }
        }
        Ok(())
    }
}
