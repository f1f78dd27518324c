//! Event Envelope
//!
//! The canonical immutable record that flows through the store, the bus,
//! agents, and projections. Every observable fact in the system is one of
//! these; nothing is mutated outside the store.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use super::DomainError;

/// Closed taxonomy of event types. Strings below are the stable wire
/// identifiers used in HTTP payloads, SOP preconditions, and agent mandates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    // Acquisition
    LeadReceived,
    LeadQualified,
    MeetingScheduled,
    // Intelligence
    MeetingCompleted,
    IntentInferred,
    RiskDetected,
    // Execution
    TaskCreated,
    TaskAssigned,
    TaskCompleted,
    ProjectStarted,
    ProjectAtRisk,
    ProjectCompleted,
    // Financial
    QuoteGenerated,
    QuoteApproved,
    InvoiceIssued,
    PaymentReceived,
    PaymentReminderSent,
    // Control
    HumanApprovalRequested,
    HumanOverride,
    AutonomicDecisionExecuted,
    // Economic / drift
    SopExecutionCompleted,
    SopOptimizationRecommended,
    AutomationOpportunityDetected,
    MarginErosionDetected,
    AutomationRoiCalculated,
    ProcessDriftDetected,
    CeoInterruptRequired,
    // SOP lifecycle
    SopVersionProposed,
    SopVersionActivated,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::LeadReceived => "LEAD_RECEIVED",
            EventType::LeadQualified => "LEAD_QUALIFIED",
            EventType::MeetingScheduled => "MEETING_SCHEDULED",
            EventType::MeetingCompleted => "MEETING_COMPLETED",
            EventType::IntentInferred => "INTENT_INFERRED",
            EventType::RiskDetected => "RISK_DETECTED",
            EventType::TaskCreated => "TASK_CREATED",
            EventType::TaskAssigned => "TASK_ASSIGNED",
            EventType::TaskCompleted => "TASK_COMPLETED",
            EventType::ProjectStarted => "PROJECT_STARTED",
            EventType::ProjectAtRisk => "PROJECT_AT_RISK",
            EventType::ProjectCompleted => "PROJECT_COMPLETED",
            EventType::QuoteGenerated => "QUOTE_GENERATED",
            EventType::QuoteApproved => "QUOTE_APPROVED",
            EventType::InvoiceIssued => "INVOICE_ISSUED",
            EventType::PaymentReceived => "PAYMENT_RECEIVED",
            EventType::PaymentReminderSent => "PAYMENT_REMINDER_SENT",
            EventType::HumanApprovalRequested => "HUMAN_APPROVAL_REQUESTED",
            EventType::HumanOverride => "HUMAN_OVERRIDE",
            EventType::AutonomicDecisionExecuted => "AUTONOMIC_DECISION_EXECUTED",
            EventType::SopExecutionCompleted => "SOP_EXECUTION_COMPLETED",
            EventType::SopOptimizationRecommended => "SOP_OPTIMIZATION_RECOMMENDED",
            EventType::AutomationOpportunityDetected => "AUTOMATION_OPPORTUNITY_DETECTED",
            EventType::MarginErosionDetected => "MARGIN_EROSION_DETECTED",
            EventType::AutomationRoiCalculated => "AUTOMATION_ROI_CALCULATED",
            EventType::ProcessDriftDetected => "PROCESS_DRIFT_DETECTED",
            EventType::CeoInterruptRequired => "CEO_INTERRUPT_REQUIRED",
            EventType::SopVersionProposed => "SOP_VERSION_PROPOSED",
            EventType::SopVersionActivated => "SOP_VERSION_ACTIVATED",
        }
    }

    /// Financial events are subject to the oversight pipeline's financial-limit check.
    pub fn is_financial(&self) -> bool {
        matches!(
            self,
            EventType::QuoteGenerated | EventType::InvoiceIssued | EventType::PaymentReceived
        )
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Severity attached to `RISK_DETECTED` payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// Type-tagged structured payload. One variant per `EventType`; the tag
/// doubles as the wire `event_type` for HTTP ingestion so a caller only
/// needs to post the payload shape, not both the tag and the envelope type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventPayload {
    LeadReceived {
        lead_source: String,
        contact_email: String,
        urgency: String,
        initial_message: String,
    },
    LeadQualified {
        lead_id: Uuid,
        qualification_score: i32,
    },
    MeetingScheduled {
        lead_id: Uuid,
        scheduled_for: DateTime<Utc>,
    },
    MeetingCompleted {
        meeting_id: Uuid,
        sentiment: Sentiment,
        notes: Option<String>,
    },
    IntentInferred {
        subject_id: Uuid,
        intent: String,
    },
    RiskDetected {
        severity: RiskSeverity,
        reason: String,
        source: Option<String>,
    },
    TaskCreated {
        task_id: Uuid,
        title: String,
    },
    TaskAssigned {
        task_id: Uuid,
        assignee: String,
    },
    TaskCompleted {
        task_id: Uuid,
    },
    ProjectStarted {
        project_id: Uuid,
        name: String,
    },
    ProjectAtRisk {
        project_id: Uuid,
        reason: String,
    },
    ProjectCompleted {
        project_id: Uuid,
    },
    QuoteGenerated {
        quote_id: Uuid,
        client_id: Uuid,
        #[serde(alias = "total")]
        amount: Decimal,
    },
    QuoteApproved {
        quote_id: Uuid,
    },
    InvoiceIssued {
        invoice_id: Uuid,
        client_id: Uuid,
        amount: Decimal,
    },
    PaymentReceived {
        invoice_id: Uuid,
        client_id: Uuid,
        amount: Decimal,
    },
    PaymentReminderSent {
        invoice_id: Uuid,
    },
    HumanApprovalRequested {
        approval_id: Uuid,
        reason: String,
    },
    HumanOverride {
        approval_id: Option<Uuid>,
        decision: String,
    },
    AutonomicDecisionExecuted {
        decision_id: Uuid,
        summary: String,
    },
    SopExecutionCompleted {
        sop_id: String,
        outcome: String,
    },
    SopOptimizationRecommended {
        sop_id: String,
        recommendation: String,
    },
    AutomationOpportunityDetected {
        description: String,
    },
    MarginErosionDetected {
        client_id: Uuid,
        erosion_pct: f64,
    },
    AutomationRoiCalculated {
        sop_id: String,
        roi: f64,
    },
    ProcessDriftDetected {
        sop_id: String,
        description: String,
    },
    CeoInterruptRequired {
        reason: String,
    },
    SopVersionProposed {
        sop_id: String,
        version: i32,
    },
    SopVersionActivated {
        sop_id: String,
        version: i32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

impl EventPayload {
    pub fn event_type(&self) -> EventType {
        match self {
            EventPayload::LeadReceived { .. } => EventType::LeadReceived,
            EventPayload::LeadQualified { .. } => EventType::LeadQualified,
            EventPayload::MeetingScheduled { .. } => EventType::MeetingScheduled,
            EventPayload::MeetingCompleted { .. } => EventType::MeetingCompleted,
            EventPayload::IntentInferred { .. } => EventType::IntentInferred,
            EventPayload::RiskDetected { .. } => EventType::RiskDetected,
            EventPayload::TaskCreated { .. } => EventType::TaskCreated,
            EventPayload::TaskAssigned { .. } => EventType::TaskAssigned,
            EventPayload::TaskCompleted { .. } => EventType::TaskCompleted,
            EventPayload::ProjectStarted { .. } => EventType::ProjectStarted,
            EventPayload::ProjectAtRisk { .. } => EventType::ProjectAtRisk,
            EventPayload::ProjectCompleted { .. } => EventType::ProjectCompleted,
            EventPayload::QuoteGenerated { .. } => EventType::QuoteGenerated,
            EventPayload::QuoteApproved { .. } => EventType::QuoteApproved,
            EventPayload::InvoiceIssued { .. } => EventType::InvoiceIssued,
            EventPayload::PaymentReceived { .. } => EventType::PaymentReceived,
            EventPayload::PaymentReminderSent { .. } => EventType::PaymentReminderSent,
            EventPayload::HumanApprovalRequested { .. } => EventType::HumanApprovalRequested,
            EventPayload::HumanOverride { .. } => EventType::HumanOverride,
            EventPayload::AutonomicDecisionExecuted { .. } => EventType::AutonomicDecisionExecuted,
            EventPayload::SopExecutionCompleted { .. } => EventType::SopExecutionCompleted,
            EventPayload::SopOptimizationRecommended { .. } => {
                EventType::SopOptimizationRecommended
            }
            EventPayload::AutomationOpportunityDetected { .. } => {
                EventType::AutomationOpportunityDetected
            }
            EventPayload::MarginErosionDetected { .. } => EventType::MarginErosionDetected,
            EventPayload::AutomationRoiCalculated { .. } => EventType::AutomationRoiCalculated,
            EventPayload::ProcessDriftDetected { .. } => EventType::ProcessDriftDetected,
            EventPayload::CeoInterruptRequired { .. } => EventType::CeoInterruptRequired,
            EventPayload::SopVersionProposed { .. } => EventType::SopVersionProposed,
            EventPayload::SopVersionActivated { .. } => EventType::SopVersionActivated,
        }
    }

    /// Financial amount carried by this payload, if any.
    pub fn financial_amount(&self) -> Option<Decimal> {
        match self {
            EventPayload::QuoteGenerated { amount, .. }
            | EventPayload::InvoiceIssued { amount, .. }
            | EventPayload::PaymentReceived { amount, .. } => Some(*amount),
            _ => None,
        }
    }

    pub fn risk_severity(&self) -> Option<RiskSeverity> {
        match self {
            EventPayload::RiskDetected { severity, .. } => Some(*severity),
            _ => None,
        }
    }

    /// Client identity carried by this payload, if any. Used by the SSE
    /// egress surface's role-based filtering for the `client` role.
    pub fn client_id(&self) -> Option<Uuid> {
        match self {
            EventPayload::QuoteGenerated { client_id, .. }
            | EventPayload::InvoiceIssued { client_id, .. }
            | EventPayload::PaymentReceived { client_id, .. }
            | EventPayload::MarginErosionDetected { client_id, .. } => Some(*client_id),
            _ => None,
        }
    }
}

/// Identity of whoever produced an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Emitter {
    Agent { agent_id: String },
    Human { user_id: String },
    System,
    Workflow { workflow_id: String },
}

impl std::fmt::Display for Emitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Emitter::Agent { agent_id } => write!(f, "agent:{agent_id}"),
            Emitter::Human { user_id } => write!(f, "human:{user_id}"),
            Emitter::System => write!(f, "system"),
            Emitter::Workflow { workflow_id } => write!(f, "workflow:{workflow_id}"),
        }
    }
}

/// Free-form annotations attached to an envelope; never interpreted by the
/// store or bus, only forwarded.
pub type Metadata = HashMap<String, serde_json::Value>;

/// The canonical, immutable event record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_id: Uuid,
    pub event_type: EventType,
    pub aggregate_type: String,
    pub aggregate_id: Uuid,
    /// Assigned exclusively by the store at append; `0` before append.
    pub sequence_number: i64,
    pub correlation_id: Uuid,
    pub causation_id: Option<Uuid>,
    pub payload: EventPayload,
    #[serde(default)]
    pub metadata: Metadata,
    pub emitted_by: Emitter,
    pub confidence: f64,
    pub requires_human: bool,
    pub timestamp: DateTime<Utc>,
    /// Set by the store on persistence; `None` before append.
    pub created_at: Option<DateTime<Utc>>,
}

impl EventEnvelope {
    /// Construct a new, unsequenced envelope. Does NOT assign `sequence_number`
    /// or `created_at` — those are the store's exclusive responsibility.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        aggregate_type: impl Into<String>,
        aggregate_id: Uuid,
        payload: EventPayload,
        emitted_by: Emitter,
        confidence: f64,
        requires_human: bool,
    ) -> Self {
        let event_id = Uuid::new_v4();
        Self {
            event_id,
            event_type: payload.event_type(),
            aggregate_type: aggregate_type.into(),
            aggregate_id,
            sequence_number: 0,
            correlation_id: event_id,
            causation_id: None,
            payload,
            metadata: Metadata::new(),
            emitted_by,
            confidence,
            requires_human,
            timestamp: Utc::now(),
            created_at: None,
        }
    }

    /// Attach a causation parent and inherit its correlation id, chaining
    /// this event into the parent's causal workflow.
    pub fn caused_by(mut self, parent: &EventEnvelope) -> Self {
        self.causation_id = Some(parent.event_id);
        self.correlation_id = parent.correlation_id;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Structural validation per the envelope contract. Rejects missing
/// required fields, out-of-range confidence, and a payload tag that
/// disagrees with `event_type`.
pub fn validate(envelope: &EventEnvelope) -> Result<(), DomainError> {
    if !(0.0..=1.0).contains(&envelope.confidence) {
        return Err(DomainError::Validation(format!(
            "confidence must be in [0,1], got {}",
            envelope.confidence
        )));
    }

    if envelope.payload.event_type() != envelope.event_type {
        return Err(DomainError::Validation(format!(
            "payload tag {:?} does not match event_type {:?}",
            envelope.payload.event_type(),
            envelope.event_type
        )));
    }

    if envelope.aggregate_type.trim().is_empty() {
        return Err(DomainError::Validation(
            "aggregate_type must not be empty".to_string(),
        ));
    }

    if let EventPayload::RiskDetected { reason, .. } = &envelope.payload {
        if reason.trim().is_empty() {
            return Err(DomainError::Validation(
                "RISK_DETECTED reason must not be empty".to_string(),
            ));
        }
    }

    Ok(())
}
