//! Intake Agent
//!
//! Qualifies inbound leads. A rich, clearly urgent message is auto-qualified
//! and followed by a scheduled meeting; a thin message is routed to a human
//! via the approval queue instead of being qualified automatically.

use async_trait::async_trait;
use chrono::{Duration, Utc};

use crate::domain::{EventEnvelope, EventPayload, EventType};

use super::context::AgentContext;
use super::error::AgentError;
use super::mandate::AgentMandate;
use super::runtime::Agent;

pub const AGENT_ID: &str = "intake";

/// Minimum confidence required to qualify a lead without human review.
const AUTO_QUALIFY_THRESHOLD: f64 = 0.85;

pub struct IntakeAgent {
    confidence_threshold: f64,
}

impl IntakeAgent {
    pub fn new(confidence_threshold: f64) -> Self {
        Self { confidence_threshold }
    }
}

/// Heuristic: a longer, clearly-worded message with high urgency scores
/// higher. Confidence and qualification_score track together so "score ≥ 80"
/// and "confidence ≥ 0.85" move in lockstep.
fn qualify(payload: &EventPayload) -> (i32, f64) {
    match payload {
        EventPayload::LeadReceived { initial_message, urgency, .. } => {
            let word_count = initial_message.split_whitespace().count() as f64;
            let urgency_bonus = if urgency.eq_ignore_ascii_case("high") { 0.05 } else { 0.0 };
            let confidence = (0.5 + 0.05 * word_count + urgency_bonus).min(0.97);
            let score = (confidence * 100.0).round() as i32;
            (score, confidence)
        }
        _ => (0, 0.0),
    }
}

#[async_trait]
impl Agent for IntakeAgent {
    fn mandate(&self) -> AgentMandate {
        AgentMandate::new(AGENT_ID, "Qualifies inbound leads and schedules follow-up meetings")
            .subscribing_to(vec![EventType::LeadReceived])
            .emitting(vec![EventType::LeadQualified, EventType::MeetingScheduled])
            .with_confidence_threshold(self.confidence_threshold)
    }

    async fn process(&self, event: &EventEnvelope, ctx: &AgentContext) -> Result<(), AgentError> {
        let (score, confidence) = qualify(&event.payload);
        let lead_id = event.aggregate_id;

        if confidence >= AUTO_QUALIFY_THRESHOLD {
            ctx.emit(
                event.aggregate_type.clone(),
                lead_id,
                EventPayload::LeadQualified {
                    lead_id,
                    qualification_score: score,
                },
                confidence,
                false,
                Some(event),
            )
            .await?;

            ctx.emit(
                event.aggregate_type.clone(),
                lead_id,
                EventPayload::MeetingScheduled {
                    lead_id,
                    scheduled_for: Utc::now() + Duration::days(2),
                },
                confidence,
                false,
                Some(event),
            )
            .await?;
        } else {
            ctx.request_approval(
                event,
                "lead qualification confidence below automatic threshold",
                serde_json::json!({
                    "request_type": "lead_qualification",
                    "qualification_score": score,
                }),
                "qualify_lead",
                confidence,
                24,
            )
            .await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Sentiment;
    use uuid::Uuid;

    fn lead_event(initial_message: &str, urgency: &str) -> EventEnvelope {
        EventEnvelope::new(
            "lead",
            Uuid::new_v4(),
            EventPayload::LeadReceived {
                lead_source: "web".into(),
                contact_email: "a@b".into(),
                urgency: urgency.into(),
                initial_message: initial_message.into(),
            },
            crate::domain::Emitter::System,
            1.0,
            false,
        )
    }

    #[test]
    fn rich_message_qualifies_above_threshold() {
        let event = lead_event(
            "Hello, I am very interested in your consulting services for our upcoming project",
            "high",
        );
        let (score, confidence) = qualify(&event.payload);
        assert!(confidence >= AUTO_QUALIFY_THRESHOLD, "confidence was {confidence}");
        assert!(score >= 80, "score was {score}");
    }

    #[test]
    fn thin_message_falls_below_threshold() {
        let event = lead_event("hi", "low");
        let (_, confidence) = qualify(&event.payload);
        assert!(confidence <= 0.75, "confidence was {confidence}");
    }

    #[test]
    fn non_lead_payload_scores_zero() {
        let payload = EventPayload::MeetingCompleted {
            meeting_id: Uuid::new_v4(),
            sentiment: Sentiment::Positive,
            notes: None,
        };
        assert_eq!(qualify(&payload), (0, 0.0));
    }
}
