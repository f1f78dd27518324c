//! Client Health projection
//!
//! Tracks a running health score per client aggregate from the events that
//! touch it. Scores start at 50 and are nudged by meetings, project
//! milestones, payments, and detected risk; clamped to [0, 100].

use crate::domain::{EventEnvelope, EventType, RiskSeverity, Sentiment};

use super::engine::Projection;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy)]
pub struct ClientHealthState {
    pub health_score: i32,
}

impl ClientHealthState {
    pub fn status(&self) -> HealthStatus {
        if self.health_score >= 70 {
            HealthStatus::Healthy
        } else if self.health_score >= 40 {
            HealthStatus::Warning
        } else {
            HealthStatus::Critical
        }
    }

    fn adjust(self, delta: i32) -> Self {
        Self {
            health_score: (self.health_score + delta).clamp(0, 100),
        }
    }
}

impl Default for ClientHealthState {
    fn default() -> Self {
        Self { health_score: 50 }
    }
}

pub struct ClientHealthView;

impl Projection for ClientHealthView {
    type State = ClientHealthState;

    fn name(&self) -> &'static str {
        "client_health"
    }

    fn subscribed_types(&self) -> Vec<EventType> {
        vec![
            EventType::MeetingCompleted,
            EventType::ProjectStarted,
            EventType::ProjectAtRisk,
            EventType::PaymentReceived,
            EventType::RiskDetected,
        ]
    }

    fn apply(&self, event: &EventEnvelope, state: Self::State) -> Self::State {
        match &event.payload {
            crate::domain::EventPayload::MeetingCompleted { sentiment, .. } => {
                if *sentiment == Sentiment::Positive {
                    state.adjust(5)
                } else {
                    state
                }
            }
            crate::domain::EventPayload::ProjectStarted { .. } => state.adjust(10),
            crate::domain::EventPayload::ProjectAtRisk { .. } => state.adjust(-15),
            crate::domain::EventPayload::PaymentReceived { .. } => state.adjust(3),
            crate::domain::EventPayload::RiskDetected { severity, .. }
                if matches!(severity, RiskSeverity::High | RiskSeverity::Critical) =>
            {
                state.adjust(-20)
            }
            _ => state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Emitter, EventPayload};
    use uuid::Uuid;

    fn event(payload: EventPayload) -> EventEnvelope {
        EventEnvelope::new("client", Uuid::new_v4(), payload, Emitter::System, 0.9, false)
    }

    #[test]
    fn default_state_starts_at_fifty() {
        assert_eq!(ClientHealthState::default().health_score, 50);
    }

    #[test]
    fn replay_sequence_matches_worked_example() {
        let view = ClientHealthView;
        let mut state = ClientHealthState::default();

        state = view.apply(
            &event(EventPayload::ProjectStarted {
                project_id: Uuid::new_v4(),
                name: "Acme rollout".into(),
            }),
            state,
        );
        state = view.apply(
            &event(EventPayload::MeetingCompleted {
                meeting_id: Uuid::new_v4(),
                sentiment: Sentiment::Positive,
                notes: None,
            }),
            state,
        );
        state = view.apply(
            &event(EventPayload::PaymentReceived {
                invoice_id: Uuid::new_v4(),
                client_id: Uuid::new_v4(),
                amount: rust_decimal::Decimal::new(5000, 0),
            }),
            state,
        );
        state = view.apply(
            &event(EventPayload::RiskDetected {
                severity: RiskSeverity::High,
                reason: "late delivery".into(),
                source: None,
            }),
            state,
        );

        assert_eq!(state.health_score, 48);
        assert_eq!(state.status(), HealthStatus::Warning);
    }

    #[test]
    fn score_clamps_at_upper_bound() {
        let view = ClientHealthView;
        let mut state = ClientHealthState { health_score: 95 };
        for _ in 0..5 {
            state = view.apply(
                &event(EventPayload::ProjectStarted {
                    project_id: Uuid::new_v4(),
                    name: "x".into(),
                }),
                state,
            );
        }
        assert_eq!(state.health_score, 100);
    }

    #[test]
    fn negative_sentiment_meeting_does_not_adjust_score() {
        let view = ClientHealthView;
        let state = view.apply(
            &event(EventPayload::MeetingCompleted {
                meeting_id: Uuid::new_v4(),
                sentiment: Sentiment::Negative,
                notes: None,
            }),
            ClientHealthState::default(),
        );
        assert_eq!(state.health_score, 50);
    }
}
