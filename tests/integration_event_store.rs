//! Integration tests for the event store and approval queue.

use autonomic_engine::domain::{Emitter, EventEnvelope, EventPayload};
use autonomic_engine::event_store::{ApprovalStore, Decision, EventFilter, EventStore};
use chrono::{Duration as ChronoDuration, Utc};
use uuid::Uuid;

mod common;

#[tokio::test]
async fn test_event_store_append_and_load() {
    let pool = common::setup_test_db().await;
    let store = EventStore::new(pool);

    let lead_id = Uuid::new_v4();
    let envelope = EventEnvelope::new(
        "lead",
        lead_id,
        EventPayload::LeadReceived {
            lead_source: "web".into(),
            contact_email: "prospect@example.com".into(),
            urgency: "high".into(),
            initial_message: "Interested in the enterprise plan".into(),
        },
        Emitter::System,
        0.95,
        false,
    );

    let stored = store.append(envelope).await.unwrap();
    assert_eq!(stored.sequence_number, 1);
    assert!(stored.created_at.is_some());

    let history = store.stream_aggregate("lead", lead_id, 0).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].event_id, stored.event_id);

    let fetched = store.get_by_id(stored.event_id).await.unwrap();
    assert!(fetched.is_some());
}

#[tokio::test]
async fn test_event_store_sequence_numbers_increase_per_aggregate() {
    let pool = common::setup_test_db().await;
    let store = EventStore::new(pool);

    let lead_id = Uuid::new_v4();
    let first = EventEnvelope::new(
        "lead",
        lead_id,
        EventPayload::LeadReceived {
            lead_source: "referral".into(),
            contact_email: "a@example.com".into(),
            urgency: "low".into(),
            initial_message: "hi".into(),
        },
        Emitter::System,
        0.9,
        false,
    );
    let stored_first = store.append(first).await.unwrap();

    let second = EventEnvelope::new(
        "lead",
        lead_id,
        EventPayload::LeadQualified {
            lead_id,
            qualification_score: 80,
        },
        Emitter::Agent { agent_id: "intake".into() },
        0.9,
        false,
    )
    .caused_by(&stored_first);
    let stored_second = store.append(second).await.unwrap();

    assert_eq!(stored_first.sequence_number, 1);
    assert_eq!(stored_second.sequence_number, 2);
    assert_eq!(stored_second.causation_id, Some(stored_first.event_id));
    assert_eq!(stored_second.correlation_id, stored_first.correlation_id);
}

#[tokio::test]
async fn test_event_store_query_filters_by_aggregate() {
    let pool = common::setup_test_db().await;
    let store = EventStore::new(pool);

    let lead_id = Uuid::new_v4();
    let other_lead_id = Uuid::new_v4();

    for id in [lead_id, other_lead_id] {
        let envelope = EventEnvelope::new(
            "lead",
            id,
            EventPayload::LeadReceived {
                lead_source: "web".into(),
                contact_email: "a@example.com".into(),
                urgency: "medium".into(),
                initial_message: "hi".into(),
            },
            Emitter::System,
            0.9,
            false,
        );
        store.append(envelope).await.unwrap();
    }

    let filter = EventFilter::new().with_aggregate("lead", lead_id);
    let events = store.query(&filter).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].aggregate_id, lead_id);
}

#[tokio::test]
async fn test_approval_create_resolve_and_sweep() {
    let pool = common::setup_test_db().await;
    let store = EventStore::new(pool.clone());
    let approvals = ApprovalStore::new(pool);

    let envelope = EventEnvelope::new(
        "lead",
        Uuid::new_v4(),
        EventPayload::RiskDetected {
            severity: autonomic_engine::domain::RiskSeverity::High,
            reason: "confidence below threshold".into(),
            source: Some("oversight".into()),
        },
        Emitter::Agent { agent_id: "oversight".into() },
        0.4,
        true,
    );
    let stored = store.append(envelope).await.unwrap();

    let approval = approvals
        .create(
            stored.event_id,
            "oversight",
            serde_json::json!({}),
            "auto_qualify_lead",
            0.4,
            Utc::now() + ChronoDuration::hours(1),
        )
        .await
        .unwrap();

    let resolved = approvals
        .resolve(approval.approval_id, Decision::Approved, "ceo", None)
        .await
        .unwrap();
    assert_eq!(
        resolved.status,
        autonomic_engine::event_store::ApprovalStatus::Approved
    );

    // resolving again is rejected
    let err = approvals
        .resolve(approval.approval_id, Decision::Approved, "ceo", None)
        .await;
    assert!(err.is_err());
}

#[tokio::test]
async fn test_approval_sweep_times_out_expired_rows() {
    let pool = common::setup_test_db().await;
    let store = EventStore::new(pool.clone());
    let approvals = ApprovalStore::new(pool);

    let envelope = EventEnvelope::new(
        "lead",
        Uuid::new_v4(),
        EventPayload::RiskDetected {
            severity: autonomic_engine::domain::RiskSeverity::Medium,
            reason: "needs review".into(),
            source: None,
        },
        Emitter::System,
        0.5,
        true,
    );
    let stored = store.append(envelope).await.unwrap();

    approvals
        .create(
            stored.event_id,
            "oversight",
            serde_json::json!({}),
            "send_quote",
            0.5,
            Utc::now() - ChronoDuration::minutes(1),
        )
        .await
        .unwrap();

    let timed_out = approvals.sweep_timeouts().await.unwrap();
    assert_eq!(timed_out.len(), 1);
    assert_eq!(
        timed_out[0].status,
        autonomic_engine::event_store::ApprovalStatus::Timeout
    );
}
