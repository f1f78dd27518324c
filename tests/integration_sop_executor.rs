//! Integration tests running the SOP executor agent against the real
//! `sops/*.json` fixtures, through the same filesystem source `main.rs`
//! wires in production. Catches preconditions-matching regressions that a
//! resolver test built from hand-rolled `Preconditions::default()` can't.

use std::sync::Arc;

use autonomic_engine::agents::{Agent, AgentContext, AgentMandate, SopExecutorAgent};
use autonomic_engine::domain::{Emitter, EventEnvelope, EventPayload};
use autonomic_engine::event_store::{ApprovalStore, EventStore};
use autonomic_engine::sop::{FilesystemSopSource, SopRegistry};
use rust_decimal::Decimal;
use uuid::Uuid;

mod common;

async fn load_real_sop_registry() -> Arc<SopRegistry> {
    Arc::new(
        SopRegistry::load(Box::new(FilesystemSopSource::new("sops")))
            .await
            .expect("real sops/ fixtures must load"),
    )
}

#[tokio::test]
async fn lead_received_resolves_lead_intake_sop_and_auto_executes() {
    let pool = common::setup_test_db().await;
    let store = EventStore::new(pool.clone());
    let approvals = ApprovalStore::new(pool.clone());
    let bus = autonomic_engine::bus::EventBus::new(store.clone(), 64, 256);

    let registry = load_real_sop_registry().await;
    assert!(
        registry.len() >= 2,
        "expected both shipped SOP fixtures to load"
    );

    let lead_id = Uuid::new_v4();
    let triggering = EventEnvelope::new(
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
    let stored_trigger = store.append(triggering).await.unwrap();

    let ctx = AgentContext::new(
        "sop_executor",
        AgentMandate::new("sop_executor", "test"),
        store.clone(),
        bus,
        approvals,
    );
    let agent = SopExecutorAgent::new(registry);
    agent.process(&stored_trigger, &ctx).await.unwrap();

    let history = store.stream_aggregate("lead", lead_id, 0).await.unwrap();

    // The triggering LEAD_RECEIVED plus the SOP's auto-executed completion —
    // `qualify`'s automation_level is "full" and 0.95 clears the SOP's 0.7
    // confidence_threshold, so this must not fall back to an approval.
    assert_eq!(history.len(), 2);
    match &history[1].payload {
        EventPayload::SopExecutionCompleted { sop_id, .. } => assert_eq!(sop_id, "lead-intake"),
        other => panic!("expected SOP_EXECUTION_COMPLETED, got {other:?}"),
    }
}

#[tokio::test]
async fn invoice_issued_resolves_invoice_collection_sop_and_requests_approval() {
    let pool = common::setup_test_db().await;
    let store = EventStore::new(pool.clone());
    let approvals = ApprovalStore::new(pool.clone());
    let bus = autonomic_engine::bus::EventBus::new(store.clone(), 64, 256);

    let registry = load_real_sop_registry().await;

    let client_id = Uuid::new_v4();
    let triggering = EventEnvelope::new(
        "client",
        client_id,
        EventPayload::InvoiceIssued {
            invoice_id: Uuid::new_v4(),
            client_id,
            amount: Decimal::new(5_000, 0),
        },
        // Below invoice-collection's 0.8 confidence_threshold so the agent
        // must escalate rather than auto-execute `issue_invoice`.
        Emitter::System,
        0.5,
        false,
    );
    let stored_trigger = store.append(triggering).await.unwrap();

    let ctx = AgentContext::new(
        "sop_executor",
        AgentMandate::new("sop_executor", "test"),
        store.clone(),
        bus,
        approvals.clone(),
    );
    let agent = SopExecutorAgent::new(registry);
    agent.process(&stored_trigger, &ctx).await.unwrap();

    let history = store.stream_aggregate("client", client_id, 0).await.unwrap();
    assert_eq!(history.len(), 2);
    match &history[1].payload {
        EventPayload::HumanApprovalRequested { .. } => {}
        other => panic!("expected HUMAN_APPROVAL_REQUESTED, got {other:?}"),
    }

    let pending = approvals.sweep_timeouts().await.unwrap();
    assert!(
        pending.is_empty(),
        "freshly created approval must not already be timed out"
    );
}
