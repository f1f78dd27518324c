//! HTTP API integration tests.

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
};
use autonomic_engine::api::{self, middleware::RateLimiter, sse::SseBroadcaster, AppState};
use autonomic_engine::bus::EventBus;
use autonomic_engine::event_store::{ApprovalStore, EventStore};
use autonomic_engine::sop::{FilesystemSopSource, SopRegistry};
use serde_json::{json, Value};
use tower::util::ServiceExt;
use uuid::Uuid;

mod common;

async fn build_state(pool: sqlx::PgPool) -> AppState {
    let store = EventStore::new(pool.clone());
    let approvals = ApprovalStore::new(pool);
    let bus = EventBus::new(store.clone(), 256, 1024);
    let sops = Arc::new(
        SopRegistry::load(Box::new(FilesystemSopSource::new("sops")))
            .await
            .expect("fixture SOP definitions must load"),
    );

    AppState {
        store,
        bus,
        approvals,
        sops,
        sse: Arc::new(SseBroadcaster::new()),
        rate_limiter: Arc::new(RateLimiter::new(1000)),
        agent_names: vec!["intake".to_string(), "oversight".to_string(), "sop_executor".to_string()],
    }
}

#[tokio::test]
async fn test_ingest_and_query_event_e2e() {
    let pool = common::setup_test_db().await;
    let state = build_state(pool).await;
    let app = api::create_router(state);

    let lead_id = Uuid::new_v4();
    let req = Request::builder()
        .method("POST")
        .uri("/api/events")
        .header("content-type", "application/json")
        .header("X-Role", "employee")
        .header("X-User-Id", "alice")
        .body(Body::from(
            json!({
                "aggregate_type": "lead",
                "aggregate_id": lead_id,
                "event_type": "LEAD_RECEIVED",
                "lead_source": "web",
                "contact_email": "prospect@example.com",
                "urgency": "high",
                "initial_message": "Interested in the enterprise plan",
                "confidence": 0.95
            })
            .to_string(),
        ))
        .unwrap();
    let response = app.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["sequence_number"], 1);

    let req = Request::builder()
        .method("POST")
        .uri("/api/events/query")
        .header("content-type", "application/json")
        .header("X-Role", "employee")
        .body(Body::from(
            json!({ "aggregate_id": lead_id }).to_string(),
        ))
        .unwrap();
    let response = app.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["count"], 1);
}

#[tokio::test]
async fn test_missing_role_header_is_rejected() {
    let pool = common::setup_test_db().await;
    let state = build_state(pool).await;
    let app = api::create_router(state);

    let req = Request::builder()
        .method("GET")
        .uri("/api/approvals")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_ceo_interrupts_forbidden_for_non_ceo_role() {
    let pool = common::setup_test_db().await;
    let state = build_state(pool).await;
    let app = api::create_router(state);

    let req = Request::builder()
        .method("GET")
        .uri("/api/ceo/interrupts")
        .header("X-Role", "employee")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_ceo_interrupts_surfaces_low_confidence_events() {
    let pool = common::setup_test_db().await;
    let state = build_state(pool).await;
    let app = api::create_router(state);

    let lead_id = Uuid::new_v4();
    let req = Request::builder()
        .method("POST")
        .uri("/api/events")
        .header("content-type", "application/json")
        .header("X-Role", "employee")
        .body(Body::from(
            json!({
                "aggregate_type": "lead",
                "aggregate_id": lead_id,
                "event_type": "LEAD_RECEIVED",
                "lead_source": "web",
                "contact_email": "prospect@example.com",
                "urgency": "low",
                "initial_message": "maybe interested",
                "confidence": 0.2
            })
            .to_string(),
        ))
        .unwrap();
    let response = app.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let req = Request::builder()
        .method("GET")
        .uri("/api/ceo/interrupts")
        .header("X-Role", "ceo")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let events: Value = serde_json::from_slice(&body).unwrap();
    assert!(events.as_array().unwrap().iter().any(|e| e["aggregate_id"] == lead_id.to_string()));
}

#[tokio::test]
async fn test_approval_queue_resolve_flow() {
    let pool = common::setup_test_db().await;
    let state = build_state(pool).await;

    let envelope = autonomic_engine::domain::EventEnvelope::new(
        "lead",
        Uuid::new_v4(),
        autonomic_engine::domain::EventPayload::RiskDetected {
            severity: autonomic_engine::domain::RiskSeverity::High,
            reason: "low confidence qualification".into(),
            source: Some("intake".into()),
        },
        autonomic_engine::domain::Emitter::Agent { agent_id: "intake".into() },
        0.3,
        true,
    );
    let stored = state.store.append(envelope).await.unwrap();

    let approval = state
        .approvals
        .create(
            stored.event_id,
            "intake",
            json!({}),
            "auto_qualify_lead",
            0.3,
            chrono::Utc::now() + chrono::Duration::hours(1),
        )
        .await
        .unwrap();

    let app = api::create_router(state);

    let req = Request::builder()
        .method("GET")
        .uri("/api/approvals?status=pending")
        .header("X-Role", "ceo")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let approvals: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(approvals.as_array().unwrap().len(), 1);

    let req = Request::builder()
        .method("POST")
        .uri(format!("/api/approvals/{}/resolve", approval.approval_id))
        .header("content-type", "application/json")
        .header("X-Role", "ceo")
        .header("X-User-Id", "ceo-1")
        .body(Body::from(json!({ "decision": "approved" }).to_string()))
        .unwrap();
    let response = app.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let resolved: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(resolved["status"], "approved");
}

#[tokio::test]
async fn test_health_endpoint_reports_sop_count() {
    let pool = common::setup_test_db().await;
    let state = build_state(pool).await;
    let sop_count = state.sops.len();
    let app = api::create_router(state);

    let req = Request::builder().method("GET").uri("/health").body(Body::empty()).unwrap();
    let response = app.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let health: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["sop_count"], sop_count);
    assert_eq!(health["status"], "ok");
}
