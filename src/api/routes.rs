//! API Routes
//!
//! HTTP endpoint definitions for event ingestion, querying, the approval
//! queue, CEO interrupts, and liveness.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::bus::SharedBus;
use crate::domain::{Emitter, EventEnvelope, EventPayload, EventType};
use crate::error::{AppError, AppResult};
use crate::event_store::{ApprovalStatus, ApprovalStore, Decision, EventFilter, EventStore};
use crate::sop::SopRegistry;

use super::middleware::{AuthenticatedCaller, RateLimiter};
use super::sse::SseBroadcaster;

/// Shared application state threaded through every route and the SSE
/// handler via axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub store: EventStore,
    pub bus: SharedBus,
    pub approvals: ApprovalStore,
    pub sops: Arc<SopRegistry>,
    pub sse: Arc<SseBroadcaster>,
    pub rate_limiter: Arc<RateLimiter>,
    /// Names of every agent registered at startup, surfaced by `/health`.
    pub agent_names: Vec<String>,
}

pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/events", post(ingest_event))
        .route("/events/query", post(query_events))
        .route("/events/entity/:aggregate_type/:aggregate_id", get(get_entity_events))
        .route("/events/stream", get(super::sse::stream_events))
        .route("/approvals", get(list_approvals))
        .route("/approvals/:approval_id/resolve", post(resolve_approval))
        .route("/ceo/interrupts", get(ceo_interrupts))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            super::middleware::rate_limit_middleware,
        ))
        .layer(axum::middleware::from_fn(super::middleware::auth_middleware))
        .layer(axum::middleware::from_fn(super::middleware::logging_middleware));

    Router::new()
        .route("/health", get(health))
        .nest("/api", api_routes)
        .with_state(state)
}

// ============================================================================
// POST /api/events
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct IngestEventRequest {
    pub aggregate_type: String,
    pub aggregate_id: Uuid,
    #[serde(flatten)]
    pub payload: EventPayload,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub requires_human: bool,
    #[serde(default)]
    pub correlation_id: Option<Uuid>,
    #[serde(default)]
    pub causation_id: Option<Uuid>,
}

fn default_confidence() -> f64 {
    1.0
}

#[derive(Debug, Serialize)]
pub struct IngestEventResponse {
    pub event_id: Uuid,
    pub event_type: String,
    pub sequence_number: i64,
    pub created_at: Option<DateTime<Utc>>,
}

async fn ingest_event(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthenticatedCaller>,
    Json(request): Json<IngestEventRequest>,
) -> AppResult<(StatusCode, Json<IngestEventResponse>)> {
    let emitted_by = match &caller.user_id {
        Some(user_id) => Emitter::Human { user_id: user_id.clone() },
        None => Emitter::System,
    };

    let mut envelope = EventEnvelope::new(
        request.aggregate_type,
        request.aggregate_id,
        request.payload,
        emitted_by,
        request.confidence,
        request.requires_human,
    );
    if let Some(correlation_id) = request.correlation_id {
        envelope.correlation_id = correlation_id;
    }
    envelope.causation_id = request.causation_id;

    let stored = state.store.append(envelope).await?;
    state.bus.publish(stored.clone()).await;

    Ok((
        StatusCode::ACCEPTED,
        Json(IngestEventResponse {
            event_id: stored.event_id,
            event_type: stored.event_type.as_str().to_string(),
            sequence_number: stored.sequence_number,
            created_at: stored.created_at,
        }),
    ))
}

// ============================================================================
// POST /api/events/query
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct EventQueryRequest {
    #[serde(default)]
    pub event_types: Option<Vec<EventType>>,
    #[serde(default)]
    pub aggregate_type: Option<String>,
    #[serde(default)]
    pub aggregate_id: Option<Uuid>,
    #[serde(default)]
    pub correlation_id: Option<Uuid>,
    #[serde(default)]
    pub requires_human: Option<bool>,
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
    #[serde(default)]
    pub until: Option<DateTime<Utc>>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    100
}

#[derive(Debug, Serialize)]
pub struct EventQueryResponse {
    pub count: usize,
    pub events: Vec<EventEnvelope>,
}

async fn query_events(
    State(state): State<AppState>,
    Json(request): Json<EventQueryRequest>,
) -> AppResult<Json<EventQueryResponse>> {
    let filter = EventFilter {
        event_types: request.event_types,
        aggregate_type: request.aggregate_type,
        aggregate_id: request.aggregate_id,
        correlation_id: request.correlation_id,
        requires_human: request.requires_human,
        since: request.since,
        until: request.until,
        limit: request.limit.min(1000),
        offset: request.offset,
    };

    let events = state.store.query(&filter).await?;
    Ok(Json(EventQueryResponse { count: events.len(), events }))
}

// ============================================================================
// GET /api/events/entity/:aggregate_type/:aggregate_id
// ============================================================================

async fn get_entity_events(
    State(state): State<AppState>,
    Path((aggregate_type, aggregate_id)): Path<(String, Uuid)>,
) -> AppResult<Json<Vec<EventEnvelope>>> {
    let events = state.store.stream_aggregate(&aggregate_type, aggregate_id, 0).await?;
    Ok(Json(events))
}

// ============================================================================
// GET /api/approvals?status=&agent_id=&limit=
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ListApprovalsQuery {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

async fn list_approvals(
    State(state): State<AppState>,
    Query(query): Query<ListApprovalsQuery>,
) -> AppResult<Json<Vec<crate::event_store::Approval>>> {
    let status = match query.status.as_deref() {
        Some("pending") => Some(ApprovalStatus::Pending),
        Some("approved") => Some(ApprovalStatus::Approved),
        Some("rejected") => Some(ApprovalStatus::Rejected),
        Some("timeout") => Some(ApprovalStatus::Timeout),
        Some(other) => {
            return Err(AppError::InvalidRequest(format!("unknown approval status '{other}'")));
        }
        None => None,
    };

    let approvals = state
        .approvals
        .list(status, query.agent_id.as_deref(), query.limit.min(1000))
        .await?;
    Ok(Json(approvals))
}

// ============================================================================
// POST /api/approvals/:approval_id/resolve
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ResolveApprovalRequest {
    pub decision: Decision,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub resolved_by: Option<String>,
}

async fn resolve_approval(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthenticatedCaller>,
    Path(approval_id): Path<Uuid>,
    Json(request): Json<ResolveApprovalRequest>,
) -> AppResult<Json<crate::event_store::Approval>> {
    let resolver = request
        .resolved_by
        .or(caller.user_id)
        .unwrap_or_else(|| format!("{:?}", caller.role).to_lowercase());

    let approval = state
        .approvals
        .resolve(approval_id, request.decision, &resolver, request.notes)
        .await?;

    let triggering = state.store.get_by_id(approval.event_id).await?;
    let outcome = match request.decision {
        Decision::Approved => "approved",
        Decision::Rejected => "rejected",
    };

    if let Some(triggering) = triggering {
        let envelope = EventEnvelope::new(
            triggering.aggregate_type.clone(),
            triggering.aggregate_id,
            EventPayload::HumanOverride {
                approval_id: Some(approval.approval_id),
                decision: outcome.to_string(),
            },
            Emitter::Human { user_id: resolver },
            1.0,
            false,
        )
        .caused_by(&triggering);

        let stored = state.store.append(envelope).await?;
        state.bus.publish(stored).await;
    }

    Ok(Json(approval))
}

// ============================================================================
// GET /api/ceo/interrupts
// ============================================================================

/// Events a CEO-role caller should see without digging through the full
/// stream: low-confidence decisions and anything financially large, even if
/// oversight didn't escalate it for some other reason.
const CEO_INTERRUPT_CONFIDENCE_FLOOR: f64 = 0.7;
const CEO_INTERRUPT_AMOUNT_CEILING: i64 = 100_000;

async fn ceo_interrupts(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthenticatedCaller>,
) -> AppResult<Json<Vec<EventEnvelope>>> {
    if caller.role != crate::domain::Role::Ceo {
        return Err(AppError::Forbidden("CEO role required".to_string()));
    }

    let filter = EventFilter { limit: 1000, ..EventFilter::new() };
    let events = state.store.query(&filter).await?;

    let ceiling = rust_decimal::Decimal::from(CEO_INTERRUPT_AMOUNT_CEILING);
    let interrupts: Vec<EventEnvelope> = events
        .into_iter()
        .filter(|event| {
            event.confidence < CEO_INTERRUPT_CONFIDENCE_FLOOR
                || event
                    .payload
                    .financial_amount()
                    .map(|amount| amount > ceiling)
                    .unwrap_or(false)
        })
        .collect();

    Ok(Json(interrupts))
}

// ============================================================================
// GET /health
// ============================================================================

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    agents: Vec<String>,
    bus_subscriptions: usize,
    bus_history_len: usize,
    sop_count: usize,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        agents: state.agent_names.clone(),
        bus_subscriptions: state.bus.subscription_count(),
        bus_history_len: state.bus.history().len(),
        sop_count: state.sops.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingest_event_request_flattens_payload_tag() {
        let json = serde_json::json!({
            "aggregate_type": "lead",
            "aggregate_id": Uuid::nil(),
            "event_type": "LEAD_RECEIVED",
            "lead_source": "web",
            "contact_email": "a@b",
            "urgency": "high",
            "initial_message": "hello there, interested"
        });

        let request: IngestEventRequest = serde_json::from_value(json).unwrap();
        assert_eq!(request.aggregate_type, "lead");
        assert!(matches!(request.payload, EventPayload::LeadReceived { .. }));
        assert_eq!(request.confidence, 1.0);
    }

    #[test]
    fn resolve_approval_request_accepts_lowercase_decision() {
        let json = serde_json::json!({"decision": "approved"});
        let request: ResolveApprovalRequest = serde_json::from_value(json).unwrap();
        assert!(matches!(request.decision, Decision::Approved));
    }
}
