//! Server-Sent-Events egress
//!
//! A `BusHandler` forwards every wildcard-matched event onto a lossy
//! broadcast channel; each SSE connection subscribes to its own receiver and
//! filters by the caller's role, mirroring the teacher's
//! `tenant_sse_stream`/`RealtimeMessage` pattern but keyed on role instead
//! of tenant.

use std::convert::Infallible;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::{Query, State};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::{wrappers::BroadcastStream, StreamExt};
use uuid::Uuid;

use crate::bus::{BusError, BusHandler};
use crate::domain::{EventEnvelope, Role};

use super::routes::AppState;

/// Capacity of the lossy SSE broadcast channel. A slow SSE client drops
/// frames rather than backing up the bus; this is a best-effort stream by
/// design (at-least-once, idempotent rendering is the client's job).
pub const SSE_CHANNEL_CAPACITY: usize = 1024;

/// Bridges the event bus into the broadcast channel SSE connections read from.
pub struct SseBroadcaster {
    tx: broadcast::Sender<EventEnvelope>,
}

impl SseBroadcaster {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(SSE_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.tx.subscribe()
    }
}

impl Default for SseBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BusHandler for SseBroadcaster {
    async fn handle(&self, event: &EventEnvelope) -> Result<(), BusError> {
        // A lagging/closed receiver is not this handler's problem; the bus
        // only cares that the send attempt didn't panic.
        let _ = self.tx.send(event.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "sse_broadcaster"
    }
}

#[derive(Debug, Deserialize)]
pub struct StreamParams {
    pub role: Option<String>,
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct SseFrame<'a> {
    id: Uuid,
    #[serde(rename = "type")]
    event_type: &'a str,
    timestamp: chrono::DateTime<chrono::Utc>,
    data: SseFrameData,
}

#[derive(Debug, Serialize)]
struct SseFrameData {
    aggregate_id: Uuid,
    emitted_by: String,
    payload: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct ConnectedFrame {
    #[serde(rename = "type")]
    frame_type: &'static str,
    #[serde(rename = "clientId")]
    client_id: Uuid,
}

/// Employee-visible event types, per role-based filtering (§4.7). CEO sees
/// everything; client sees only events that touch their own identity;
/// everyone else listed here sees this fixed operational slice.
fn employee_visible(event: &EventEnvelope) -> bool {
    use crate::domain::EventType::*;
    matches!(
        event.event_type,
        LeadReceived
            | LeadQualified
            | MeetingScheduled
            | MeetingCompleted
            | TaskCreated
            | TaskAssigned
            | TaskCompleted
            | ProjectStarted
            | ProjectAtRisk
            | ProjectCompleted
            | HumanApprovalRequested
            | RiskDetected
    )
}

fn client_visible(event: &EventEnvelope, client_id: Uuid) -> bool {
    event.aggregate_id == client_id || event.payload.client_id() == Some(client_id)
}

/// `GET /api/events/stream` — role-filtered SSE. Unauthenticated or
/// unparsable `role`/`userId` query params see nothing but the initial
/// `connected` frame and keep-alives.
pub async fn stream_events(
    State(state): State<AppState>,
    Query(params): Query<StreamParams>,
) -> Sse<impl tokio_stream::Stream<Item = Result<SseEvent, Infallible>>> {
    let client_id = Uuid::new_v4();
    let role: Option<Role> = params.role.as_deref().and_then(|r| r.parse().ok());
    let client_filter_id = params.user_id.as_deref().and_then(|s| Uuid::parse_str(s).ok());

    let connected = futures_compat_once(ConnectedFrame {
        frame_type: "connected",
        client_id,
    });

    let rx = state.sse.subscribe();
    let live = BroadcastStream::new(rx).filter_map(move |msg| match msg {
        Ok(event) => {
            let visible = match role {
                Some(Role::Ceo) => true,
                Some(Role::Employee) => employee_visible(&event),
                Some(Role::Client) => client_filter_id
                    .map(|id| client_visible(&event, id))
                    .unwrap_or(false),
                None => false,
            };
            if !visible {
                return None;
            }

            let frame = SseFrame {
                id: event.event_id,
                event_type: event.event_type.as_str(),
                timestamp: event.timestamp,
                data: SseFrameData {
                    aggregate_id: event.aggregate_id,
                    emitted_by: event.emitted_by.to_string(),
                    payload: serde_json::to_value(&event.payload).unwrap_or_default(),
                },
            };
            let body = serde_json::to_string(&frame).unwrap_or_else(|_| "{}".to_string());
            Some(Ok(SseEvent::default().event(event.event_type.as_str()).data(body)))
        }
        Err(_lagged) => None,
    });

    let stream = connected.chain(live);

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(30)))
}

/// A one-shot stream yielding a single frame, chained in front of the live
/// broadcast stream so every connection's first frame is `{type:"connected"}`.
fn futures_compat_once(
    frame: ConnectedFrame,
) -> impl tokio_stream::Stream<Item = Result<SseEvent, Infallible>> {
    let body = serde_json::to_string(&frame).unwrap_or_else(|_| "{}".to_string());
    tokio_stream::once(Ok(SseEvent::default().event("connected").data(body)))
}
