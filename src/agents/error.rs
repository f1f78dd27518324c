//! Agent Errors

use crate::domain::EventType;
use crate::event_store::EventStoreError;

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("agent {agent_id} is not mandated to emit {event_type}")]
    OutOfMandate { agent_id: String, event_type: EventType },

    #[error("store error: {0}")]
    Store(#[from] EventStoreError),

    #[error("agent-specific failure: {0}")]
    Failure(String),
}
