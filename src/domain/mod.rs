//! Domain module
//!
//! Core domain types: the event envelope contract, its validator, request
//! context, and pure domain errors.

pub mod context;
pub mod envelope;
pub mod error;

pub use context::{RequestContext, Role};
pub use envelope::{
    validate, Emitter, EventEnvelope, EventPayload, EventType, Metadata, RiskSeverity, Sentiment,
};
pub use error::DomainError;
