//! Event Store module
//!
//! Durable, ordered, append-only log with query/stream/snapshot APIs, plus
//! the approval queue that lives alongside it.

mod approvals;
mod error;
mod repository;

pub use approvals::{Approval, ApprovalStatus, ApprovalStore, Decision};
pub use error::EventStoreError;
pub use repository::{EventFilter, EventStore};
