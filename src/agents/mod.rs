//! Agent Runtime
//!
//! Mandate-scoped agents driven by the bus. Every agent's emissions are
//! enforced against its declared mandate; every process failure is turned
//! into a `RISK_DETECTED` event rather than propagated as a crash.

mod context;
mod decision_log;
mod error;
mod intake;
mod mandate;
mod oversight;
mod runtime;
mod sop_executor;

pub use context::AgentContext;
pub use decision_log::{DecisionLog, DecisionLogEntry, DecisionOutcome};
pub use error::AgentError;
pub use intake::IntakeAgent;
pub use mandate::AgentMandate;
pub use oversight::OversightAgent;
pub use runtime::{Agent, AgentRuntime};
pub use sop_executor::SopExecutorAgent;
