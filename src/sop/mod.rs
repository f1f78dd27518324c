//! SOP Registry
//!
//! Declarative, versioned Standard Operating Procedures loaded from an
//! external source and resolved against incoming events.

mod context;
mod registry;
mod source;
mod types;

pub use context::ResolutionContext;
pub use registry::{SopRegistry, SopRegistryError};
pub use source::{DatabaseSopSource, FilesystemSopSource, SopSource, SopSourceError};
pub use types::{
    AutomationLevel, AutomationPolicy, EscalationRule, Preconditions, SopDefinition, SopMetadata,
    SopMetrics, SopStep,
};
