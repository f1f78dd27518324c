//! Request Context
//!
//! Per-HTTP-request metadata threaded through middleware for tracing and
//! SSE role-based filtering. Distinct from an event's own
//! `correlation_id`/`causation_id`, which travel with the envelope itself.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A caller's role, used by the SSE egress surface for event filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Ceo,
    Employee,
    Client,
}

impl std::str::FromStr for Role {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ceo" => Ok(Role::Ceo),
            "employee" => Ok(Role::Employee),
            "client" => Ok(Role::Client),
            _ => Err(()),
        }
    }
}

/// Context for an inbound HTTP request, used for auditing and tracing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            correlation_id: None,
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    pub fn ensure_correlation_id(&mut self) -> Uuid {
        *self.correlation_id.get_or_insert_with(Uuid::new_v4)
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn role_parses_case_insensitively() {
        assert_eq!(Role::from_str("CEO"), Ok(Role::Ceo));
        assert_eq!(Role::from_str("employee"), Ok(Role::Employee));
        assert!(Role::from_str("bogus").is_err());
    }

    #[test]
    fn ensure_correlation_id_is_stable() {
        let mut ctx = RequestContext::new();
        let id = ctx.ensure_correlation_id();
        assert_eq!(ctx.ensure_correlation_id(), id);
    }
}
