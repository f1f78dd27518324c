//! Oversight decision log
//!
//! Bounded ring of the oversight agent's recent decisions, kept for audit
//! and the CEO interrupts surface. Not authoritative — every decision is
//! also reflected as an emitted event or approval row.

use std::collections::VecDeque;
use std::sync::Mutex;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub const CAPACITY: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionOutcome {
    Escalated,
    Approved,
}

#[derive(Debug, Clone)]
pub struct DecisionLogEntry {
    pub decision_id: Uuid,
    pub event_id: Uuid,
    pub outcome: DecisionOutcome,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

pub struct DecisionLog {
    entries: Mutex<VecDeque<DecisionLogEntry>>,
}

impl DecisionLog {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(CAPACITY)),
        }
    }

    pub fn record(&self, event_id: Uuid, outcome: DecisionOutcome, reason: impl Into<String>) -> Uuid {
        let decision_id = Uuid::new_v4();
        let mut entries = self.entries.lock().expect("decision log lock poisoned");
        if entries.len() >= CAPACITY {
            entries.pop_front();
        }
        entries.push_back(DecisionLogEntry {
            decision_id,
            event_id,
            outcome,
            reason: reason.into(),
            created_at: Utc::now(),
        });
        decision_id
    }

    pub fn snapshot(&self) -> Vec<DecisionLogEntry> {
        self.entries.lock().expect("decision log lock poisoned").iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("decision log lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for DecisionLog {
    fn default() -> Self {
        Self::new()
    }
}
