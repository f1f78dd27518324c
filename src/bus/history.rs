//! History ring
//!
//! In-memory ring of the last N envelopes, kept for debugging and
//! late-subscriber warm-up. Not authoritative — the store is.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::domain::EventEnvelope;

pub const DEFAULT_SIZE: usize = 1000;

pub struct HistoryRing {
    capacity: usize,
    entries: Mutex<VecDeque<EventEnvelope>>,
}

impl HistoryRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn push(&self, envelope: EventEnvelope) {
        let mut entries = self.entries.lock().expect("history ring lock poisoned");
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(envelope);
    }

    pub fn snapshot(&self) -> Vec<EventEnvelope> {
        self.entries
            .lock()
            .expect("history ring lock poisoned")
            .iter()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("history ring lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for HistoryRing {
    fn default() -> Self {
        Self::new(DEFAULT_SIZE)
    }
}
