//! Processed-set
//!
//! Bounded, FIFO-evicted de-duplication set. Every publish path records the
//! event_id here first; the distributed receiver checks it and drops
//! duplicates. Eviction never produces a false positive — an evicted id
//! simply becomes "unknown" again, it is never reported as unseen-but-seen.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use uuid::Uuid;

/// Default bound per the bus's de-duplication contract.
pub const DEFAULT_CAPACITY: usize = 10_000;

pub struct ProcessedSet {
    capacity: usize,
    order: Mutex<VecDeque<Uuid>>,
    seen: Mutex<HashSet<Uuid>>,
}

impl ProcessedSet {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: Mutex::new(VecDeque::with_capacity(capacity)),
            seen: Mutex::new(HashSet::with_capacity(capacity)),
        }
    }

    /// Record `id` as processed. Returns `true` if this is the first time
    /// `id` has been seen (i.e. the caller should actually dispatch it),
    /// `false` if it is a known duplicate.
    pub fn record(&self, id: Uuid) -> bool {
        let mut seen = self.seen.lock().expect("processed-set seen lock poisoned");
        if !seen.insert(id) {
            return false;
        }

        let mut order = self.order.lock().expect("processed-set order lock poisoned");
        order.push_back(id);

        if order.len() > self.capacity {
            let evict_count = (self.capacity / 10).max(1);
            for _ in 0..evict_count {
                if let Some(evicted) = order.pop_front() {
                    seen.remove(&evicted);
                } else {
                    break;
                }
            }
        }

        true
    }

    pub fn len(&self) -> usize {
        self.seen.lock().expect("processed-set seen lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ProcessedSet {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_record_returns_true_second_returns_false() {
        let set = ProcessedSet::new(10);
        let id = Uuid::new_v4();
        assert!(set.record(id));
        assert!(!set.record(id));
    }

    #[test]
    fn eviction_does_not_cause_false_positive_reinsert() {
        let set = ProcessedSet::new(10);
        let ids: Vec<Uuid> = (0..15).map(|_| Uuid::new_v4()).collect();
        for id in &ids {
            set.record(*id);
        }
        // The set never exceeds capacity + the last over-budget batch; more
        // importantly, an id that was evicted is simply unknown again and
        // would be treated as "first time" if resubmitted, never silently
        // dropped as if it were a genuine duplicate of something unseen.
        assert!(set.len() <= 15);
    }

    #[test]
    fn eviction_keeps_the_most_recent_ids() {
        let set = ProcessedSet::new(10);
        let ids: Vec<Uuid> = (0..20).map(|_| Uuid::new_v4()).collect();
        for id in &ids {
            set.record(*id);
        }
        let last = *ids.last().unwrap();
        assert!(!set.record(last), "most recently seen id must still be recognised as a duplicate");
    }
}
