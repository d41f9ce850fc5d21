//! Replay/acknowledgment bookkeeping.
//!
//! The backend redelivers messages generated while the client was offline;
//! each distinct message id must be applied once and acknowledged exactly
//! once. The ledger deduplicates redelivery so a second `replay` for an
//! already-acked id neither re-applies the message nor re-sends the ack.
//! `response` frames share the same path.

use std::collections::{HashSet, VecDeque};

/// Ids acked this process lifetime, bounded so the set cannot grow without
/// limit across a very long-lived connection. Eviction is oldest-first;
/// the bound is far larger than any realistic offline backlog.
pub struct AckLedger {
    seen: HashSet<String>,
    order: VecDeque<String>,
    cap: usize,
}

pub const DEFAULT_ACK_LEDGER_CAP: usize = 4096;

impl AckLedger {
    pub fn new(cap: usize) -> Self {
        Self {
            seen: HashSet::new(),
            order: VecDeque::new(),
            cap: cap.max(1),
        }
    }

    /// Whether the id has already been applied and acked. Callers check
    /// this before applying and record only once the apply succeeded; an id
    /// that failed to apply is never in the ledger, so redelivery retries
    /// it.
    pub fn contains(&self, message_id: &str) -> bool {
        self.seen.contains(message_id)
    }

    /// Returns `true` exactly once per message id: the first delivery, which
    /// the caller applies and acks. Every later delivery returns `false`.
    pub fn first_delivery(&mut self, message_id: &str) -> bool {
        if self.seen.contains(message_id) {
            return false;
        }
        self.seen.insert(message_id.to_string());
        self.order.push_back(message_id.to_string());
        while self.order.len() > self.cap {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        true
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

impl Default for AckLedger {
    fn default() -> Self {
        Self::new(DEFAULT_ACK_LEDGER_CAP)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_delivery_true_once() {
        let mut ledger = AckLedger::default();
        assert!(ledger.first_delivery("m1"));
        assert!(!ledger.first_delivery("m1"));
        assert!(!ledger.first_delivery("m1"));
        assert!(ledger.first_delivery("m2"));
    }

    #[test]
    fn contains_only_after_recording() {
        let mut ledger = AckLedger::default();
        assert!(!ledger.contains("m1"));
        ledger.first_delivery("m1");
        assert!(ledger.contains("m1"));
        assert!(!ledger.contains("m2"));
    }

    #[test]
    fn message_ids_are_case_sensitive() {
        let mut ledger = AckLedger::default();
        assert!(ledger.first_delivery("Msg-1"));
        assert!(ledger.first_delivery("msg-1"));
    }

    #[test]
    fn ledger_stays_bounded() {
        let mut ledger = AckLedger::new(10);
        for i in 0..100 {
            assert!(ledger.first_delivery(&format!("m{i}")));
        }
        assert_eq!(ledger.len(), 10);
        // The most recent ids are still deduplicated.
        assert!(!ledger.first_delivery("m99"));
        // The oldest fell out and would be re-applied; acceptable, acks are
        // idempotent on the backend side.
        assert!(ledger.first_delivery("m0"));
    }
}
