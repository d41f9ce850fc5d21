//! FIFO and priority worklists over sessions.
//!
//! Both queues order a subset of sessions independently of conversation
//! content. The FIFO queue sorts by a monotonically assigned position; the
//! priority queue sorts by (priority level ascending, fractional order
//! ascending) and supports stable drag-and-drop reinsertion via midpoint
//! interpolation. Removal resets membership and queue metadata atomically;
//! a session outside a queue never carries stale queue fields.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use untethered_types::{FifoQueueState, PriorityQueueState, PRIORITY_LOW};

// ---------------------------------------------------------------------------
// FIFO queue
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct FifoEntry {
    pub session_id: String,
    pub position: u64,
    pub queued_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct FifoQueue {
    entries: HashMap<String, FifoEntry>,
}

impl FifoQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a session: `position = max(existing) + 1`, or 0 when empty.
    /// Enqueueing an already-queued session keeps its position.
    pub fn enqueue(&mut self, session_id: &str, now: DateTime<Utc>) -> FifoEntry {
        if let Some(existing) = self.entries.get(session_id) {
            return existing.clone();
        }
        let position = self
            .entries
            .values()
            .map(|e| e.position + 1)
            .max()
            .unwrap_or(0);
        let entry = FifoEntry {
            session_id: session_id.to_string(),
            position,
            queued_at: now,
        };
        self.entries.insert(session_id.to_string(), entry.clone());
        entry
    }

    pub fn remove(&mut self, session_id: &str) -> bool {
        self.entries.remove(session_id).is_some()
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.entries.contains_key(session_id)
    }

    /// Display order: position ascending.
    pub fn ordered(&self) -> Vec<FifoEntry> {
        let mut list: Vec<FifoEntry> = self.entries.values().cloned().collect();
        list.sort_by_key(|e| e.position);
        list
    }

    /// The session's queue fields as they belong on its record. Membership
    /// and metadata always agree: absent means `false, 0, None`.
    pub fn state_for(&self, session_id: &str) -> FifoQueueState {
        match self.entries.get(session_id) {
            Some(entry) => FifoQueueState {
                is_in_queue: true,
                position: entry.position,
                queued_at: Some(entry.queued_at),
            },
            None => FifoQueueState::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Priority queue
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct PriorityEntry {
    pub session_id: String,
    /// Integer level; lower is more urgent. Canonical levels are 1/5/10.
    pub priority: i32,
    /// Fractional sub-order within the level.
    pub priority_order: f64,
    pub queued_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct PriorityQueue {
    entries: HashMap<String, PriorityEntry>,
}

/// Fractional order for inserting between two neighbors. For `o1 < o2` the
/// midpoint `(o1+o2)/2` always lands strictly between them; before the
/// first element it halves, after the last it adds one.
fn insertion_order(prev: Option<f64>, next: Option<f64>) -> f64 {
    match (prev, next) {
        (Some(a), Some(b)) => (a + b) / 2.0,
        (None, Some(first)) => first / 2.0,
        (Some(last), None) => last + 1.0,
        (None, None) => 1.0,
    }
}

impl PriorityQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn append_order(&self, priority: i32) -> f64 {
        self.entries
            .values()
            .filter(|e| e.priority == priority)
            .map(|e| e.priority_order)
            .fold(None::<f64>, |acc, o| {
                Some(acc.map_or(o, |a| a.max(o)))
            })
            .map_or(1.0, |max| max + 1.0)
    }

    /// Append a session to a level: `order = max(level orders) + 1.0`, or
    /// 1.0 when the level is empty. Re-enqueueing keeps the existing entry.
    pub fn enqueue(&mut self, session_id: &str, priority: i32, now: DateTime<Utc>) -> PriorityEntry {
        if let Some(existing) = self.entries.get(session_id) {
            return existing.clone();
        }
        let entry = PriorityEntry {
            session_id: session_id.to_string(),
            priority,
            priority_order: self.append_order(priority),
            queued_at: now,
        };
        self.entries.insert(session_id.to_string(), entry.clone());
        entry
    }

    /// Change an entry's level. The entry moves to the *end* of the new
    /// level; the old order value is never carried across levels. Setting
    /// the current level is a no-op.
    pub fn set_priority(&mut self, session_id: &str, priority: i32) -> Option<PriorityEntry> {
        let current = self.entries.get(session_id)?.clone();
        if current.priority == priority {
            return Some(current);
        }
        let order = self.append_order(priority);
        let entry = self.entries.get_mut(session_id)?;
        entry.priority = priority;
        entry.priority_order = order;
        Some(entry.clone())
    }

    /// Drag-and-drop within a level: reinsert the session at `index` among
    /// the level's other entries, computing a midpoint order against the new
    /// neighbors.
    pub fn move_within_level(&mut self, session_id: &str, index: usize) -> Option<PriorityEntry> {
        let priority = self.entries.get(session_id)?.priority;
        let mut level: Vec<PriorityEntry> = self
            .entries
            .values()
            .filter(|e| e.priority == priority && e.session_id != session_id)
            .cloned()
            .collect();
        level.sort_by(|a, b| a.priority_order.total_cmp(&b.priority_order));

        let index = index.min(level.len());
        let prev = index.checked_sub(1).map(|i| level[i].priority_order);
        let next = level.get(index).map(|e| e.priority_order);
        let order = insertion_order(prev, next);

        let entry = self.entries.get_mut(session_id)?;
        entry.priority_order = order;
        Some(entry.clone())
    }

    pub fn remove(&mut self, session_id: &str) -> bool {
        self.entries.remove(session_id).is_some()
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.entries.contains_key(session_id)
    }

    /// Display order: priority ascending, then fractional order ascending.
    pub fn ordered(&self) -> Vec<PriorityEntry> {
        let mut list: Vec<PriorityEntry> = self.entries.values().cloned().collect();
        list.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then(a.priority_order.total_cmp(&b.priority_order))
        });
        list
    }

    /// Queue fields for the session record. Absent entries report the
    /// invariant defaults: not queued, priority 10, order 0.0.
    pub fn state_for(&self, session_id: &str) -> PriorityQueueState {
        match self.entries.get(session_id) {
            Some(entry) => PriorityQueueState {
                is_in_queue: true,
                priority: entry.priority,
                priority_order: entry.priority_order,
                queued_at: Some(entry.queued_at),
            },
            None => PriorityQueueState::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use untethered_types::{PRIORITY_HIGH, PRIORITY_MEDIUM};

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    // ── FIFO ──────────────────────────────────────────────────────────────

    #[test]
    fn fifo_positions_are_monotonic_from_zero() {
        let mut queue = FifoQueue::new();
        assert_eq!(queue.enqueue("s1", now()).position, 0);
        assert_eq!(queue.enqueue("s2", now()).position, 1);
        assert_eq!(queue.enqueue("s3", now()).position, 2);
    }

    #[test]
    fn fifo_reenqueue_keeps_position() {
        let mut queue = FifoQueue::new();
        queue.enqueue("s1", now());
        queue.enqueue("s2", now());
        assert_eq!(queue.enqueue("s1", now()).position, 0);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn fifo_position_never_reused_after_middle_removal() {
        let mut queue = FifoQueue::new();
        queue.enqueue("s1", now());
        queue.enqueue("s2", now());
        queue.enqueue("s3", now());
        queue.remove("s2");
        // max existing position is 2, so the next append gets 3.
        assert_eq!(queue.enqueue("s4", now()).position, 3);
    }

    #[test]
    fn fifo_ordered_by_position() {
        let mut queue = FifoQueue::new();
        queue.enqueue("a", now());
        queue.enqueue("b", now());
        queue.enqueue("c", now());
        let ids: Vec<String> = queue.ordered().into_iter().map(|e| e.session_id).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn fifo_removal_resets_all_state_together() {
        let mut queue = FifoQueue::new();
        queue.enqueue("s1", now());
        assert!(queue.state_for("s1").is_in_queue);
        queue.remove("s1");
        let state = queue.state_for("s1");
        assert!(!state.is_in_queue);
        assert_eq!(state.position, 0);
        assert!(state.queued_at.is_none());
    }

    // ── Priority queue: append rule ───────────────────────────────────────

    #[test]
    fn priority_append_starts_at_one_per_level() {
        let mut queue = PriorityQueue::new();
        assert_eq!(
            queue.enqueue("s1", PRIORITY_MEDIUM, now()).priority_order,
            1.0
        );
        assert_eq!(
            queue.enqueue("s2", PRIORITY_MEDIUM, now()).priority_order,
            2.0
        );
        // A different level starts over at 1.0.
        assert_eq!(
            queue.enqueue("s3", PRIORITY_HIGH, now()).priority_order,
            1.0
        );
    }

    #[test]
    fn priority_sort_is_level_then_order() {
        let mut queue = PriorityQueue::new();
        queue.enqueue("low", PRIORITY_LOW, now());
        queue.enqueue("high-2", PRIORITY_HIGH, now());
        queue.enqueue("med", PRIORITY_MEDIUM, now());
        queue.enqueue("high-1", PRIORITY_HIGH, now());
        queue.move_within_level("high-1", 0);

        let ids: Vec<String> = queue.ordered().into_iter().map(|e| e.session_id).collect();
        assert_eq!(ids, vec!["high-1", "high-2", "med", "low"]);
    }

    // ── Priority queue: drag-and-drop ─────────────────────────────────────

    #[test]
    fn drag_before_first_halves_order() {
        // Scenario: s1 gets 1.0, s2 gets 2.0, dragging s2 before s1 → 0.5.
        let mut queue = PriorityQueue::new();
        queue.enqueue("s1", PRIORITY_MEDIUM, now());
        queue.enqueue("s2", PRIORITY_MEDIUM, now());

        let moved = queue.move_within_level("s2", 0).unwrap();
        assert_eq!(moved.priority_order, 0.5);

        let ids: Vec<String> = queue.ordered().into_iter().map(|e| e.session_id).collect();
        assert_eq!(ids, vec!["s2", "s1"]);
    }

    #[test]
    fn drag_between_neighbors_takes_midpoint() {
        let mut queue = PriorityQueue::new();
        queue.enqueue("a", PRIORITY_MEDIUM, now()); // 1.0
        queue.enqueue("b", PRIORITY_MEDIUM, now()); // 2.0
        queue.enqueue("c", PRIORITY_MEDIUM, now()); // 3.0

        let moved = queue.move_within_level("c", 1).unwrap();
        assert_eq!(moved.priority_order, 1.5);
    }

    #[test]
    fn drag_after_last_adds_one() {
        let mut queue = PriorityQueue::new();
        queue.enqueue("a", PRIORITY_MEDIUM, now()); // 1.0
        queue.enqueue("b", PRIORITY_MEDIUM, now()); // 2.0

        let moved = queue.move_within_level("a", 1).unwrap();
        assert_eq!(moved.priority_order, 3.0);
    }

    #[test]
    fn midpoint_stays_strictly_between_neighbors() {
        let mut lo = 1.0_f64;
        let mut hi = 2.0_f64;
        // Repeated insertion between the same neighbors keeps producing
        // values strictly inside the interval.
        for _ in 0..50 {
            let mid = insertion_order(Some(lo), Some(hi));
            assert!(mid > lo && mid < hi, "{mid} escaped ({lo}, {hi})");
            hi = mid;
        }
    }

    #[test]
    fn level_change_appends_to_new_level() {
        let mut queue = PriorityQueue::new();
        queue.enqueue("a", PRIORITY_HIGH, now()); // high 1.0
        queue.enqueue("b", PRIORITY_MEDIUM, now()); // med 1.0
        queue.enqueue("c", PRIORITY_MEDIUM, now()); // med 2.0

        let moved = queue.set_priority("a", PRIORITY_MEDIUM).unwrap();
        // Old order value is not preserved: a lands at the end of medium.
        assert_eq!(moved.priority_order, 3.0);
        assert_eq!(moved.priority, PRIORITY_MEDIUM);
    }

    #[test]
    fn set_same_priority_is_noop() {
        let mut queue = PriorityQueue::new();
        queue.enqueue("a", PRIORITY_MEDIUM, now());
        queue.enqueue("b", PRIORITY_MEDIUM, now());
        queue.move_within_level("a", 1);
        let before = queue.state_for("a");
        queue.set_priority("a", PRIORITY_MEDIUM);
        assert_eq!(queue.state_for("a"), before);
    }

    #[test]
    fn priority_removal_resets_invariant_defaults() {
        let mut queue = PriorityQueue::new();
        queue.enqueue("s1", PRIORITY_HIGH, now());
        queue.remove("s1");
        let state = queue.state_for("s1");
        assert!(!state.is_in_queue);
        assert_eq!(state.priority, PRIORITY_LOW);
        assert_eq!(state.priority_order, 0.0);
        assert!(state.queued_at.is_none());
    }

    #[test]
    fn move_on_unknown_session_is_none() {
        let mut queue = PriorityQueue::new();
        assert!(queue.move_within_level("ghost", 0).is_none());
        assert!(queue.set_priority("ghost", PRIORITY_HIGH).is_none());
    }
}
