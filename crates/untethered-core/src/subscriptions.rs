//! Subscription registry: which sessions the client wants live updates for,
//! plus each session's delta-sync watermark.
//!
//! The working set is mutated only through this API and snapshotted for
//! iteration; the underlying map is never handed out. All identifiers here
//! are already canonical; normalization happens at the engine boundary.

use std::collections::HashMap;

use parking_lot::Mutex;

/// One tracked session: the last message id the client already holds
/// (`None` means no prior history, so the next subscribe requests the full
/// history) and whether the last history batch was truncated.
#[derive(Debug, Clone, PartialEq)]
pub struct Subscription {
    pub session_id: String,
    pub last_message_id: Option<String>,
    pub truncated: bool,
}

#[derive(Default)]
pub struct SubscriptionRegistry {
    inner: Mutex<HashMap<String, Subscription>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a session. Returns `true` if it was not tracked
    /// before; re-tracking keeps the existing watermark.
    pub fn track(&self, session_id: &str) -> bool {
        let mut inner = self.inner.lock();
        if inner.contains_key(session_id) {
            return false;
        }
        inner.insert(
            session_id.to_string(),
            Subscription {
                session_id: session_id.to_string(),
                last_message_id: None,
                truncated: false,
            },
        );
        true
    }

    /// Stop tracking. Idempotent; also cancels any pending delta-sync
    /// expectation for the session since history frames for untracked
    /// sessions are dropped by the engine.
    pub fn untrack(&self, session_id: &str) -> bool {
        self.inner.lock().remove(session_id).is_some()
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.inner.lock().contains_key(session_id)
    }

    pub fn watermark(&self, session_id: &str) -> Option<String> {
        self.inner
            .lock()
            .get(session_id)
            .and_then(|s| s.last_message_id.clone())
    }

    /// Advance the watermark after a history merge. No-op for untracked
    /// sessions.
    pub fn advance(&self, session_id: &str, newest_message_id: String) {
        if let Some(sub) = self.inner.lock().get_mut(session_id) {
            sub.last_message_id = Some(newest_message_id);
        }
    }

    /// Flag or clear truncation (`is_complete=false` in the last batch).
    /// Truncation marks the session as needing a follow-up fetch but never
    /// forces one.
    pub fn set_truncated(&self, session_id: &str, truncated: bool) {
        if let Some(sub) = self.inner.lock().get_mut(session_id) {
            sub.truncated = truncated;
        }
    }

    /// Stable copy of the working set, for resubscription after reconnect.
    pub fn snapshot(&self) -> Vec<Subscription> {
        let mut subs: Vec<Subscription> = self.inner.lock().values().cloned().collect();
        subs.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        subs
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn track_is_idempotent_and_keeps_watermark() {
        let registry = SubscriptionRegistry::new();
        assert!(registry.track("s1"));
        registry.advance("s1", "m5".into());
        assert!(!registry.track("s1"));
        assert_eq!(registry.watermark("s1").as_deref(), Some("m5"));
    }

    #[test]
    fn untrack_is_idempotent() {
        let registry = SubscriptionRegistry::new();
        registry.track("s1");
        assert!(registry.untrack("s1"));
        assert!(!registry.untrack("s1"));
        assert!(registry.is_empty());
    }

    #[test]
    fn advance_ignores_untracked_sessions() {
        let registry = SubscriptionRegistry::new();
        registry.advance("ghost", "m1".into());
        assert_eq!(registry.watermark("ghost"), None);
    }

    #[test]
    fn snapshot_is_a_copy() {
        let registry = SubscriptionRegistry::new();
        registry.track("s2");
        registry.track("s1");
        let snap = registry.snapshot();
        assert_eq!(snap.len(), 2);
        assert_eq!(snap[0].session_id, "s1");

        registry.untrack("s1");
        // The snapshot is unaffected by later mutation.
        assert_eq!(snap.len(), 2);
    }

    #[test]
    fn truncated_flag_round_trips() {
        let registry = SubscriptionRegistry::new();
        registry.track("s1");
        registry.set_truncated("s1", true);
        assert!(registry.snapshot()[0].truncated);
        registry.set_truncated("s1", false);
        assert!(!registry.snapshot()[0].truncated);
    }
}
