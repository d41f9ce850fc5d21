//! Per-session turn locks.
//!
//! Locks are purely server-driven: `session_locked` sets one,
//! `turn_complete` clears it, and a disconnect clears all of them: the
//! connection that would have unlocked a session is gone, so the engine
//! fails open rather than leaving a session stuck locked.

use std::collections::HashSet;

use parking_lot::Mutex;

#[derive(Default)]
pub struct LockBoard {
    locked: Mutex<HashSet<String>>,
}

impl LockBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the session was not locked before.
    pub fn lock(&self, session_id: &str) -> bool {
        self.locked.lock().insert(session_id.to_string())
    }

    /// Returns `true` if the session was locked.
    pub fn unlock(&self, session_id: &str) -> bool {
        self.locked.lock().remove(session_id)
    }

    pub fn is_locked(&self, session_id: &str) -> bool {
        self.locked.lock().contains(session_id)
    }

    /// Unlock everything, returning the sessions that were locked so the
    /// caller can publish the transitions.
    pub fn clear_all(&self) -> Vec<String> {
        let mut cleared: Vec<String> = self.locked.lock().drain().collect();
        cleared.sort();
        cleared
    }

    pub fn locked_count(&self) -> usize {
        self.locked.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_unlock_cycle() {
        let board = LockBoard::new();
        assert!(board.lock("s1"));
        assert!(!board.lock("s1"));
        assert!(board.is_locked("s1"));
        assert!(board.unlock("s1"));
        assert!(!board.unlock("s1"));
        assert!(!board.is_locked("s1"));
    }

    #[test]
    fn clear_all_reports_what_was_locked() {
        let board = LockBoard::new();
        board.lock("s2");
        board.lock("s1");
        let cleared = board.clear_all();
        assert_eq!(cleared, vec!["s1".to_string(), "s2".to_string()]);
        assert_eq!(board.locked_count(), 0);
    }
}
