use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Canonical priority levels for the priority queue. Lower is more urgent.
pub const PRIORITY_HIGH: i32 = 1;
pub const PRIORITY_MEDIUM: i32 = 5;
pub const PRIORITY_LOW: i32 = 10;

/// FIFO worklist membership for one session. All three fields are set and
/// cleared together; a session outside the queue always reads
/// `is_in_queue=false, position=0, queued_at=None`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FifoQueueState {
    #[serde(default)]
    pub is_in_queue: bool,
    #[serde(default)]
    pub position: u64,
    #[serde(default)]
    pub queued_at: Option<DateTime<Utc>>,
}

/// Priority worklist membership for one session. Membership and the queue
/// metadata are reset atomically together; a session outside the queue
/// always reports priority 10 (Low) and order 0.0.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriorityQueueState {
    #[serde(default)]
    pub is_in_queue: bool,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default)]
    pub priority_order: f64,
    #[serde(default)]
    pub queued_at: Option<DateTime<Utc>>,
}

fn default_priority() -> i32 {
    PRIORITY_LOW
}

impl Default for PriorityQueueState {
    fn default() -> Self {
        Self {
            is_in_queue: false,
            priority: PRIORITY_LOW,
            priority_order: 0.0,
            queued_at: None,
        }
    }
}

/// One conversational session as the client knows it. The `id` is always in
/// canonical lowercase UUID form (see [`crate::ids::normalize_session_id`]).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub custom_name: Option<String>,
    #[serde(default)]
    pub working_directory: String,
    #[serde(default)]
    pub message_count: u64,
    #[serde(default)]
    pub unread_count: u64,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub fifo: FifoQueueState,
    #[serde(default)]
    pub priority_queue: PriorityQueueState,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            custom_name: None,
            working_directory: String::new(),
            message_count: 0,
            unread_count: 0,
            deleted: false,
            locked: false,
            fifo: FifoQueueState::default(),
            priority_queue: PriorityQueueState::default(),
        }
    }

    /// Display name preference: user-assigned custom name, then the
    /// backend-assigned name, then the identifier itself.
    pub fn display_name(&self) -> &str {
        self.custom_name
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or(&self.id)
    }
}
