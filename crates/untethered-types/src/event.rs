use serde::Serialize;

use crate::{CommandExecution, ConnectionStatus, Message, Session};

/// State changes the engine publishes for UI layers to observe. Consumers
/// subscribe through the engine's event bus; the engine never calls into UI
/// code directly.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EngineEvent {
    /// Connection phase, attempt counter, or last error changed.
    Connection(ConnectionStatus),
    /// A session record was created or updated from server data.
    SessionUpserted(Session),
    /// A message was applied (history merge, replay, or response).
    MessageUpserted(Message),
    /// A session's turn lock changed.
    LockChanged { session_id: String, locked: bool },
    /// FIFO or priority queue contents changed for a session.
    QueueChanged { session_id: String },
    /// A delta sync exchange finished for a session.
    HistorySynced {
        session_id: String,
        applied: usize,
        total_count: u64,
        truncated: bool,
    },
    /// A command execution was created, received output, or finished.
    CommandUpdated(CommandExecution),
    /// Compaction finished for a session; `error` is set on failure.
    CompactionFinished {
        session_id: String,
        error: Option<String>,
    },
    /// The backend rejected a request with a generic error message.
    ServerError { message: String },
    /// The connection reached a terminal state: reconnection exhausted its
    /// attempt bound, or authentication was rejected. Only an explicit
    /// user-triggered reconnect clears this.
    ConnectionGaveUp { message: String },
}
