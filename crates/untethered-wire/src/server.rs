use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use untethered_types::{DeliveryStatus, Message, MessageRole, OutputStream, Usage};

/// A message as it appears on the wire, inside `session_history` batches and
/// `replay` frames. The `id` is kept verbatim; message identifiers are
/// opaque and case-preserving, unlike session identifiers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WireMessage {
    pub id: String,
    #[serde(default)]
    pub session_id: Option<String>,
    pub role: MessageRole,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub usage: Option<Usage>,
    #[serde(default)]
    pub cost: Option<f64>,
}

impl WireMessage {
    /// Convert into a confirmed client-side record, falling back to
    /// `default_session_id` when the frame omits one.
    pub fn into_message(self, default_session_id: &str) -> Message {
        Message {
            id: self.id,
            session_id: self
                .session_id
                .unwrap_or_else(|| default_session_id.to_string()),
            role: self.role,
            text: self.text,
            timestamp: self.timestamp,
            usage: self.usage,
            cost: self.cost,
            status: DeliveryStatus::Confirmed,
        }
    }
}

/// A session summary as carried by `recent_sessions` / `session_list`.
/// Identifiers arrive in whatever case the backend used; the engine
/// normalizes them before upserting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WireSession {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub custom_name: Option<String>,
    #[serde(default)]
    pub working_directory: Option<String>,
    #[serde(default)]
    pub message_count: Option<u64>,
    #[serde(default)]
    pub unread_count: Option<u64>,
}

fn default_true() -> bool {
    true
}

/// Frames the backend sends. Unknown `type` values decode to `Unknown` and
/// are treated as no-ops; unknown fields inside known frames are ignored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Hello {
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        version: Option<String>,
        #[serde(default)]
        auth_version: Option<String>,
        #[serde(default)]
        instructions: Option<String>,
    },
    Connected {
        #[serde(default)]
        session_id: Option<String>,
        #[serde(default)]
        message: Option<String>,
    },
    /// The message is generic; it must never be inspected to distinguish a
    /// missing key from an invalid one.
    AuthError {
        #[serde(default)]
        message: Option<String>,
    },
    SessionHistory {
        session_id: String,
        #[serde(default)]
        messages: Vec<WireMessage>,
        /// Count of all messages the backend holds for the session, not
        /// just those returned in this batch.
        #[serde(default)]
        total_count: u64,
        #[serde(default)]
        oldest_message_id: Option<String>,
        #[serde(default)]
        newest_message_id: Option<String>,
        /// False when the backend truncated a large response.
        #[serde(default = "default_true")]
        is_complete: bool,
    },
    Response {
        message_id: String,
        #[serde(default)]
        success: bool,
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        error: Option<String>,
        #[serde(default)]
        session_id: Option<String>,
        #[serde(default)]
        usage: Option<Usage>,
        #[serde(default)]
        cost: Option<f64>,
    },
    SessionLocked {
        session_id: String,
        #[serde(default)]
        message: Option<String>,
    },
    TurnComplete {
        session_id: String,
    },
    Replay {
        message_id: String,
        message: WireMessage,
    },
    CommandOutput {
        command_session_id: String,
        stream: OutputStream,
        #[serde(default)]
        text: String,
    },
    CommandComplete {
        command_session_id: String,
        exit_code: i32,
        #[serde(default)]
        duration_ms: Option<u64>,
    },
    #[serde(rename = "recent_sessions", alias = "session_list")]
    RecentSessions {
        #[serde(default)]
        sessions: Vec<WireSession>,
    },
    CompactionComplete {
        session_id: String,
    },
    CompactionError {
        session_id: String,
        #[serde(default)]
        error: Option<String>,
    },
    Ack,
    Error {
        #[serde(default)]
        message: Option<String>,
    },
    Pong,
    #[serde(other)]
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode_server_message;

    #[test]
    fn unknown_type_decodes_to_noop() {
        let msg = decode_server_message(r#"{"type":"telemetry_v2","blob":123}"#).unwrap();
        assert_eq!(msg, ServerMessage::Unknown);
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let msg = decode_server_message(
            r#"{"type":"turn_complete","session_id":"s1","server_ts":99}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            ServerMessage::TurnComplete {
                session_id: "s1".into()
            }
        );
    }

    #[test]
    fn malformed_json_is_an_error_not_a_panic() {
        assert!(decode_server_message("{nope").is_err());
        assert!(decode_server_message("").is_err());
    }

    #[test]
    fn session_history_defaults_is_complete() {
        let msg = decode_server_message(
            r#"{"type":"session_history","session_id":"s1","messages":[],"total_count":0}"#,
        )
        .unwrap();
        match msg {
            ServerMessage::SessionHistory { is_complete, .. } => assert!(is_complete),
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn session_list_alias_maps_to_recent_sessions() {
        let msg = decode_server_message(
            r#"{"type":"session_list","sessions":[{"id":"S1","name":"demo"}]}"#,
        )
        .unwrap();
        match msg {
            ServerMessage::RecentSessions { sessions } => {
                assert_eq!(sessions.len(), 1);
                assert_eq!(sessions[0].id, "S1");
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn replay_carries_nested_message() {
        let msg = decode_server_message(
            r#"{"type":"replay","message_id":"MsG-1","message":{"id":"MsG-1","role":"assistant","text":"done"}}"#,
        )
        .unwrap();
        match msg {
            ServerMessage::Replay {
                message_id,
                message,
            } => {
                // Message IDs keep their case verbatim.
                assert_eq!(message_id, "MsG-1");
                assert_eq!(message.id, "MsG-1");
                assert_eq!(message.role, MessageRole::Assistant);
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn wire_message_falls_back_to_default_session() {
        let wire = WireMessage {
            id: "m1".into(),
            session_id: None,
            role: MessageRole::User,
            text: "hi".into(),
            timestamp: None,
            usage: None,
            cost: None,
        };
        let message = wire.into_message("s-default");
        assert_eq!(message.session_id, "s-default");
        assert_eq!(message.status, DeliveryStatus::Confirmed);
    }

    #[test]
    fn command_output_stream_tags() {
        let msg = decode_server_message(
            r#"{"type":"command_output","command_session_id":"c1","stream":"stderr","text":"boom"}"#,
        )
        .unwrap();
        match msg {
            ServerMessage::CommandOutput { stream, .. } => {
                assert_eq!(stream, OutputStream::Stderr);
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}
