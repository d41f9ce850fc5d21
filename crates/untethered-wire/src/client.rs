use serde::{Deserialize, Serialize};

/// Frames the client sends. `Connect` must carry a key that already passed
/// [`untethered_types::api_key_is_valid`]; the engine rejects malformed keys
/// without a round trip.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Connect {
        session_id: String,
        api_key: String,
    },
    Subscribe {
        session_id: String,
        /// Omitted entirely when the client has no prior history, which
        /// requests the full history.
        #[serde(skip_serializing_if = "Option::is_none")]
        last_message_id: Option<String>,
    },
    Prompt {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        working_directory: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        system_prompt: Option<String>,
    },
    MessageAck {
        message_id: String,
    },
    ExecuteCommand {
        command_session_id: String,
        command_id: String,
        command: String,
        working_directory: String,
    },
    RefreshSessions {
        #[serde(skip_serializing_if = "Option::is_none")]
        recent_sessions_limit: Option<u32>,
    },
    CompactSession {
        session_id: String,
    },
    Ping,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_serializes_snake_case_tag() {
        let msg = ClientMessage::Connect {
            session_id: "s1".into(),
            api_key: "untethered-0123456789abcdef0123456789abcdef".into(),
        };
        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&msg).unwrap()).unwrap();
        assert_eq!(json["type"], "connect");
        assert_eq!(json["session_id"], "s1");
    }

    #[test]
    fn subscribe_omits_absent_watermark() {
        let msg = ClientMessage::Subscribe {
            session_id: "s1".into(),
            last_message_id: None,
        };
        let raw = serde_json::to_string(&msg).unwrap();
        assert!(!raw.contains("last_message_id"));

        let msg = ClientMessage::Subscribe {
            session_id: "s1".into(),
            last_message_id: Some("m10".into()),
        };
        let raw = serde_json::to_string(&msg).unwrap();
        assert!(raw.contains("\"last_message_id\":\"m10\""));
    }

    #[test]
    fn ping_is_bare_type() {
        assert_eq!(
            serde_json::to_string(&ClientMessage::Ping).unwrap(),
            r#"{"type":"ping"}"#
        );
    }

    #[test]
    fn prompt_skips_optional_fields() {
        let msg = ClientMessage::Prompt {
            text: "hi".into(),
            session_id: None,
            working_directory: None,
            system_prompt: None,
        };
        assert_eq!(
            serde_json::to_string(&msg).unwrap(),
            r#"{"type":"prompt","text":"hi"}"#
        );
    }
}
