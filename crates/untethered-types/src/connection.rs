use serde::{Deserialize, Serialize};

/// Where the connection manager currently is in its lifecycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionPhase {
    Disconnected,
    Connecting,
    AwaitingHello,
    Authenticating,
    Connected,
    Reconnecting,
}

/// Connection status surfaced to observers: the phase plus the reconnect
/// attempt counter and the last transport/auth error, if any.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionStatus {
    pub phase: ConnectionPhase,
    #[serde(default)]
    pub attempt: u32,
    #[serde(default)]
    pub last_error: Option<String>,
}

impl ConnectionStatus {
    pub fn disconnected() -> Self {
        Self {
            phase: ConnectionPhase::Disconnected,
            attempt: 0,
            last_error: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.phase == ConnectionPhase::Connected
    }
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self::disconnected()
    }
}
