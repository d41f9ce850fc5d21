use serde::{Deserialize, Serialize};

use untethered_types::{api_key_is_valid, new_session_id};

use crate::error::EngineError;

/// Engine settings. Everything beyond the server URL and API key has a
/// serde default so a config file can stay minimal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// WebSocket endpoint, e.g. `wss://backend.example/ws`.
    pub server_url: String,
    /// `untethered-` + 32 lowercase hex characters. Validated client-side
    /// before any dial.
    pub api_key: String,
    /// Identifies this client instance in the `connect` handshake. One
    /// logical connection per client instance.
    #[serde(default = "new_session_id")]
    pub client_session_id: String,
    /// Reconnect attempts before the engine gives up until an explicit
    /// user-triggered reconnect.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    /// Upper bound on the exponential backoff delay, in seconds.
    #[serde(default = "default_backoff_cap_secs")]
    pub backoff_cap_secs: u64,
    /// Keepalive ping cadence while connected, in seconds.
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,
    /// How long finished command executions stay in the tracker.
    #[serde(default = "default_command_eviction_window_secs")]
    pub command_eviction_window_secs: i64,
    /// Hard cap on tracked command executions.
    #[serde(default = "default_command_tracker_cap")]
    pub command_tracker_cap: usize,
    /// Capacity of the engine's intent/inbound channels.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_max_reconnect_attempts() -> u32 {
    8
}

fn default_backoff_cap_secs() -> u64 {
    60
}

fn default_ping_interval_secs() -> u64 {
    30
}

fn default_command_eviction_window_secs() -> i64 {
    600
}

fn default_command_tracker_cap() -> usize {
    64
}

fn default_channel_capacity() -> usize {
    256
}

impl EngineConfig {
    pub fn new(server_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            api_key: api_key.into(),
            client_session_id: new_session_id(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            backoff_cap_secs: default_backoff_cap_secs(),
            ping_interval_secs: default_ping_interval_secs(),
            command_eviction_window_secs: default_command_eviction_window_secs(),
            command_tracker_cap: default_command_tracker_cap(),
            channel_capacity: default_channel_capacity(),
        }
    }

    /// Reject malformed API keys before any network round trip.
    pub fn validate(&self) -> Result<(), EngineError> {
        if !api_key_is_valid(&self.api_key) {
            return Err(EngineError::InvalidApiKey);
        }
        Ok(())
    }
}
