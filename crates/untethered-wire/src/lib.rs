//! Wire-format models for the Untethered WebSocket protocol.
//!
//! Every frame is a JSON object discriminated by a snake_case `type` field.
//! Decoding is tolerant by contract: unknown fields are ignored, unknown
//! types decode to [`ServerMessage::Unknown`] (a no-op for the engine), and
//! malformed JSON is an ordinary decode error, never a panic.

pub mod client;
pub mod server;

pub use client::*;
pub use server::*;

/// Serialize an outbound frame. Keys are snake_case, matching the catalogue.
pub fn encode_client_message(msg: &ClientMessage) -> serde_json::Result<String> {
    serde_json::to_string(msg)
}

/// Parse an inbound frame. Unknown `type` values land on
/// [`ServerMessage::Unknown`]; anything unparsable is an `Err` the caller
/// logs and drops.
pub fn decode_server_message(raw: &str) -> serde_json::Result<ServerMessage> {
    serde_json::from_str(raw)
}
