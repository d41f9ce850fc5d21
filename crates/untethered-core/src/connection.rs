//! Connection manager: socket lifecycle, authentication handshake, and
//! reconnection with bounded exponential backoff.
//!
//! Lifecycle: `Disconnected → Connecting → AwaitingHello → Authenticating →
//! Connected`, with `auth_error` dropping back to `Disconnected` (not
//! retryable without new credentials) and any socket error or close from
//! `Connected` moving to `Reconnecting`. Retries are bounded: once the
//! attempt counter reaches the configured maximum the manager surfaces a
//! terminal failure and stops dialing until an explicit user reconnect.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, Mutex};
use tokio::time::Duration;
use tokio_tungstenite::tungstenite::Message as WsFrame;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use untethered_observability::redact;
use untethered_types::{ConnectionPhase, ConnectionStatus, EngineEvent};
use untethered_wire::{decode_server_message, encode_client_message, ClientMessage, ServerMessage};

use crate::config::EngineConfig;
use crate::engine::Inbound;
use crate::error::EngineError;
use crate::event_bus::EventBus;

/// Transport-level transitions the engine reacts to (as opposed to merely
/// observing): `Online` triggers resubscription of every tracked session,
/// `Offline` clears all turn locks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Online,
    Offline,
}

/// Reconnect delay for a 0-based attempt index: `min(2^attempt, cap)`
/// seconds. For the default 60s cap, attempts 0..7 yield
/// 1, 2, 4, 8, 16, 32, 60, 60.
pub fn backoff_delay(attempt: u32, cap_secs: u64) -> Duration {
    let exp = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
    Duration::from_secs(exp.min(cap_secs))
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// Pure connection state: phase plus the failed-attempt counter. The socket
/// loop drives it; everything observable goes out as [`ConnectionStatus`].
#[derive(Debug, Default)]
pub(crate) struct ConnState {
    status: ConnectionStatus,
}

impl ConnState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status.clone()
    }

    pub fn attempt(&self) -> u32 {
        self.status.attempt
    }

    pub fn on_dial(&mut self) {
        self.status.phase = ConnectionPhase::Connecting;
    }

    pub fn on_socket_open(&mut self) {
        self.status.phase = ConnectionPhase::AwaitingHello;
    }

    pub fn on_hello(&mut self) {
        self.status.phase = ConnectionPhase::Authenticating;
    }

    pub fn on_connected(&mut self) {
        self.status.phase = ConnectionPhase::Connected;
        self.status.attempt = 0;
        self.status.last_error = None;
    }

    /// Auth failures are terminal: no retry without new credentials. The
    /// message stays as generic as the server sent it.
    pub fn on_auth_error(&mut self, message: &str) {
        self.status.phase = ConnectionPhase::Disconnected;
        self.status.last_error = Some(message.to_string());
    }

    /// Socket failure or close. Returns the new failed-attempt count.
    pub fn on_connection_lost(&mut self, error: &str) -> u32 {
        self.status.phase = ConnectionPhase::Reconnecting;
        self.status.last_error = Some(error.to_string());
        self.status.attempt += 1;
        self.status.attempt
    }

    pub fn on_gave_up(&mut self) {
        self.status.phase = ConnectionPhase::Disconnected;
    }

    pub fn on_cancelled(&mut self) {
        self.status.phase = ConnectionPhase::Disconnected;
        self.status.attempt = 0;
    }
}

// ---------------------------------------------------------------------------
// Socket task
// ---------------------------------------------------------------------------

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Shared handle to the engine's outbound frame queue. Exactly one
/// connection task drains it at a time; the mutex enforces that across
/// explicit disconnect/reconnect cycles.
pub type OutboundQueue = Arc<Mutex<mpsc::UnboundedReceiver<ClientMessage>>>;

enum HandshakeError {
    Auth(String),
    Transport(String),
}

enum PumpExit {
    Cancelled,
    Lost(String),
}

pub struct ConnectionManager {
    config: EngineConfig,
    inbound: mpsc::Sender<Inbound>,
    outbound: OutboundQueue,
    bus: EventBus,
}

impl ConnectionManager {
    pub fn new(
        config: EngineConfig,
        inbound: mpsc::Sender<Inbound>,
        outbound: OutboundQueue,
        bus: EventBus,
    ) -> Self {
        Self {
            config,
            inbound,
            outbound,
            bus,
        }
    }

    fn publish_status(&self, state: &ConnState) {
        self.bus.publish(EngineEvent::Connection(state.status()));
    }

    async fn notify(&self, event: TransportEvent) {
        let _ = self.inbound.send(Inbound::Transport(event)).await;
    }

    /// Run until cancelled, authentication fails, or the retry budget is
    /// exhausted. The caller owns the cancellation token; cancelling it is
    /// the explicit user disconnect and also stops any pending backoff
    /// timer from firing.
    pub async fn run(self, cancel: CancellationToken) {
        let mut state = ConnState::new();

        loop {
            state.on_dial();
            self.publish_status(&state);

            let dial = tokio::select! {
                _ = cancel.cancelled() => {
                    state.on_cancelled();
                    self.publish_status(&state);
                    return;
                }
                dial = connect_async(&self.config.server_url) => dial,
            };

            let error = match dial {
                Ok((stream, _)) => {
                    state.on_socket_open();
                    self.publish_status(&state);

                    match self.handshake(stream, &mut state).await {
                        Ok(stream) => {
                            state.on_connected();
                            self.publish_status(&state);
                            info!("connected and authenticated");
                            self.notify(TransportEvent::Online).await;

                            match self.pump(stream, &cancel).await {
                                PumpExit::Cancelled => {
                                    self.notify(TransportEvent::Offline).await;
                                    state.on_cancelled();
                                    self.publish_status(&state);
                                    return;
                                }
                                PumpExit::Lost(err) => {
                                    self.notify(TransportEvent::Offline).await;
                                    err
                                }
                            }
                        }
                        Err(HandshakeError::Auth(message)) => {
                            // The surfaced message must not distinguish a
                            // missing key from an invalid one.
                            warn!(api_key = %redact(&self.config.api_key), "authentication rejected");
                            state.on_auth_error(&message);
                            self.publish_status(&state);
                            self.bus
                                .publish(EngineEvent::ConnectionGaveUp { message });
                            return;
                        }
                        Err(HandshakeError::Transport(err)) => err,
                    }
                }
                Err(err) => err.to_string(),
            };

            let attempt = state.on_connection_lost(&error);
            self.publish_status(&state);
            warn!(attempt, error = %error, "connection lost");

            if attempt >= self.config.max_reconnect_attempts {
                state.on_gave_up();
                self.publish_status(&state);
                let terminal = EngineError::RetriesExhausted { attempts: attempt };
                self.bus.publish(EngineEvent::ConnectionGaveUp {
                    message: format!("{terminal}: {error}"),
                });
                return;
            }

            let delay = backoff_delay(attempt - 1, self.config.backoff_cap_secs);
            debug!(attempt, delay_secs = delay.as_secs(), "backing off before redial");
            tokio::select! {
                _ = cancel.cancelled() => {
                    state.on_cancelled();
                    self.publish_status(&state);
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Drive `AwaitingHello → Authenticating → Connected`. Frames other
    /// than the handshake frames are ignored here; the backend sends
    /// nothing else before `connected`.
    async fn handshake(
        &self,
        mut stream: WsStream,
        state: &mut ConnState,
    ) -> Result<WsStream, HandshakeError> {
        loop {
            let frame = match stream.next().await {
                Some(Ok(WsFrame::Text(text))) => text,
                Some(Ok(WsFrame::Close(_))) | None => {
                    return Err(HandshakeError::Transport(
                        "socket closed during handshake".into(),
                    ));
                }
                Some(Ok(_)) => continue,
                Some(Err(err)) => return Err(HandshakeError::Transport(err.to_string())),
            };

            let decoded = match decode_server_message(&frame) {
                Ok(decoded) => decoded,
                Err(err) => {
                    warn!(%err, "malformed handshake frame dropped");
                    continue;
                }
            };

            match decoded {
                ServerMessage::Hello { version, .. } => {
                    debug!(version = version.as_deref().unwrap_or("unknown"), "hello received");
                    state.on_hello();
                    self.publish_status(state);

                    let connect = ClientMessage::Connect {
                        session_id: self.config.client_session_id.clone(),
                        api_key: self.config.api_key.clone(),
                    };
                    let raw = encode_client_message(&connect)
                        .map_err(|err| HandshakeError::Transport(err.to_string()))?;
                    stream
                        .send(WsFrame::Text(raw))
                        .await
                        .map_err(|err| HandshakeError::Transport(err.to_string()))?;
                }
                ServerMessage::Connected { session_id, .. } => {
                    debug!(session_id = session_id.as_deref().unwrap_or(""), "authenticated");
                    return Ok(stream);
                }
                ServerMessage::AuthError { message } => {
                    return Err(HandshakeError::Auth(
                        message.unwrap_or_else(|| "authentication failed".into()),
                    ));
                }
                other => {
                    debug!(?other, "unexpected frame during handshake ignored");
                }
            }
        }
    }

    /// Connected steady state: forward outbound frames, decode inbound
    /// ones, keep the ping cadence. Malformed inbound JSON is logged and
    /// dropped; unknown frame types pass through as no-ops.
    async fn pump(&self, stream: WsStream, cancel: &CancellationToken) -> PumpExit {
        let (mut write, mut read) = stream.split();
        let mut outbound = self.outbound.lock().await;

        let mut ping = tokio::time::interval(Duration::from_secs(
            self.config.ping_interval_secs.max(1),
        ));
        ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        ping.tick().await; // the first tick fires immediately

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = write.send(WsFrame::Close(None)).await;
                    return PumpExit::Cancelled;
                }
                _ = ping.tick() => {
                    let Ok(raw) = encode_client_message(&ClientMessage::Ping) else {
                        continue;
                    };
                    if let Err(err) = write.send(WsFrame::Text(raw)).await {
                        return PumpExit::Lost(err.to_string());
                    }
                }
                frame = outbound.recv() => {
                    let Some(frame) = frame else {
                        return PumpExit::Cancelled; // engine is gone
                    };
                    let raw = match encode_client_message(&frame) {
                        Ok(raw) => raw,
                        Err(err) => {
                            warn!(%err, "unencodable outbound frame dropped");
                            continue;
                        }
                    };
                    if let Err(err) = write.send(WsFrame::Text(raw)).await {
                        return PumpExit::Lost(err.to_string());
                    }
                }
                frame = read.next() => {
                    let text = match frame {
                        Some(Ok(WsFrame::Text(text))) => text,
                        Some(Ok(WsFrame::Close(_))) | None => {
                            return PumpExit::Lost("socket closed".into());
                        }
                        Some(Ok(_)) => continue,
                        Some(Err(err)) => return PumpExit::Lost(err.to_string()),
                    };
                    match decode_server_message(&text) {
                        Ok(decoded) => {
                            if self.inbound.send(Inbound::Frame(decoded)).await.is_err() {
                                return PumpExit::Cancelled;
                            }
                        }
                        Err(err) => {
                            // Recoverable: a partially compatible backend
                            // must not take the client down.
                            warn!(%err, "malformed inbound frame dropped");
                        }
                    }
                }
            }
        }
    }
}
