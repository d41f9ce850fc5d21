//! Thin client facade: spawns the engine task, owns the connection
//! lifecycle, and exposes the intent surface platform shells call.
//!
//! Exactly one logical connection exists per client instance. Intents are
//! queued to the engine task; state comes back on the event bus. UI layers
//! hold this handle and a [`tokio::sync::broadcast::Receiver`] of
//! [`EngineEvent`], nothing else.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use untethered_types::EngineEvent;

use crate::config::EngineConfig;
use crate::connection::{ConnectionManager, OutboundQueue};
use crate::engine::{Engine, Inbound};
use crate::error::EngineError;
use crate::event_bus::EventBus;
use crate::store::SessionStore;

enum Intent {
    Subscribe(String),
    Unsubscribe(String),
    SendPrompt {
        text: String,
        session_id: Option<String>,
        working_directory: Option<String>,
        system_prompt: Option<String>,
    },
    ExecuteCommand {
        command: String,
        working_directory: String,
        reply: oneshot::Sender<Result<String, EngineError>>,
    },
    RefreshSessions(Option<u32>),
    CompactSession(String),
    FifoEnqueue(String),
    FifoRemove(String),
    PriorityEnqueue { session_id: String, priority: i32 },
    PrioritySetLevel { session_id: String, priority: i32 },
    PriorityMove { session_id: String, index: usize },
    PriorityRemove(String),
}

pub struct UntetheredClient {
    config: EngineConfig,
    intents: mpsc::Sender<Intent>,
    inbound: mpsc::Sender<Inbound>,
    outbound_queue: OutboundQueue,
    bus: EventBus,
    conn_cancel: Mutex<Option<CancellationToken>>,
}

impl UntetheredClient {
    /// Validate the config, spawn the engine task, and return the handle.
    /// No socket is dialed until [`connect`](Self::connect).
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn SessionStore>,
    ) -> Result<Self, EngineError> {
        config.validate()?;

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::channel(config.channel_capacity);
        let (intent_tx, intent_rx) = mpsc::channel(config.channel_capacity);

        let engine = Engine::new(config.clone(), store, outbound_tx);
        let bus = engine.event_bus();
        tokio::spawn(run_engine(engine, inbound_rx, intent_rx));

        Ok(Self {
            config,
            intents: intent_tx,
            inbound: inbound_tx,
            outbound_queue: Arc::new(tokio::sync::Mutex::new(outbound_rx)),
            bus,
            conn_cancel: Mutex::new(None),
        })
    }

    /// Observe engine state changes.
    pub fn events(&self) -> tokio::sync::broadcast::Receiver<EngineEvent> {
        self.bus.subscribe()
    }

    /// Dial (or redial) the backend. An existing connection is torn down
    /// first; this is also the explicit user-triggered reconnect that
    /// clears a terminal "unable to connect" state.
    pub fn connect(&self) {
        self.disconnect();
        let token = CancellationToken::new();
        *self.conn_cancel.lock() = Some(token.clone());

        let manager = ConnectionManager::new(
            self.config.clone(),
            self.inbound.clone(),
            self.outbound_queue.clone(),
            self.bus.clone(),
        );
        tokio::spawn(manager.run(token));
    }

    /// Tear the connection down. Cancels any pending backoff timer; the
    /// timer never fires after this.
    pub fn disconnect(&self) {
        if let Some(token) = self.conn_cancel.lock().take() {
            token.cancel();
        }
    }

    async fn intend(&self, intent: Intent) -> Result<(), EngineError> {
        self.intents
            .send(intent)
            .await
            .map_err(|_| EngineError::EngineGone)
    }

    pub async fn subscribe(&self, session_id: &str) -> Result<(), EngineError> {
        self.intend(Intent::Subscribe(session_id.to_string())).await
    }

    pub async fn unsubscribe(&self, session_id: &str) -> Result<(), EngineError> {
        self.intend(Intent::Unsubscribe(session_id.to_string()))
            .await
    }

    pub async fn send_prompt(
        &self,
        text: &str,
        session_id: Option<&str>,
        working_directory: Option<&str>,
        system_prompt: Option<&str>,
    ) -> Result<(), EngineError> {
        self.intend(Intent::SendPrompt {
            text: text.to_string(),
            session_id: session_id.map(str::to_string),
            working_directory: working_directory.map(str::to_string),
            system_prompt: system_prompt.map(str::to_string),
        })
        .await
    }

    /// Returns the command-session id tracking this execution.
    pub async fn execute_command(
        &self,
        command: &str,
        working_directory: &str,
    ) -> Result<String, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.intend(Intent::ExecuteCommand {
            command: command.to_string(),
            working_directory: working_directory.to_string(),
            reply: reply_tx,
        })
        .await?;
        reply_rx.await.map_err(|_| EngineError::EngineGone)?
    }

    pub async fn refresh_sessions(&self, limit: Option<u32>) -> Result<(), EngineError> {
        self.intend(Intent::RefreshSessions(limit)).await
    }

    pub async fn compact_session(&self, session_id: &str) -> Result<(), EngineError> {
        self.intend(Intent::CompactSession(session_id.to_string()))
            .await
    }

    pub async fn fifo_enqueue(&self, session_id: &str) -> Result<(), EngineError> {
        self.intend(Intent::FifoEnqueue(session_id.to_string()))
            .await
    }

    pub async fn fifo_remove(&self, session_id: &str) -> Result<(), EngineError> {
        self.intend(Intent::FifoRemove(session_id.to_string())).await
    }

    pub async fn priority_enqueue(
        &self,
        session_id: &str,
        priority: i32,
    ) -> Result<(), EngineError> {
        self.intend(Intent::PriorityEnqueue {
            session_id: session_id.to_string(),
            priority,
        })
        .await
    }

    pub async fn priority_set_level(
        &self,
        session_id: &str,
        priority: i32,
    ) -> Result<(), EngineError> {
        self.intend(Intent::PrioritySetLevel {
            session_id: session_id.to_string(),
            priority,
        })
        .await
    }

    pub async fn priority_move(&self, session_id: &str, index: usize) -> Result<(), EngineError> {
        self.intend(Intent::PriorityMove {
            session_id: session_id.to_string(),
            index,
        })
        .await
    }

    pub async fn priority_remove(&self, session_id: &str) -> Result<(), EngineError> {
        self.intend(Intent::PriorityRemove(session_id.to_string()))
            .await
    }
}

impl Drop for UntetheredClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// The single serialized execution context: every frame and every intent is
/// applied here, one at a time.
async fn run_engine(
    mut engine: Engine,
    mut inbound: mpsc::Receiver<Inbound>,
    mut intents: mpsc::Receiver<Intent>,
) {
    loop {
        tokio::select! {
            maybe = inbound.recv() => {
                let Some(item) = maybe else { break };
                if let Err(err) = engine.handle_inbound(item).await {
                    warn!(%err, "inbound handling failed");
                }
            }
            maybe = intents.recv() => {
                let Some(intent) = maybe else { break };
                if let Err(err) = apply_intent(&mut engine, intent).await {
                    warn!(%err, "intent failed");
                }
            }
        }
    }
}

async fn apply_intent(engine: &mut Engine, intent: Intent) -> Result<(), EngineError> {
    match intent {
        Intent::Subscribe(id) => engine.subscribe(&id).await,
        Intent::Unsubscribe(id) => engine.unsubscribe(&id),
        Intent::SendPrompt {
            text,
            session_id,
            working_directory,
            system_prompt,
        } => {
            engine
                .send_prompt(
                    &text,
                    session_id.as_deref(),
                    working_directory.as_deref(),
                    system_prompt.as_deref(),
                )
                .await
        }
        Intent::ExecuteCommand {
            command,
            working_directory,
            reply,
        } => {
            let result = engine.execute_command(&command, &working_directory);
            let _ = reply.send(result);
            Ok(())
        }
        Intent::RefreshSessions(limit) => engine.refresh_sessions(limit),
        Intent::CompactSession(id) => engine.compact_session(&id),
        Intent::FifoEnqueue(id) => engine.fifo_enqueue(&id).await,
        Intent::FifoRemove(id) => engine.fifo_remove(&id).await,
        Intent::PriorityEnqueue {
            session_id,
            priority,
        } => engine.priority_enqueue(&session_id, priority).await,
        Intent::PrioritySetLevel {
            session_id,
            priority,
        } => engine.priority_set_level(&session_id, priority).await,
        Intent::PriorityMove { session_id, index } => {
            engine.priority_move(&session_id, index).await
        }
        Intent::PriorityRemove(id) => engine.priority_remove(&id).await,
    }
}
