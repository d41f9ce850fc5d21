//! The sync engine: one task owning all mutable session state.
//!
//! Every inbound frame and every user intent funnels through [`Engine`] on
//! a single execution context; managers are plain structs, never shared
//! mutable collections. State flows out through the event bus; conversation
//! records flow out through the persistence collaborator.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use untethered_types::{
    normalize_session_id, DeliveryStatus, EngineEvent, Message, MessageRole, Session,
};
use untethered_wire::{ClientMessage, ServerMessage, WireMessage, WireSession};

use crate::commands::CommandTracker;
use crate::config::EngineConfig;
use crate::connection::TransportEvent;
use crate::error::EngineError;
use crate::event_bus::EventBus;
use crate::locks::LockBoard;
use crate::queues::{FifoQueue, PriorityQueue};
use crate::replay::AckLedger;
use crate::store::SessionStore;
use crate::subscriptions::SubscriptionRegistry;
use crate::sync::{merge_history, subscribe_frame};

/// Everything the engine consumes: decoded frames from the socket plus
/// transport transitions it must react to.
#[derive(Debug)]
pub enum Inbound {
    Frame(ServerMessage),
    Transport(TransportEvent),
}

pub struct Engine {
    config: EngineConfig,
    store: Arc<dyn SessionStore>,
    registry: Arc<SubscriptionRegistry>,
    locks: LockBoard,
    fifo: FifoQueue,
    priority: PriorityQueue,
    commands: CommandTracker,
    acks: AckLedger,
    bus: EventBus,
    outbound: mpsc::UnboundedSender<ClientMessage>,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn SessionStore>,
        outbound: mpsc::UnboundedSender<ClientMessage>,
    ) -> Self {
        let commands = CommandTracker::new(
            config.command_eviction_window_secs,
            config.command_tracker_cap,
        );
        Self {
            config,
            store,
            registry: Arc::new(SubscriptionRegistry::new()),
            locks: LockBoard::new(),
            fifo: FifoQueue::new(),
            priority: PriorityQueue::new(),
            commands,
            acks: AckLedger::default(),
            bus: EventBus::new(),
            outbound,
        }
    }

    pub fn event_bus(&self) -> EventBus {
        self.bus.clone()
    }

    pub fn subscriptions(&self) -> Arc<SubscriptionRegistry> {
        self.registry.clone()
    }

    pub fn is_locked(&self, session_id: &str) -> bool {
        self.locks.is_locked(session_id)
    }

    pub fn fifo_order(&self) -> Vec<crate::queues::FifoEntry> {
        self.fifo.ordered()
    }

    pub fn priority_order(&self) -> Vec<crate::queues::PriorityEntry> {
        self.priority.ordered()
    }

    pub fn command(&self, command_session_id: &str) -> Option<untethered_types::CommandExecution> {
        self.commands.get(command_session_id).cloned()
    }

    pub fn tracked_command_count(&self) -> usize {
        self.commands.len()
    }

    fn send(&self, frame: ClientMessage) -> Result<(), EngineError> {
        self.outbound
            .send(frame)
            .map_err(|_| EngineError::EngineGone)
    }

    fn canonical(&self, raw: &str) -> Result<String, EngineError> {
        normalize_session_id(raw).ok_or_else(|| EngineError::InvalidSessionId(raw.to_string()))
    }

    // -----------------------------------------------------------------------
    // User intents
    // -----------------------------------------------------------------------

    /// Track a session and request the history the client is missing. On
    /// first track, the watermark is seeded from whatever the store already
    /// holds so only newer messages are requested.
    pub async fn subscribe(&mut self, raw_session_id: &str) -> Result<(), EngineError> {
        let session_id = self.canonical(raw_session_id)?;
        if self.registry.track(&session_id) {
            let existing = self.store.fetch_messages(&session_id).await?;
            if let Some(last) = existing.last() {
                self.registry.advance(&session_id, last.id.clone());
            }
        }
        self.send(subscribe_frame(&self.registry, &session_id))
    }

    /// Stop tracking a session. Idempotent; pending history for the session
    /// is dropped when it arrives.
    pub fn unsubscribe(&mut self, raw_session_id: &str) -> Result<(), EngineError> {
        let session_id = self.canonical(raw_session_id)?;
        self.registry.untrack(&session_id);
        Ok(())
    }

    pub async fn send_prompt(
        &mut self,
        text: &str,
        raw_session_id: Option<&str>,
        working_directory: Option<&str>,
        system_prompt: Option<&str>,
    ) -> Result<(), EngineError> {
        let session_id = match raw_session_id {
            Some(raw) => Some(self.canonical(raw)?),
            None => None,
        };
        if let Some(id) = session_id.as_deref() {
            if self.locks.is_locked(id) {
                // Turn in progress; the UI normally disables sending, but a
                // race is not an error, the backend arbitrates.
                warn!(session_id = id, "prompt sent while session is locked");
            }
        }
        self.send(ClientMessage::Prompt {
            text: text.to_string(),
            session_id,
            working_directory: working_directory.map(str::to_string),
            system_prompt: system_prompt.map(str::to_string),
        })
    }

    /// Start a remote command. Returns the client-minted command-session id
    /// under which output and completion will arrive.
    pub fn execute_command(
        &mut self,
        command: &str,
        working_directory: &str,
    ) -> Result<String, EngineError> {
        let command_session_id = Uuid::new_v4().as_hyphenated().to_string();
        let command_id = Uuid::new_v4().as_hyphenated().to_string();
        let exec = self.commands.begin(
            &command_session_id,
            &command_id,
            command,
            working_directory,
            Utc::now(),
        );
        self.bus.publish(EngineEvent::CommandUpdated(exec));
        self.send(ClientMessage::ExecuteCommand {
            command_session_id: command_session_id.clone(),
            command_id,
            command: command.to_string(),
            working_directory: working_directory.to_string(),
        })?;
        Ok(command_session_id)
    }

    pub fn refresh_sessions(&mut self, limit: Option<u32>) -> Result<(), EngineError> {
        self.send(ClientMessage::RefreshSessions {
            recent_sessions_limit: limit,
        })
    }

    pub fn compact_session(&mut self, raw_session_id: &str) -> Result<(), EngineError> {
        let session_id = self.canonical(raw_session_id)?;
        self.send(ClientMessage::CompactSession { session_id })
    }

    // -----------------------------------------------------------------------
    // Queue intents
    // -----------------------------------------------------------------------

    pub async fn fifo_enqueue(&mut self, raw_session_id: &str) -> Result<(), EngineError> {
        let session_id = self.canonical(raw_session_id)?;
        self.fifo.enqueue(&session_id, Utc::now());
        self.persist_queue_state(&session_id).await
    }

    pub async fn fifo_remove(&mut self, raw_session_id: &str) -> Result<(), EngineError> {
        let session_id = self.canonical(raw_session_id)?;
        self.fifo.remove(&session_id);
        self.persist_queue_state(&session_id).await
    }

    pub async fn priority_enqueue(
        &mut self,
        raw_session_id: &str,
        priority: i32,
    ) -> Result<(), EngineError> {
        let session_id = self.canonical(raw_session_id)?;
        self.priority.enqueue(&session_id, priority, Utc::now());
        self.persist_queue_state(&session_id).await
    }

    /// Move an entry to another level; it lands at the end of that level.
    pub async fn priority_set_level(
        &mut self,
        raw_session_id: &str,
        priority: i32,
    ) -> Result<(), EngineError> {
        let session_id = self.canonical(raw_session_id)?;
        self.priority.set_priority(&session_id, priority);
        self.persist_queue_state(&session_id).await
    }

    /// Drag-and-drop within the entry's current level.
    pub async fn priority_move(
        &mut self,
        raw_session_id: &str,
        index: usize,
    ) -> Result<(), EngineError> {
        let session_id = self.canonical(raw_session_id)?;
        self.priority.move_within_level(&session_id, index);
        self.persist_queue_state(&session_id).await
    }

    pub async fn priority_remove(&mut self, raw_session_id: &str) -> Result<(), EngineError> {
        let session_id = self.canonical(raw_session_id)?;
        self.priority.remove(&session_id);
        self.persist_queue_state(&session_id).await
    }

    /// Mirror both queues' view of a session into its stored record and
    /// announce the change. Membership and metadata always move together.
    async fn persist_queue_state(&self, session_id: &str) -> Result<(), EngineError> {
        let mut session = self
            .store
            .fetch_session(session_id)
            .await?
            .unwrap_or_else(|| Session::new(session_id));
        session.fifo = self.fifo.state_for(session_id);
        session.priority_queue = self.priority.state_for(session_id);
        self.store.upsert_session(session).await?;
        self.bus.publish(EngineEvent::QueueChanged {
            session_id: session_id.to_string(),
        });
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Inbound dispatch
    // -----------------------------------------------------------------------

    pub async fn handle_inbound(&mut self, inbound: Inbound) -> Result<(), EngineError> {
        match inbound {
            Inbound::Frame(frame) => self.handle_frame(frame).await,
            Inbound::Transport(TransportEvent::Online) => self.resubscribe_all(),
            Inbound::Transport(TransportEvent::Offline) => self.clear_all_locks().await,
        }
    }

    async fn handle_frame(&mut self, frame: ServerMessage) -> Result<(), EngineError> {
        match frame {
            ServerMessage::SessionHistory {
                session_id,
                messages,
                total_count,
                newest_message_id,
                is_complete,
                ..
            } => {
                self.on_session_history(
                    &session_id,
                    messages,
                    total_count,
                    newest_message_id,
                    is_complete,
                )
                .await
            }
            ServerMessage::Replay {
                message_id,
                message,
            } => self.on_replayable(&message_id, Some(message)).await,
            ServerMessage::Response {
                message_id,
                success,
                text,
                error,
                session_id,
                usage,
                cost,
            } => {
                if !success {
                    self.bus.publish(EngineEvent::ServerError {
                        message: error
                            .clone()
                            .unwrap_or_else(|| "request failed".to_string()),
                    });
                }
                let wire = session_id.map(|sid| WireMessage {
                    id: message_id.clone(),
                    session_id: Some(sid),
                    role: MessageRole::Assistant,
                    text: text.unwrap_or_default(),
                    timestamp: Some(Utc::now()),
                    usage,
                    cost,
                });
                self.on_replayable(&message_id, wire).await
            }
            ServerMessage::SessionLocked { session_id, .. } => {
                self.set_lock(&session_id, true).await
            }
            ServerMessage::TurnComplete { session_id } => self.set_lock(&session_id, false).await,
            ServerMessage::CommandOutput {
                command_session_id,
                stream,
                text,
            } => {
                if let Some(exec) =
                    self.commands.append_output(&command_session_id, stream, &text)
                {
                    self.bus.publish(EngineEvent::CommandUpdated(exec));
                }
                Ok(())
            }
            ServerMessage::CommandComplete {
                command_session_id,
                exit_code,
                duration_ms,
            } => {
                if let Some(exec) =
                    self.commands
                        .complete(&command_session_id, exit_code, duration_ms, Utc::now())
                {
                    self.bus.publish(EngineEvent::CommandUpdated(exec));
                }
                Ok(())
            }
            ServerMessage::RecentSessions { sessions } => self.on_session_list(sessions).await,
            ServerMessage::CompactionComplete { session_id } => {
                self.publish_compaction(&session_id, None);
                Ok(())
            }
            ServerMessage::CompactionError { session_id, error } => {
                self.publish_compaction(
                    &session_id,
                    Some(error.unwrap_or_else(|| "compaction failed".to_string())),
                );
                Ok(())
            }
            ServerMessage::Error { message } => {
                self.bus.publish(EngineEvent::ServerError {
                    message: message.unwrap_or_else(|| "server error".to_string()),
                });
                Ok(())
            }
            // Handshake frames are handled by the connection manager;
            // keepalive and generic acks carry no state. Unknown types are
            // no-ops by contract.
            ServerMessage::Hello { .. }
            | ServerMessage::Connected { .. }
            | ServerMessage::AuthError { .. }
            | ServerMessage::Ack
            | ServerMessage::Pong
            | ServerMessage::Unknown => {
                debug!("stateless frame ignored");
                Ok(())
            }
        }
    }

    async fn on_session_history(
        &mut self,
        raw_session_id: &str,
        messages: Vec<WireMessage>,
        total_count: u64,
        newest_message_id: Option<String>,
        is_complete: bool,
    ) -> Result<(), EngineError> {
        let Some(session_id) = normalize_session_id(raw_session_id) else {
            warn!(raw_session_id, "history for malformed session id dropped");
            return Ok(());
        };
        if !self.registry.contains(&session_id) {
            debug!(session_id, "history for untracked session dropped");
            return Ok(());
        }

        let mut session = self
            .store
            .fetch_session(&session_id)
            .await?
            .unwrap_or_else(|| Session::new(&session_id));
        session.message_count = total_count;
        self.store.upsert_session(session.clone()).await?;
        self.bus.publish(EngineEvent::SessionUpserted(session));

        let outcome = merge_history(
            self.store.as_ref(),
            &self.registry,
            &session_id,
            messages,
            newest_message_id,
            is_complete,
        )
        .await?;

        for message in &outcome.messages {
            self.bus
                .publish(EngineEvent::MessageUpserted(message.clone()));
        }
        self.bus.publish(EngineEvent::HistorySynced {
            session_id,
            applied: outcome.applied,
            total_count,
            truncated: outcome.truncated,
        });
        Ok(())
    }

    /// Shared replay/response path: apply on first delivery, ack exactly
    /// once, drop silently on redelivery. The ledger records the id only
    /// after the apply succeeds, so a failed store write stays retryable
    /// through the backend's redelivery.
    async fn on_replayable(
        &mut self,
        message_id: &str,
        message: Option<WireMessage>,
    ) -> Result<(), EngineError> {
        if self.acks.contains(message_id) {
            debug!(message_id, "redelivery deduplicated, not re-acked");
            return Ok(());
        }

        if let Some(wire) = message {
            match wire.session_id.as_deref().and_then(normalize_session_id) {
                Some(session_id) => {
                    let mut applied: Message = wire.into_message(&session_id);
                    applied.session_id = session_id;
                    applied.status = DeliveryStatus::Confirmed;
                    self.store.upsert_message(applied.clone()).await?;
                    self.bus.publish(EngineEvent::MessageUpserted(applied));
                }
                None => {
                    warn!(message_id, "replayed message without usable session id dropped");
                }
            }
        }

        self.acks.first_delivery(message_id);
        self.send(ClientMessage::MessageAck {
            message_id: message_id.to_string(),
        })
    }

    async fn set_lock(&mut self, raw_session_id: &str, locked: bool) -> Result<(), EngineError> {
        let Some(session_id) = normalize_session_id(raw_session_id) else {
            warn!(raw_session_id, "lock frame with malformed session id dropped");
            return Ok(());
        };
        let changed = if locked {
            self.locks.lock(&session_id)
        } else {
            self.locks.unlock(&session_id)
        };
        if !changed {
            return Ok(());
        }

        if let Some(mut session) = self.store.fetch_session(&session_id).await? {
            session.locked = locked;
            self.store.upsert_session(session).await?;
        }
        self.bus
            .publish(EngineEvent::LockChanged { session_id, locked });
        Ok(())
    }

    async fn on_session_list(&mut self, sessions: Vec<WireSession>) -> Result<(), EngineError> {
        for wire in sessions {
            let Some(session_id) = normalize_session_id(&wire.id) else {
                warn!(raw_id = %wire.id, "session with malformed id dropped from list");
                continue;
            };
            let mut session = self
                .store
                .fetch_session(&session_id)
                .await?
                .unwrap_or_else(|| Session::new(&session_id));

            // Server-owned fields are last-write-wins; lock and queue state
            // stay with their managers.
            session.name = wire.name.or(session.name);
            session.custom_name = wire.custom_name.or(session.custom_name);
            if let Some(dir) = wire.working_directory {
                session.working_directory = dir;
            }
            if let Some(count) = wire.message_count {
                session.message_count = count;
            }
            if let Some(count) = wire.unread_count {
                session.unread_count = count;
            }
            session.locked = self.locks.is_locked(&session_id);
            session.fifo = self.fifo.state_for(&session_id);
            session.priority_queue = self.priority.state_for(&session_id);

            self.store.upsert_session(session.clone()).await?;
            self.bus.publish(EngineEvent::SessionUpserted(session));
        }
        Ok(())
    }

    fn publish_compaction(&self, raw_session_id: &str, error: Option<String>) {
        let session_id =
            normalize_session_id(raw_session_id).unwrap_or_else(|| raw_session_id.to_string());
        self.bus
            .publish(EngineEvent::CompactionFinished { session_id, error });
    }

    /// After every successful (re)connect the registry's whole working set
    /// is resubscribed with current watermarks.
    fn resubscribe_all(&mut self) -> Result<(), EngineError> {
        for sub in self.registry.snapshot() {
            self.send(subscribe_frame(&self.registry, &sub.session_id))?;
        }
        debug!(count = self.registry.len(), "resubscribed tracked sessions");
        Ok(())
    }

    /// Fail open on disconnect: the connection that would have unlocked
    /// these sessions is gone.
    async fn clear_all_locks(&mut self) -> Result<(), EngineError> {
        for session_id in self.locks.clear_all() {
            if let Some(mut session) = self.store.fetch_session(&session_id).await? {
                session.locked = false;
                self.store.upsert_session(session).await?;
            }
            self.bus.publish(EngineEvent::LockChanged {
                session_id,
                locked: false,
            });
        }
        Ok(())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}
