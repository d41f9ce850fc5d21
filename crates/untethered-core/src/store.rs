//! Persistence collaborator contract.
//!
//! The engine never assumes a storage backend. Platform shells provide an
//! implementation (CoreData, Room, a local KV store); the engine only needs
//! upsert/fetch/delete with at-least-once, last-write-wins semantics.
//! Session and message records are mutated exclusively through these
//! methods, never by direct field writes from UI code.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use untethered_types::{Message, Session};

use crate::error::StoreError;

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn upsert_session(&self, session: Session) -> Result<(), StoreError>;
    async fn upsert_message(&self, message: Message) -> Result<(), StoreError>;
    async fn fetch_session(&self, id: &str) -> Result<Option<Session>, StoreError>;
    /// Messages in arrival/history order.
    async fn fetch_messages(&self, session_id: &str) -> Result<Vec<Message>, StoreError>;
    async fn delete_session(&self, id: &str) -> Result<(), StoreError>;
}

/// In-memory store: the default for tests and for shells that persist
/// elsewhere. Messages keep arrival order; upserting an existing message id
/// replaces it in place.
#[derive(Default)]
pub struct MemoryStore {
    sessions: RwLock<HashMap<String, Session>>,
    messages: RwLock<HashMap<String, Vec<Message>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn upsert_session(&self, session: Session) -> Result<(), StoreError> {
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session);
        Ok(())
    }

    async fn upsert_message(&self, message: Message) -> Result<(), StoreError> {
        let mut map = self.messages.write().await;
        let list = map.entry(message.session_id.clone()).or_default();
        match list.iter_mut().find(|m| m.id == message.id) {
            Some(existing) => *existing = message,
            None => list.push(message),
        }
        Ok(())
    }

    async fn fetch_session(&self, id: &str) -> Result<Option<Session>, StoreError> {
        Ok(self.sessions.read().await.get(id).cloned())
    }

    async fn fetch_messages(&self, session_id: &str) -> Result<Vec<Message>, StoreError> {
        Ok(self
            .messages
            .read()
            .await
            .get(session_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn delete_session(&self, id: &str) -> Result<(), StoreError> {
        self.sessions.write().await.remove(id);
        self.messages.write().await.remove(id);
        Ok(())
    }
}
