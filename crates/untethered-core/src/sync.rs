//! Delta sync: request only the history the client is missing, merge what
//! comes back idempotently, and track the per-session watermark.
//!
//! The backend may answer a delta request with the full history instead
//! (for example when the watermark message was purged). The merge is keyed
//! by message id, so a full resync flows through the same path without
//! duplicating anything the client already holds.

use tracing::debug;

use untethered_types::Message;
use untethered_wire::{ClientMessage, WireMessage};

use crate::error::StoreError;
use crate::store::SessionStore;
use crate::subscriptions::SubscriptionRegistry;

/// Build the subscribe frame for a session: the watermark is included when
/// the client holds prior history and omitted to request the full history.
pub fn subscribe_frame(registry: &SubscriptionRegistry, session_id: &str) -> ClientMessage {
    ClientMessage::Subscribe {
        session_id: session_id.to_string(),
        last_message_id: registry.watermark(session_id),
    }
}

/// Outcome of merging one `session_history` batch.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    /// Messages written through the store (including unchanged re-upserts).
    pub applied: usize,
    /// The messages as applied, in backend order, for event publication.
    pub messages: Vec<Message>,
    pub truncated: bool,
}

/// Merge a history batch for `session_id`. Each returned message is
/// upserted by id, so receiving the same message twice never duplicates it,
/// and the watermark advances to `newest_message_id` when present.
pub async fn merge_history(
    store: &dyn SessionStore,
    registry: &SubscriptionRegistry,
    session_id: &str,
    batch: Vec<WireMessage>,
    newest_message_id: Option<String>,
    is_complete: bool,
) -> Result<MergeOutcome, StoreError> {
    let mut messages = Vec::with_capacity(batch.len());
    for wire in batch {
        let message = wire.into_message(session_id);
        store.upsert_message(message.clone()).await?;
        messages.push(message);
    }

    if let Some(newest) = newest_message_id {
        registry.advance(session_id, newest);
    }
    registry.set_truncated(session_id, !is_complete);

    debug!(
        session_id,
        applied = messages.len(),
        truncated = !is_complete,
        "history batch merged"
    );

    Ok(MergeOutcome {
        applied: messages.len(),
        messages,
        truncated: !is_complete,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use untethered_types::MessageRole;

    fn wire(id: &str, text: &str) -> WireMessage {
        WireMessage {
            id: id.into(),
            session_id: None,
            role: MessageRole::Assistant,
            text: text.into(),
            timestamp: None,
            usage: None,
            cost: None,
        }
    }

    #[tokio::test]
    async fn merge_appends_and_advances_watermark() {
        let store = MemoryStore::new();
        let registry = SubscriptionRegistry::new();
        registry.track("s1");

        let outcome = merge_history(
            &store,
            &registry,
            "s1",
            vec![wire("m1", "a"), wire("m2", "b"), wire("m3", "c")],
            Some("m3".into()),
            true,
        )
        .await
        .unwrap();

        assert_eq!(outcome.applied, 3);
        assert!(!outcome.truncated);
        assert_eq!(registry.watermark("s1").as_deref(), Some("m3"));
        assert_eq!(store.fetch_messages("s1").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn merge_is_idempotent_by_message_id() {
        let store = MemoryStore::new();
        let registry = SubscriptionRegistry::new();
        registry.track("s1");

        let batch = vec![wire("m1", "a"), wire("m2", "b")];
        merge_history(&store, &registry, "s1", batch.clone(), Some("m2".into()), true)
            .await
            .unwrap();
        merge_history(&store, &registry, "s1", batch, Some("m2".into()), true)
            .await
            .unwrap();

        assert_eq!(store.fetch_messages("s1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn full_history_after_purged_watermark_does_not_duplicate() {
        // The client holds m1..m2 and asks for a delta past m2; the backend
        // no longer recognizes m2 and replies with the full history.
        let store = MemoryStore::new();
        let registry = SubscriptionRegistry::new();
        registry.track("s1");

        merge_history(
            &store,
            &registry,
            "s1",
            vec![wire("m1", "a"), wire("m2", "b")],
            Some("m2".into()),
            true,
        )
        .await
        .unwrap();

        merge_history(
            &store,
            &registry,
            "s1",
            vec![wire("m1", "a"), wire("m2", "b"), wire("m3", "c")],
            Some("m3".into()),
            true,
        )
        .await
        .unwrap();

        let messages = store.fetch_messages("s1").await.unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(registry.watermark("s1").as_deref(), Some("m3"));
    }

    #[tokio::test]
    async fn truncated_batch_flags_but_keeps_watermark_advance() {
        let store = MemoryStore::new();
        let registry = SubscriptionRegistry::new();
        registry.track("s1");

        let outcome = merge_history(
            &store,
            &registry,
            "s1",
            vec![wire("m1", "a")],
            Some("m1".into()),
            false,
        )
        .await
        .unwrap();

        assert!(outcome.truncated);
        assert!(registry.snapshot()[0].truncated);
        assert_eq!(registry.watermark("s1").as_deref(), Some("m1"));
    }

    #[tokio::test]
    async fn missing_newest_id_leaves_watermark_alone() {
        let store = MemoryStore::new();
        let registry = SubscriptionRegistry::new();
        registry.track("s1");
        registry.advance("s1", "m5".into());

        merge_history(&store, &registry, "s1", vec![], None, true)
            .await
            .unwrap();

        assert_eq!(registry.watermark("s1").as_deref(), Some("m5"));
    }

    #[test]
    fn subscribe_frame_omits_watermark_without_history() {
        let registry = SubscriptionRegistry::new();
        registry.track("s1");
        assert_eq!(
            subscribe_frame(&registry, "s1"),
            ClientMessage::Subscribe {
                session_id: "s1".into(),
                last_message_id: None,
            }
        );

        registry.advance("s1", "m10".into());
        assert_eq!(
            subscribe_frame(&registry, "s1"),
            ClientMessage::Subscribe {
                session_id: "s1".into(),
                last_message_id: Some("m10".into()),
            }
        );
    }
}
