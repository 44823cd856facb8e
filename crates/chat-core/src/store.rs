//! Message store adapter: append, send, and live retrieval of a
//! conversation's message log.

use std::sync::Arc;

use chat_store::{ChatBackend, Message, StoreChange, StoreError, TEXT_KIND};
use tracing::{debug, error};

use crate::config::ChatConfig;
use crate::dedup::DuplicateFilter;
use crate::error::{ChatError, Result};
use crate::subscription::{spawn_live, SubscriptionHandle};

/// A message about to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub conversation_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    pub kind: String,
}

impl OutgoingMessage {
    /// A plain text message.
    pub fn text(
        conversation_id: impl Into<String>,
        sender_id: impl Into<String>,
        receiver_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            sender_id: sender_id.into(),
            receiver_id: receiver_id.into(),
            content: content.into(),
            kind: TEXT_KIND.to_string(),
        }
    }
}

/// Build a message id from a push key and the send timestamp.
///
/// The timestamp suffix keeps ids unique even if the backend ever hands out
/// the same push key twice.
pub fn message_id(push_key: &str, sent_at: i64) -> String {
    format!("{}-{}", push_key, sent_at)
}

/// Appends to and watches per-conversation message logs.
pub struct MessageStore<B: ChatBackend> {
    backend: Arc<B>,
    filter: DuplicateFilter,
}

impl<B: ChatBackend> MessageStore<B> {
    /// Create an adapter over `backend`.
    pub fn new(backend: Arc<B>, config: &ChatConfig) -> Self {
        Self {
            backend,
            filter: DuplicateFilter::new(config),
        }
    }

    /// The backend this adapter writes to.
    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Write `message` under `conversation_id`'s log.
    pub async fn append(&self, conversation_id: &str, message: &Message) -> chat_store::Result<()> {
        if message.conversation_id != conversation_id {
            return Err(StoreError::Rejected {
                operation: "append",
                reason: format!(
                    "message {} belongs to {}, not {}",
                    message.id, message.conversation_id, conversation_id
                ),
            });
        }

        self.backend.insert_message(message).await.map_err(|e| {
            error!(conversation_id, message_id = %message.id, "Append failed: {}", e);
            e
        })
    }

    /// Send a message stamped with `now`: duplicate check, id allocation,
    /// then append.
    pub async fn send(&self, outgoing: &OutgoingMessage, now: i64) -> Result<Message> {
        self.filter
            .check(
                self.backend.as_ref(),
                &outgoing.conversation_id,
                &outgoing.sender_id,
                &outgoing.content,
                now,
            )
            .await?;

        let push_key = self
            .backend
            .allocate_key(&outgoing.conversation_id)
            .await
            .map_err(|e| ChatError::IdGenerationFailure(e.to_string()))?;
        if push_key.trim().is_empty() {
            return Err(ChatError::IdGenerationFailure(
                "backend returned an empty push key".to_string(),
            ));
        }

        let message = Message {
            id: message_id(&push_key, now),
            conversation_id: outgoing.conversation_id.clone(),
            sender_id: outgoing.sender_id.clone(),
            receiver_id: outgoing.receiver_id.clone(),
            content: outgoing.content.clone(),
            sent_at: now,
            read: false,
            kind: outgoing.kind.clone(),
        };

        self.append(&outgoing.conversation_id, &message).await?;
        debug!(
            conversation_id = %message.conversation_id,
            message_id = %message.id,
            "Message appended"
        );
        Ok(message)
    }

    /// Deliver the full, `sent_at`-ordered log now and after every change.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn subscribe<F>(&self, conversation_id: &str, on_update: F) -> SubscriptionHandle
    where
        F: Fn(Vec<Message>) + Send + Sync + 'static,
    {
        let changes = self.backend.changes();
        let backend = Arc::clone(&self.backend);
        let watched = conversation_id.to_string();
        let loaded = conversation_id.to_string();

        spawn_live(
            format!("messages:{}", conversation_id),
            changes,
            move |change| {
                matches!(change, StoreChange::Messages { conversation_id } if *conversation_id == watched)
            },
            move || {
                let backend = Arc::clone(&backend);
                let conversation_id = loaded.clone();
                async move {
                    let mut messages = backend.messages(&conversation_id).await?;
                    // Stable, so backend tie order survives.
                    messages.sort_by_key(|m| m.sent_at);
                    Ok::<_, StoreError>(messages)
                }
            },
            on_update,
        )
    }

    /// Release a live listener. Idempotent.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) {
        handle.unsubscribe();
    }
}
