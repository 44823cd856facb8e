//! Conversation list provider.

use std::sync::Arc;

use chat_store::{ChatBackend, Conversation, StoreChange, StoreError};

use crate::error::Result;
use crate::subscription::{spawn_live, SubscriptionHandle};

/// Lists the conversations a user takes part in, most recent first.
///
/// There is no per-user index: every load scans the whole collection and
/// filters by participant.
pub struct ConversationListProvider<B: ChatBackend> {
    backend: Arc<B>,
}

impl<B: ChatBackend> ConversationListProvider<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }

    /// One-shot listing for `username`.
    pub async fn list_for_user(&self, username: &str) -> Result<Vec<Conversation>> {
        let all = self.backend.conversations().await?;
        Ok(for_user(all, username))
    }

    /// Deliver the listing now and after every conversation change.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn watch_for_user<F>(&self, username: &str, on_update: F) -> SubscriptionHandle
    where
        F: Fn(Vec<Conversation>) + Send + Sync + 'static,
    {
        let changes = self.backend.changes();
        let backend = Arc::clone(&self.backend);
        let username = username.to_string();

        spawn_live(
            format!("conversations:{}", username),
            changes,
            |change| matches!(change, StoreChange::Conversation { .. }),
            move || {
                let backend = Arc::clone(&backend);
                let username = username.clone();
                async move {
                    let all = backend.conversations().await?;
                    Ok::<_, StoreError>(for_user(all, &username))
                }
            },
            on_update,
        )
    }
}

/// Keep the conversations involving `username`, newest `last_message_at` first.
pub fn for_user(conversations: Vec<Conversation>, username: &str) -> Vec<Conversation> {
    let mut mine: Vec<Conversation> = conversations
        .into_iter()
        .filter(|c| c.involves(username))
        .collect();
    mine.sort_by(|a, b| {
        b.last_message_at
            .cmp(&a.last_message_at)
            .then_with(|| a.id.cmp(&b.id))
    });
    mine
}
