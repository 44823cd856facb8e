//! Conversation summary updater.

use std::sync::Arc;

use chat_store::{ChatBackend, Message, SummaryUpdate};
use tracing::warn;

use crate::error::Result;

/// Keeps each conversation's `last_message_*` projection current.
pub struct SummaryUpdater<B: ChatBackend> {
    backend: Arc<B>,
}

impl<B: ChatBackend> SummaryUpdater<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }

    /// Project a freshly appended message onto its conversation.
    ///
    /// A failure here leaves the message persisted but the summary stale.
    pub async fn apply(&self, message: &Message) -> Result<()> {
        let update = SummaryUpdate::from_message(message);
        self.backend.update_summary(&update).await.map_err(|e| {
            warn!(
                conversation_id = %message.conversation_id,
                message_id = %message.id,
                "Summary update failed after append: {}",
                e
            );
            e.into()
        })
    }
}
