//! The backing-store seam shared by every chat store implementation.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::models::{Conversation, Message, StoreChange, SummaryUpdate};
use crate::Result;

/// Capacity of the change feed before slow subscribers start lagging.
pub const CHANGE_FEED_CAPACITY: usize = 256;

/// A shared, multi-writer store for conversations and their message logs.
///
/// All writes are last-writer-wins; the only conditional operation is
/// [`ChatBackend::insert_conversation`]. Every successful write is announced
/// on the feed returned by [`ChatBackend::changes`].
#[async_trait]
pub trait ChatBackend: Send + Sync + 'static {
    /// Allocate a push key for a new message in `conversation_id`.
    async fn allocate_key(&self, conversation_id: &str) -> Result<String>;

    /// Append a message to its conversation's log.
    ///
    /// Fails with [`crate::StoreError::AlreadyExists`] if the id is taken.
    async fn insert_message(&self, message: &Message) -> Result<()>;

    /// All messages of a conversation, ascending by `sent_at`.
    async fn messages(&self, conversation_id: &str) -> Result<Vec<Message>>;

    /// Messages with `sent_at >= since_millis`, ascending by `sent_at`.
    async fn messages_since(&self, conversation_id: &str, since_millis: i64)
        -> Result<Vec<Message>>;

    /// Mark every unread message addressed to `reader` as read.
    ///
    /// Returns the number of messages that changed.
    async fn mark_read(&self, conversation_id: &str, reader: &str) -> Result<u64>;

    /// Look up a conversation by id.
    async fn conversation(&self, id: &str) -> Result<Option<Conversation>>;

    /// Create a conversation record.
    ///
    /// Fails with [`crate::StoreError::AlreadyExists`] when the id is present,
    /// leaving the earlier record untouched.
    async fn insert_conversation(&self, conversation: &Conversation) -> Result<()>;

    /// Overwrite the `last_message_*` fields, creating the record if missing.
    async fn update_summary(&self, update: &SummaryUpdate) -> Result<()>;

    /// Every conversation in the store, in no particular order.
    async fn conversations(&self) -> Result<Vec<Conversation>>;

    /// Subscribe to the change feed.
    fn changes(&self) -> broadcast::Receiver<StoreChange>;
}

/// Sender half of a change feed, shared by the concrete backends.
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<StoreChange>,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(CHANGE_FEED_CAPACITY)
    }
}

impl ChangeFeed {
    /// Create a feed buffering up to `capacity` undelivered changes.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Announce a change. Having no subscribers is not an error.
    pub fn publish(&self, change: StoreChange) {
        tracing::trace!(conversation_id = change.conversation_id(), "Publishing store change");
        let _ = self.sender.send(change);
    }

    /// Announce that a conversation's message log changed.
    pub fn messages_changed(&self, conversation_id: &str) {
        self.publish(StoreChange::Messages {
            conversation_id: conversation_id.to_string(),
        });
    }

    /// Announce that a conversation record changed.
    pub fn conversation_changed(&self, conversation_id: &str) {
        self.publish(StoreChange::Conversation {
            conversation_id: conversation_id.to_string(),
        });
    }

    /// A new receiver that sees changes published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.sender.subscribe()
    }
}
