//! In-process realtime store.
//!
//! Mirrors the behavior of a hosted realtime database: push keys are
//! generated per write, reads are ordered server-side, and every write fans
//! out to live listeners through the change feed.

use async_trait::async_trait;
use indexmap::IndexMap;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use crate::backend::{ChangeFeed, ChatBackend};
use crate::error::StoreError;
use crate::models::{sort_by_sent_at, Conversation, Message, StoreChange, SummaryUpdate};
use crate::Result;

#[derive(Debug, Default)]
struct MemoryState {
    conversations: IndexMap<String, Conversation>,
    /// Conversation id to its message log, keyed by message id.
    messages: IndexMap<String, IndexMap<String, Message>>,
}

/// A [`ChatBackend`] held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: RwLock<MemoryState>,
    feed: ChangeFeed,
}

impl MemoryBackend {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of messages across all conversations.
    pub async fn message_count(&self) -> usize {
        let state = self.state.read().await;
        state.messages.values().map(IndexMap::len).sum()
    }
}

#[async_trait]
impl ChatBackend for MemoryBackend {
    async fn allocate_key(&self, _conversation_id: &str) -> Result<String> {
        Ok(Uuid::new_v4().simple().to_string())
    }

    async fn insert_message(&self, message: &Message) -> Result<()> {
        {
            let mut state = self.state.write().await;
            let log = state
                .messages
                .entry(message.conversation_id.clone())
                .or_default();
            if log.contains_key(&message.id) {
                return Err(StoreError::AlreadyExists {
                    entity: "Message",
                    id: message.id.clone(),
                });
            }
            log.insert(message.id.clone(), message.clone());
        }

        self.feed.messages_changed(&message.conversation_id);
        Ok(())
    }

    async fn messages(&self, conversation_id: &str) -> Result<Vec<Message>> {
        self.messages_since(conversation_id, i64::MIN).await
    }

    async fn messages_since(
        &self,
        conversation_id: &str,
        since_millis: i64,
    ) -> Result<Vec<Message>> {
        let state = self.state.read().await;
        let mut messages: Vec<Message> = state
            .messages
            .get(conversation_id)
            .map(|log| {
                log.values()
                    .filter(|m| m.sent_at >= since_millis)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        sort_by_sent_at(&mut messages);
        Ok(messages)
    }

    async fn mark_read(&self, conversation_id: &str, reader: &str) -> Result<u64> {
        let changed = {
            let mut state = self.state.write().await;
            let mut changed = 0;
            if let Some(log) = state.messages.get_mut(conversation_id) {
                for message in log.values_mut() {
                    if message.receiver_id == reader && !message.read {
                        message.read = true;
                        changed += 1;
                    }
                }
            }
            changed
        };

        if changed > 0 {
            self.feed.messages_changed(conversation_id);
        }
        Ok(changed)
    }

    async fn conversation(&self, id: &str) -> Result<Option<Conversation>> {
        let state = self.state.read().await;
        Ok(state.conversations.get(id).cloned())
    }

    async fn insert_conversation(&self, conversation: &Conversation) -> Result<()> {
        {
            let mut state = self.state.write().await;
            if state.conversations.contains_key(&conversation.id) {
                return Err(StoreError::AlreadyExists {
                    entity: "Conversation",
                    id: conversation.id.clone(),
                });
            }
            state
                .conversations
                .insert(conversation.id.clone(), conversation.clone());
        }

        self.feed.conversation_changed(&conversation.id);
        Ok(())
    }

    async fn update_summary(&self, update: &SummaryUpdate) -> Result<()> {
        {
            let mut state = self.state.write().await;
            match state.conversations.get_mut(&update.conversation_id) {
                Some(conversation) => {
                    conversation.last_message_text = update.text.clone();
                    conversation.last_message_at = update.at;
                    conversation.last_message_sender = update.sender.clone();
                }
                None => {
                    state
                        .conversations
                        .insert(update.conversation_id.clone(), update.to_conversation());
                }
            }
        }

        self.feed.conversation_changed(&update.conversation_id);
        Ok(())
    }

    async fn conversations(&self) -> Result<Vec<Conversation>> {
        let state = self.state.read().await;
        Ok(state.conversations.values().cloned().collect())
    }

    fn changes(&self) -> broadcast::Receiver<StoreChange> {
        self.feed.subscribe()
    }
}
