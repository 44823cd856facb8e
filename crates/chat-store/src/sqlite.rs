//! SQLite-backed [`ChatBackend`].

use async_trait::async_trait;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::backend::{ChangeFeed, ChatBackend};
use crate::models::{Conversation, Message, StoreChange, SummaryUpdate};
use crate::{conversation, message, Database, Result};

/// A [`ChatBackend`] persisting to SQLite.
///
/// The change feed only covers writes made through this value (and its
/// clones); writers in other processes are not observed.
#[derive(Debug, Clone)]
pub struct SqliteBackend {
    db: Database,
    feed: ChangeFeed,
}

impl SqliteBackend {
    /// Wrap an already migrated database.
    pub fn new(db: Database) -> Self {
        Self {
            db,
            feed: ChangeFeed::default(),
        }
    }

    /// Connect, run migrations, and wrap the result.
    pub async fn open(url: &str) -> Result<Self> {
        let db = Database::connect(url).await?;
        db.migrate().await?;
        Ok(Self::new(db))
    }

    /// The underlying database.
    pub fn database(&self) -> &Database {
        &self.db
    }
}

#[async_trait]
impl ChatBackend for SqliteBackend {
    async fn allocate_key(&self, _conversation_id: &str) -> Result<String> {
        Ok(Uuid::new_v4().simple().to_string())
    }

    async fn insert_message(&self, msg: &Message) -> Result<()> {
        message::insert_message(self.db.pool(), msg).await?;
        self.feed.messages_changed(&msg.conversation_id);
        Ok(())
    }

    async fn messages(&self, conversation_id: &str) -> Result<Vec<Message>> {
        message::list_messages(self.db.pool(), conversation_id).await
    }

    async fn messages_since(
        &self,
        conversation_id: &str,
        since_millis: i64,
    ) -> Result<Vec<Message>> {
        message::list_messages_since(self.db.pool(), conversation_id, since_millis).await
    }

    async fn mark_read(&self, conversation_id: &str, reader: &str) -> Result<u64> {
        let changed = message::mark_read(self.db.pool(), conversation_id, reader).await?;
        if changed > 0 {
            self.feed.messages_changed(conversation_id);
        }
        Ok(changed)
    }

    async fn conversation(&self, id: &str) -> Result<Option<Conversation>> {
        conversation::get_conversation(self.db.pool(), id).await
    }

    async fn insert_conversation(&self, record: &Conversation) -> Result<()> {
        conversation::insert_conversation(self.db.pool(), record).await?;
        self.feed.conversation_changed(&record.id);
        Ok(())
    }

    async fn update_summary(&self, update: &SummaryUpdate) -> Result<()> {
        conversation::upsert_summary(self.db.pool(), update).await?;
        self.feed.conversation_changed(&update.conversation_id);
        Ok(())
    }

    async fn conversations(&self) -> Result<Vec<Conversation>> {
        conversation::list_conversations(self.db.pool()).await
    }

    fn changes(&self) -> broadcast::Receiver<StoreChange> {
        self.feed.subscribe()
    }
}
