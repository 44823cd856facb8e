//! Conversation persistence.

use sqlx::SqlitePool;

use crate::error::{Result, StoreError};
use crate::models::{Conversation, SummaryUpdate};

/// Create a conversation, failing if the id is already taken.
pub async fn insert_conversation(pool: &SqlitePool, conversation: &Conversation) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO conversations (
            id, participant_a, participant_b,
            last_message_text, last_message_at, last_message_sender
        )
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&conversation.id)
    .bind(&conversation.participant_a)
    .bind(&conversation.participant_b)
    .bind(&conversation.last_message_text)
    .bind(conversation.last_message_at)
    .bind(&conversation.last_message_sender)
    .execute(pool)
    .await
    .map_err(|e| {
        if let sqlx::Error::Database(ref db_err) = e {
            if db_err.is_unique_violation() {
                return StoreError::AlreadyExists {
                    entity: "Conversation",
                    id: conversation.id.clone(),
                };
            }
        }
        StoreError::Sqlx(e)
    })?;

    Ok(())
}

/// Get a conversation by id.
pub async fn get_conversation(pool: &SqlitePool, id: &str) -> Result<Option<Conversation>> {
    let record = sqlx::query_as::<_, Conversation>(
        r#"
        SELECT id, participant_a, participant_b,
               last_message_text, last_message_at, last_message_sender
        FROM conversations
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(record)
}

/// Write the last-message projection, creating the conversation if missing.
///
/// Existing participants are never rewritten.
pub async fn upsert_summary(pool: &SqlitePool, update: &SummaryUpdate) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO conversations (
            id, participant_a, participant_b,
            last_message_text, last_message_at, last_message_sender
        )
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            last_message_text = excluded.last_message_text,
            last_message_at = excluded.last_message_at,
            last_message_sender = excluded.last_message_sender
        "#,
    )
    .bind(&update.conversation_id)
    .bind(&update.participant_a)
    .bind(&update.participant_b)
    .bind(&update.text)
    .bind(update.at)
    .bind(&update.sender)
    .execute(pool)
    .await?;

    Ok(())
}

/// List every conversation.
pub async fn list_conversations(pool: &SqlitePool) -> Result<Vec<Conversation>> {
    let conversations = sqlx::query_as::<_, Conversation>(
        r#"
        SELECT id, participant_a, participant_b,
               last_message_text, last_message_at, last_message_sender
        FROM conversations
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(conversations)
}

/// Count total conversations.
pub async fn count_conversations(pool: &SqlitePool) -> Result<i64> {
    let count = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*) FROM conversations
        "#,
    )
    .fetch_one(pool)
    .await?;

    Ok(count)
}
