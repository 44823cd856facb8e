//! Message log persistence.

use sqlx::SqlitePool;

use crate::error::{Result, StoreError};
use crate::models::Message;

/// Append a message to its conversation's log.
pub async fn insert_message(pool: &SqlitePool, message: &Message) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO messages (
            conversation_id, id, sender_id, receiver_id, content, sent_at, read, kind
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&message.conversation_id)
    .bind(&message.id)
    .bind(&message.sender_id)
    .bind(&message.receiver_id)
    .bind(&message.content)
    .bind(message.sent_at)
    .bind(message.read)
    .bind(&message.kind)
    .execute(pool)
    .await
    .map_err(|e| {
        if let sqlx::Error::Database(ref db_err) = e {
            if db_err.is_unique_violation() {
                return StoreError::AlreadyExists {
                    entity: "Message",
                    id: message.id.clone(),
                };
            }
        }
        StoreError::Sqlx(e)
    })?;

    Ok(())
}

/// List a conversation's messages sent at or after `since_millis`, oldest first.
pub async fn list_messages_since(
    pool: &SqlitePool,
    conversation_id: &str,
    since_millis: i64,
) -> Result<Vec<Message>> {
    let messages = sqlx::query_as::<_, Message>(
        r#"
        SELECT id, conversation_id, sender_id, receiver_id, content, sent_at, read, kind
        FROM messages
        WHERE conversation_id = ? AND sent_at >= ?
        ORDER BY sent_at ASC, id ASC
        "#,
    )
    .bind(conversation_id)
    .bind(since_millis)
    .fetch_all(pool)
    .await?;

    Ok(messages)
}

/// List all of a conversation's messages, oldest first.
pub async fn list_messages(pool: &SqlitePool, conversation_id: &str) -> Result<Vec<Message>> {
    list_messages_since(pool, conversation_id, i64::MIN).await
}

/// Mark unread messages addressed to `reader` as read.
pub async fn mark_read(pool: &SqlitePool, conversation_id: &str, reader: &str) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE messages
        SET read = 1
        WHERE conversation_id = ? AND receiver_id = ? AND read = 0
        "#,
    )
    .bind(conversation_id)
    .bind(reader)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Count messages in a conversation.
pub async fn count_messages(pool: &SqlitePool, conversation_id: &str) -> Result<i64> {
    let count = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*) FROM messages WHERE conversation_id = ?
        "#,
    )
    .bind(conversation_id)
    .fetch_one(pool)
    .await?;

    Ok(count)
}
