//! Conversation and message persistence for DevNextDoor chat.
//!
//! This crate provides the data model shared by the chat core and the
//! [`ChatBackend`] seam it talks to, with two implementations:
//!
//! - [`MemoryBackend`] - an in-process realtime store
//! - [`SqliteBackend`] - SQLx with SQLite
//!
//! Every backend announces its writes on a broadcast change feed so that
//! callers can keep live views current.
//!
//! # Example
//!
//! ```no_run
//! use chat_store::{ChatBackend, Conversation, SqliteBackend};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Connect and run migrations
//!     let backend = SqliteBackend::open("sqlite:devnextdoor.db?mode=rwc").await?;
//!
//!     // Create a conversation
//!     let conversation = Conversation::new("alice_bob", "alice", "bob");
//!     backend.insert_conversation(&conversation).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod conversation;
pub mod error;
pub mod memory;
pub mod message;
pub mod models;
pub mod sqlite;

pub use backend::{ChangeFeed, ChatBackend, CHANGE_FEED_CAPACITY};
pub use error::{Result, StoreError};
pub use memory::MemoryBackend;
pub use models::{Conversation, Message, StoreChange, SummaryUpdate, TEXT_KIND};
pub use sqlite::SqliteBackend;

// Re-export async_trait for backend implementors
pub use async_trait::async_trait;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

/// Pooled SQLite connection holding the chat tables.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Enough connections for a handful of sessions sending and watching
    /// feeds in one process.
    const DEFAULT_POOL_SIZE: u32 = 8;

    /// In-memory URL. Every connection to it opens a separate database.
    const MEMORY_URL: &'static str = "sqlite::memory:";

    /// Open a chat database file, e.g. `sqlite:devnextdoor.db?mode=rwc`.
    ///
    /// For `sqlite::memory:` use [`Database::in_memory`] instead; a pooled
    /// in-memory URL would hand each connection its own empty schema.
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with_pool_size(url, Self::DEFAULT_POOL_SIZE).await
    }

    /// A private, migrated in-memory database on a single connection.
    pub async fn in_memory() -> Result<Self> {
        let db = Self::connect_with_pool_size(Self::MEMORY_URL, 1).await?;
        db.migrate().await?;
        Ok(db)
    }

    /// Open a chat database with `pool_size` connections.
    pub async fn connect_with_pool_size(url: &str, pool_size: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(pool_size)
            .acquire_timeout(std::time::Duration::from_secs(30))
            .connect_with(options)
            .await?;

        tracing::info!(url, pool_size, "Opened chat database");

        Ok(Self { pool })
    }

    /// Create or upgrade the `conversations` and `messages` tables.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        tracing::debug!("Chat schema up to date");
        Ok(())
    }

    /// The pool the query functions in [`conversation`] and [`message`] take.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Wait for in-flight queries and release every connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
