//! Chat core for DevNextDoor.
//!
//! This crate sits between the display layer and a [`chat_store::ChatBackend`].
//! It provides:
//!
//! - [`canonical_id`] - order-independent conversation keys
//! - [`MessageStore`] - append, send and live retrieval of message logs
//! - [`DuplicateFilter`] / [`SendThrottle`] - duplicate suppression
//! - [`SummaryUpdater`] - the per-conversation "last message" projection
//! - [`ChatSession`] - the controller behind one open conversation view
//! - [`ConversationListProvider`] - a user's conversations, newest first
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use chat_core::{ChatSession, LoggingObserver};
//! use chat_store::MemoryBackend;
//!
//! # async fn example() -> chat_core::Result<()> {
//! let backend = Arc::new(MemoryBackend::new());
//! let session = ChatSession::new("alice", backend, Arc::new(LoggingObserver))?;
//!
//! session.open("bob").await?;
//! session.send("hello").await?;
//! session.close().await;
//! # Ok(())
//! # }
//! ```

mod clock;
mod config;
mod conversations;
mod dedup;
mod error;
mod identity;
mod observer;
mod session;
mod store;
mod subscription;
mod summary;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    ChatConfig, DEFAULT_DUPLICATE_MATCH_WINDOW, DEFAULT_DUPLICATE_QUERY_WINDOW,
    DEFAULT_SEND_THROTTLE,
};
pub use conversations::{for_user, ConversationListProvider};
pub use dedup::{DuplicateFilter, SendThrottle};
pub use error::{ChatError, ErrorKind, Result};
pub use identity::{canonical_id, SEPARATOR};
pub use observer::{LoggingObserver, NoOpObserver, SendReport, SessionObserver};
pub use session::{ChatSession, OpenConversation, SendPhase};
pub use store::{message_id, MessageStore, OutgoingMessage};
pub use subscription::SubscriptionHandle;
pub use summary::SummaryUpdater;

// Re-export store types for convenience
pub use chat_store::{ChatBackend, Conversation, Message, StoreChange, StoreError};
