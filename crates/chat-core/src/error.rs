//! Error types for chat operations.

use chat_store::StoreError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while sending or syncing chat messages.
#[derive(Debug, Error)]
pub enum ChatError {
    /// A near-identical message from the same sender was sent moments ago.
    #[error("duplicate message suppressed")]
    DuplicateMessage,

    /// No conversation is open, or its participants are unresolved.
    #[error("chat session not initialized: {0}")]
    NotInitialized(&'static str),

    /// The backing store failed a read or write.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The backing store could not allocate a unique message key.
    #[error("failed to allocate message id: {0}")]
    IdGenerationFailure(String),

    /// Content was empty or whitespace only.
    #[error("message content is empty")]
    EmptyContent,

    /// Another send from this session has not completed yet.
    #[error("a send is already in progress")]
    SendInProgress,

    /// A participant identifier was empty or names the current user.
    #[error("invalid participant: {0}")]
    InvalidParticipant(String),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Configuration(String),
}

/// Discriminant of a [`ChatError`], reported to the display layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    DuplicateMessage,
    NotInitialized,
    StoreError,
    IdGenerationFailure,
    EmptyContent,
    SendInProgress,
    InvalidParticipant,
    Configuration,
}

impl ErrorKind {
    /// Whether the end user should be told about this failure.
    ///
    /// Only duplicate suppression is silent.
    pub fn is_user_visible(self) -> bool {
        !matches!(self, ErrorKind::DuplicateMessage)
    }
}

impl ChatError {
    /// The kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ChatError::DuplicateMessage => ErrorKind::DuplicateMessage,
            ChatError::NotInitialized(_) => ErrorKind::NotInitialized,
            ChatError::Store(_) => ErrorKind::StoreError,
            ChatError::IdGenerationFailure(_) => ErrorKind::IdGenerationFailure,
            ChatError::EmptyContent => ErrorKind::EmptyContent,
            ChatError::SendInProgress => ErrorKind::SendInProgress,
            ChatError::InvalidParticipant(_) => ErrorKind::InvalidParticipant,
            ChatError::Configuration(_) => ErrorKind::Configuration,
        }
    }
}

/// Result type for chat operations.
pub type Result<T> = std::result::Result<T, ChatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_duplicates_are_silent() {
        assert!(!ChatError::DuplicateMessage.kind().is_user_visible());
        assert!(ChatError::NotInitialized("no conversation").kind().is_user_visible());
        assert!(ChatError::IdGenerationFailure("empty key".to_string())
            .kind()
            .is_user_visible());
        assert!(ChatError::Store(StoreError::Unavailable("offline".to_string()))
            .kind()
            .is_user_visible());
    }

    #[test]
    fn test_store_errors_keep_backend_message() {
        let error = ChatError::from(StoreError::Rejected {
            operation: "insert_message",
            reason: "permission denied".to_string(),
        });
        assert_eq!(error.kind(), ErrorKind::StoreError);
        assert!(error.to_string().contains("permission denied"));
    }
}
