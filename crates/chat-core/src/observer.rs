//! Callbacks from a chat session to the display layer.

use chat_store::Message;
use serde::{Deserialize, Serialize};

use crate::error::{ChatError, ErrorKind};

/// Outcome of one send attempt, as reported to the display layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendReport {
    /// Whether a message was persisted.
    pub success: bool,
    /// Why not, if it was not.
    pub error: Option<ErrorKind>,
    /// Id of the persisted message.
    pub message_id: Option<String>,
}

impl SendReport {
    /// Report for a finished send.
    pub fn from_result(result: &Result<Message, ChatError>) -> Self {
        match result {
            Ok(message) => Self {
                success: true,
                error: None,
                message_id: Some(message.id.clone()),
            },
            Err(e) => Self {
                success: false,
                error: Some(e.kind()),
                message_id: None,
            },
        }
    }

    /// Whether the failure should be shown to the user.
    pub fn should_surface(&self) -> bool {
        self.error.is_some_and(ErrorKind::is_user_visible)
    }

    /// Whether the input box should be cleared, as after a normal send.
    pub fn clears_input(&self) -> bool {
        self.success || self.error == Some(ErrorKind::DuplicateMessage)
    }
}

/// Receives live updates from a [`crate::ChatSession`].
///
/// Callbacks run on the runtime's worker threads and should return quickly.
pub trait SessionObserver: Send + Sync + 'static {
    /// The full, ordered message feed of the open conversation changed.
    fn on_messages_updated(&self, messages: &[Message]);

    /// A send attempt finished.
    fn on_send_result(&self, report: &SendReport);
}

/// An observer that discards every callback.
#[derive(Debug, Clone, Default)]
pub struct NoOpObserver;

impl SessionObserver for NoOpObserver {
    fn on_messages_updated(&self, _messages: &[Message]) {}

    fn on_send_result(&self, _report: &SendReport) {}
}

/// An observer that logs every callback.
#[derive(Debug, Clone, Default)]
pub struct LoggingObserver;

impl SessionObserver for LoggingObserver {
    fn on_messages_updated(&self, messages: &[Message]) {
        tracing::info!("Feed updated: {} messages", messages.len());
    }

    fn on_send_result(&self, report: &SendReport) {
        match report.error {
            None => tracing::info!("Sent {:?}", report.message_id),
            Some(kind) if !kind.is_user_visible() => {
                tracing::debug!("Send suppressed: {:?}", kind)
            }
            Some(kind) => tracing::warn!("Send failed: {:?}", kind),
        }
    }
}
