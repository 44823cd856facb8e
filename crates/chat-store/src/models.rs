//! Conversation and message records.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Default discriminator for plain text messages.
pub const TEXT_KIND: &str = "text";

/// A two-party conversation, keyed by its canonical participant pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Conversation {
    /// Canonical conversation id.
    pub id: String,
    /// First participant, in the order originally stored.
    pub participant_a: String,
    /// Second participant, in the order originally stored.
    pub participant_b: String,
    /// Text of the most recent message (empty until the first send).
    pub last_message_text: String,
    /// Epoch milliseconds of the most recent message (0 until the first send).
    pub last_message_at: i64,
    /// Sender of the most recent message (empty until the first send).
    pub last_message_sender: String,
}

impl Conversation {
    /// A fresh conversation with empty `last_message_*` fields.
    pub fn new(
        id: impl Into<String>,
        participant_a: impl Into<String>,
        participant_b: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            participant_a: participant_a.into(),
            participant_b: participant_b.into(),
            last_message_text: String::new(),
            last_message_at: 0,
            last_message_sender: String::new(),
        }
    }

    /// Whether `user` is one of the two participants.
    pub fn involves(&self, user: &str) -> bool {
        self.participant_a == user || self.participant_b == user
    }

    /// The participant that is not `me`, if `me` takes part at all.
    pub fn other_participant(&self, me: &str) -> Option<&str> {
        if self.participant_a == me {
            Some(&self.participant_b)
        } else if self.participant_b == me {
            Some(&self.participant_a)
        } else {
            None
        }
    }

    /// Whether a message has ever been recorded in the summary.
    pub fn has_messages(&self) -> bool {
        !self.last_message_sender.is_empty()
    }
}

/// One chat message. Immutable once written, except for `read`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Message {
    /// Push key plus send timestamp; unique within the conversation.
    pub id: String,
    /// Owning conversation.
    pub conversation_id: String,
    /// Author.
    pub sender_id: String,
    /// Addressee.
    pub receiver_id: String,
    /// Non-empty text content.
    pub content: String,
    /// Epoch milliseconds assigned by the sending client.
    pub sent_at: i64,
    /// Whether the receiver has seen the message.
    pub read: bool,
    /// Message kind discriminator (`"text"` by default).
    pub kind: String,
}

/// Denormalized "last message" projection written after each append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryUpdate {
    pub conversation_id: String,
    pub participant_a: String,
    pub participant_b: String,
    pub text: String,
    pub at: i64,
    pub sender: String,
}

impl SummaryUpdate {
    /// Projection of a freshly appended message.
    pub fn from_message(message: &Message) -> Self {
        Self {
            conversation_id: message.conversation_id.clone(),
            participant_a: message.sender_id.clone(),
            participant_b: message.receiver_id.clone(),
            text: message.content.clone(),
            at: message.sent_at,
            sender: message.sender_id.clone(),
        }
    }

    /// The record to create when the conversation does not exist yet.
    pub fn to_conversation(&self) -> Conversation {
        Conversation {
            id: self.conversation_id.clone(),
            participant_a: self.participant_a.clone(),
            participant_b: self.participant_b.clone(),
            last_message_text: self.text.clone(),
            last_message_at: self.at,
            last_message_sender: self.sender.clone(),
        }
    }
}

/// A change notification emitted after every successful write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreChange {
    /// A message was appended to, or updated within, a conversation's log.
    Messages { conversation_id: String },
    /// A conversation record was created or its summary changed.
    Conversation { conversation_id: String },
}

impl StoreChange {
    /// The conversation the change belongs to.
    pub fn conversation_id(&self) -> &str {
        match self {
            StoreChange::Messages { conversation_id }
            | StoreChange::Conversation { conversation_id } => conversation_id,
        }
    }
}

pub(crate) fn sort_by_sent_at(messages: &mut [Message]) {
    messages.sort_by(|a, b| a.sent_at.cmp(&b.sent_at).then_with(|| a.id.cmp(&b.id)));
}
