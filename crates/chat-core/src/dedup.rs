//! Duplicate suppression.
//!
//! Two independent layers guard against one user action producing two
//! messages:
//!
//! - [`DuplicateFilter`] runs in the store send path and looks at what the
//!   backend already holds.
//! - [`SendThrottle`] runs in the session controller and remembers the last
//!   content it let through.
//!
//! The store-side check and the append that follows are two separate round
//! trips. Two sends racing through that gap can both pass the check, so the
//! filter is best effort, not exactly-once.

use chat_store::{ChatBackend, Message};
use tracing::{debug, info};

use crate::config::ChatConfig;
use crate::error::{ChatError, Result};

/// Store-side check for a near-identical recent message.
#[derive(Debug, Clone, Copy)]
pub struct DuplicateFilter {
    query_window_ms: i64,
    match_window_ms: i64,
}

impl Default for DuplicateFilter {
    fn default() -> Self {
        Self::new(&ChatConfig::default())
    }
}

impl DuplicateFilter {
    /// Create a filter using the configured windows.
    pub fn new(config: &ChatConfig) -> Self {
        Self {
            query_window_ms: config.duplicate_query_millis(),
            match_window_ms: config.duplicate_match_millis(),
        }
    }

    /// Reject the send if `sender_id` posted identical `content` within the
    /// match window around `now`.
    pub async fn check<B>(
        &self,
        backend: &B,
        conversation_id: &str,
        sender_id: &str,
        content: &str,
        now: i64,
    ) -> Result<()>
    where
        B: ChatBackend + ?Sized,
    {
        let since = now.saturating_sub(self.query_window_ms);
        let recent = backend.messages_since(conversation_id, since).await?;

        if let Some(existing) = self.find_duplicate(&recent, sender_id, content, now) {
            info!(
                conversation_id,
                sender_id,
                existing_id = %existing.id,
                "Rejecting duplicate message ({} ms after original)",
                now - existing.sent_at
            );
            return Err(ChatError::DuplicateMessage);
        }

        Ok(())
    }

    /// The first message in `recent` that the new send would duplicate.
    pub fn find_duplicate<'a>(
        &self,
        recent: &'a [Message],
        sender_id: &str,
        content: &str,
        now: i64,
    ) -> Option<&'a Message> {
        recent.iter().find(|m| {
            m.sender_id == sender_id
                && m.content == content
                && m.sent_at.abs_diff(now) < self.match_window_ms.unsigned_abs()
        })
    }
}

/// Client-side guard against resending identical content too quickly.
#[derive(Debug, Clone)]
pub struct SendThrottle {
    window_ms: i64,
    last_attempt: Option<(String, i64)>,
}

impl Default for SendThrottle {
    fn default() -> Self {
        Self::new(&ChatConfig::default())
    }
}

impl SendThrottle {
    /// Create a throttle using the configured window.
    pub fn new(config: &ChatConfig) -> Self {
        Self {
            window_ms: config.send_throttle_millis(),
            last_attempt: None,
        }
    }

    /// Admit or refuse a send of `content` at `now`.
    ///
    /// Admitted sends become the new reference point whether or not they
    /// later succeed; refused ones do not.
    pub fn admit(&mut self, content: &str, now: i64) -> Result<()> {
        if let Some((last_content, last_at)) = &self.last_attempt {
            let elapsed = now.saturating_sub(*last_at);
            if last_content == content && elapsed < self.window_ms {
                debug!(elapsed, "Throttling repeated send");
                return Err(ChatError::DuplicateMessage);
            }
        }

        self.last_attempt = Some((content.to_string(), now));
        Ok(())
    }

    /// Forget the last attempt.
    pub fn reset(&mut self) {
        self.last_attempt = None;
    }
}
