//! Chat timing configuration.

use std::env;
use std::time::Duration;

use crate::error::{ChatError, Result};

/// Default look-back window for the store-side duplicate query.
pub const DEFAULT_DUPLICATE_QUERY_WINDOW: Duration = Duration::from_millis(3_000);

/// Default window within which an identical message counts as a duplicate.
pub const DEFAULT_DUPLICATE_MATCH_WINDOW: Duration = Duration::from_millis(2_000);

/// Default client-side window for suppressing repeated identical sends.
pub const DEFAULT_SEND_THROTTLE: Duration = Duration::from_millis(2_000);

/// Timing parameters for duplicate suppression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatConfig {
    /// How far back the store-side check looks for recent messages.
    pub duplicate_query_window: Duration,

    /// Maximum distance between two identical messages for the second to
    /// be rejected as a duplicate.
    pub duplicate_match_window: Duration,

    /// How long the session controller refuses to resend identical content.
    pub send_throttle: Duration,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            duplicate_query_window: DEFAULT_DUPLICATE_QUERY_WINDOW,
            duplicate_match_window: DEFAULT_DUPLICATE_MATCH_WINDOW,
            send_throttle: DEFAULT_SEND_THROTTLE,
        }
    }
}

impl ChatConfig {
    /// Create configuration from environment variables.
    ///
    /// Optional environment variables (milliseconds):
    /// - `CHAT_DUPLICATE_QUERY_WINDOW_MS` (default: 3000)
    /// - `CHAT_DUPLICATE_MATCH_WINDOW_MS` (default: 2000)
    /// - `CHAT_SEND_THROTTLE_MS` (default: 2000)
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            duplicate_query_window: millis_from_env(
                "CHAT_DUPLICATE_QUERY_WINDOW_MS",
                defaults.duplicate_query_window,
            )?,
            duplicate_match_window: millis_from_env(
                "CHAT_DUPLICATE_MATCH_WINDOW_MS",
                defaults.duplicate_match_window,
            )?,
            send_throttle: millis_from_env("CHAT_SEND_THROTTLE_MS", defaults.send_throttle)?,
        })
    }

    pub(crate) fn duplicate_query_millis(&self) -> i64 {
        duration_millis(self.duplicate_query_window)
    }

    pub(crate) fn duplicate_match_millis(&self) -> i64 {
        duration_millis(self.duplicate_match_window)
    }

    pub(crate) fn send_throttle_millis(&self) -> i64 {
        duration_millis(self.send_throttle)
    }
}

fn millis_from_env(key: &str, default: Duration) -> Result<Duration> {
    match env::var(key) {
        Ok(raw) => parse_millis(key, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_millis(key: &str, raw: &str) -> Result<Duration> {
    raw.trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| ChatError::Configuration(format!("{} must be milliseconds, got {:?}", key, raw)))
}

fn duration_millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}
