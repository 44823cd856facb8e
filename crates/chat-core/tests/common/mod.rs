//! Shared helpers for chat-core integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chat_core::{Message, SendReport, SessionObserver};
use chat_store::{
    async_trait, ChatBackend, Conversation, MemoryBackend, StoreChange, StoreError, SummaryUpdate,
};
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;

/// How long a test waits for a live delivery before giving up.
pub const DELIVERY_TIMEOUT: Duration = Duration::from_secs(2);

/// Observer that forwards every callback into channels.
pub struct ChannelObserver {
    feeds: mpsc::UnboundedSender<Vec<Message>>,
    reports: mpsc::UnboundedSender<SendReport>,
}

/// Receiving half of a [`ChannelObserver`].
pub struct ObserverInbox {
    pub feeds: mpsc::UnboundedReceiver<Vec<Message>>,
    pub reports: mpsc::UnboundedReceiver<SendReport>,
}

pub fn channel_observer() -> (Arc<ChannelObserver>, ObserverInbox) {
    let (feed_tx, feed_rx) = mpsc::unbounded_channel();
    let (report_tx, report_rx) = mpsc::unbounded_channel();
    (
        Arc::new(ChannelObserver {
            feeds: feed_tx,
            reports: report_tx,
        }),
        ObserverInbox {
            feeds: feed_rx,
            reports: report_rx,
        },
    )
}

impl SessionObserver for ChannelObserver {
    fn on_messages_updated(&self, messages: &[Message]) {
        let _ = self.feeds.send(messages.to_vec());
    }

    fn on_send_result(&self, report: &SendReport) {
        let _ = self.reports.send(report.clone());
    }
}

impl ObserverInbox {
    /// Wait for a feed delivery satisfying `predicate`, skipping earlier ones.
    pub async fn wait_for_feed<P>(&mut self, predicate: P) -> Vec<Message>
    where
        P: Fn(&[Message]) -> bool,
    {
        wait_for(&mut self.feeds, |feed: &Vec<Message>| predicate(feed.as_slice())).await
    }

    /// The next send report.
    pub async fn next_report(&mut self) -> SendReport {
        timeout(DELIVERY_TIMEOUT, self.reports.recv())
            .await
            .expect("timed out waiting for send report")
            .expect("observer dropped")
    }

    /// Discard everything delivered so far.
    pub fn drain_feeds(&mut self) {
        while self.feeds.try_recv().is_ok() {}
    }
}

/// Wait on `rx` until an item satisfies `predicate`.
pub async fn wait_for<T, P>(rx: &mut mpsc::UnboundedReceiver<T>, predicate: P) -> T
where
    P: Fn(&T) -> bool,
{
    timeout(DELIVERY_TIMEOUT, async {
        loop {
            let item = rx.recv().await.expect("delivery channel closed");
            if predicate(&item) {
                return item;
            }
        }
    })
    .await
    .expect("timed out waiting for live delivery")
}

/// Assert nothing arrives on `rx` for a short while.
pub async fn assert_silent<T: std::fmt::Debug>(rx: &mut mpsc::UnboundedReceiver<T>) {
    tokio::time::sleep(Duration::from_millis(150)).await;
    if let Ok(item) = rx.try_recv() {
        panic!("unexpected delivery: {:?}", item);
    }
}

/// A [`MemoryBackend`] wrapper that counts calls and can be told to fail.
#[derive(Default)]
pub struct FaultyBackend {
    pub inner: MemoryBackend,
    calls: AtomicUsize,
    fail_inserts: AtomicBool,
    fail_summaries: AtomicBool,
    fail_keys: AtomicBool,
    empty_keys: AtomicBool,
    insert_delay: Mutex<Option<Duration>>,
}

impl FaultyBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of backend operations invoked so far (change feed excluded).
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn reset_calls(&self) {
        self.calls.store(0, Ordering::SeqCst);
    }

    pub fn fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_summaries(&self, fail: bool) {
        self.fail_summaries.store(fail, Ordering::SeqCst);
    }

    pub fn fail_keys(&self, fail: bool) {
        self.fail_keys.store(fail, Ordering::SeqCst);
    }

    pub fn empty_keys(&self, empty: bool) {
        self.empty_keys.store(empty, Ordering::SeqCst);
    }

    pub fn delay_inserts(&self, delay: Duration) {
        *self.insert_delay.lock().unwrap() = Some(delay);
    }

    fn record(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChatBackend for FaultyBackend {
    async fn allocate_key(&self, conversation_id: &str) -> chat_store::Result<String> {
        self.record();
        if self.fail_keys.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("push key service down".to_string()));
        }
        if self.empty_keys.load(Ordering::SeqCst) {
            return Ok(String::new());
        }
        self.inner.allocate_key(conversation_id).await
    }

    async fn insert_message(&self, message: &Message) -> chat_store::Result<()> {
        self.record();
        let delay = *self.insert_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(StoreError::Rejected {
                operation: "insert_message",
                reason: "permission denied".to_string(),
            });
        }
        self.inner.insert_message(message).await
    }

    async fn messages(&self, conversation_id: &str) -> chat_store::Result<Vec<Message>> {
        self.record();
        self.inner.messages(conversation_id).await
    }

    async fn messages_since(
        &self,
        conversation_id: &str,
        since_millis: i64,
    ) -> chat_store::Result<Vec<Message>> {
        self.record();
        self.inner.messages_since(conversation_id, since_millis).await
    }

    async fn mark_read(&self, conversation_id: &str, reader: &str) -> chat_store::Result<u64> {
        self.record();
        self.inner.mark_read(conversation_id, reader).await
    }

    async fn conversation(&self, id: &str) -> chat_store::Result<Option<Conversation>> {
        self.record();
        self.inner.conversation(id).await
    }

    async fn insert_conversation(&self, conversation: &Conversation) -> chat_store::Result<()> {
        self.record();
        self.inner.insert_conversation(conversation).await
    }

    async fn update_summary(&self, update: &SummaryUpdate) -> chat_store::Result<()> {
        self.record();
        if self.fail_summaries.load(Ordering::SeqCst) {
            return Err(StoreError::Rejected {
                operation: "update_summary",
                reason: "quota exceeded".to_string(),
            });
        }
        self.inner.update_summary(update).await
    }

    async fn conversations(&self) -> chat_store::Result<Vec<Conversation>> {
        self.record();
        self.inner.conversations().await
    }

    fn changes(&self) -> broadcast::Receiver<StoreChange> {
        self.inner.changes()
    }
}
