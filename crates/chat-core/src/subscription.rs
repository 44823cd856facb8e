//! Live subscriptions over a backend's change feed.
//!
//! A subscription re-materializes its whole view on every relevant change
//! and hands the snapshot to a callback. Nothing is diffed; each delivery is
//! complete on its own.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chat_store::StoreChange;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio::task::AbortHandle;
use tracing::{debug, warn};

/// Handle to a live listener. Dropping it unsubscribes.
#[derive(Debug)]
pub struct SubscriptionHandle {
    topic: String,
    cancelled: Arc<AtomicBool>,
    abort: AbortHandle,
}

impl SubscriptionHandle {
    /// Stop all future deliveries.
    ///
    /// Safe to call any number of times; only the first call tears down.
    pub fn unsubscribe(&self) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        self.abort.abort();
        debug!(topic = %self.topic, "Unsubscribed live listener");
    }

    /// Whether the listener still delivers updates.
    pub fn is_active(&self) -> bool {
        !self.cancelled.load(Ordering::SeqCst)
    }

    /// What this subscription watches, for logging.
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Spawn a task that loads a snapshot now and again after each matching change.
///
/// `changes` must be obtained before calling so that writes racing with the
/// initial load are not missed. Must be called from within a Tokio runtime.
pub(crate) fn spawn_live<T, M, L, Fut, D>(
    topic: String,
    mut changes: broadcast::Receiver<StoreChange>,
    matches: M,
    load: L,
    deliver: D,
) -> SubscriptionHandle
where
    T: Send + 'static,
    M: Fn(&StoreChange) -> bool + Send + Sync + 'static,
    L: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = chat_store::Result<T>> + Send,
    D: Fn(T) + Send + Sync + 'static,
{
    let cancelled = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancelled);
    let task_topic = topic.clone();

    let task = tokio::spawn(async move {
        loop {
            match load().await {
                Ok(snapshot) => {
                    if flag.load(Ordering::SeqCst) {
                        return;
                    }
                    debug!(topic = %task_topic, "Delivering live snapshot");
                    deliver(snapshot);
                }
                Err(e) => warn!(topic = %task_topic, "Failed to load live snapshot: {}", e),
            }

            if !wait_for_change(&task_topic, &mut changes, &matches).await {
                debug!(topic = %task_topic, "Change feed closed");
                return;
            }
        }
    });

    SubscriptionHandle {
        topic,
        cancelled,
        abort: task.abort_handle(),
    }
}

/// Block until a matching change arrives, then drain anything already queued
/// so a burst of writes costs one reload. Returns false once the feed closes.
async fn wait_for_change<M>(
    topic: &str,
    changes: &mut broadcast::Receiver<StoreChange>,
    matches: &M,
) -> bool
where
    M: Fn(&StoreChange) -> bool,
{
    loop {
        match changes.recv().await {
            Ok(change) if matches(&change) => break,
            Ok(_) => continue,
            Err(RecvError::Lagged(skipped)) => {
                warn!(topic = %topic, skipped, "Live listener lagged; reloading");
                break;
            }
            Err(RecvError::Closed) => return false,
        }
    }

    loop {
        match changes.try_recv() {
            Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Empty) => return true,
            Err(TryRecvError::Closed) => return true,
        }
    }
}
