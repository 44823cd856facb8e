//! Chat session controller for one open conversation view.

use std::sync::Arc;

use chat_store::{ChatBackend, Conversation, Message, StoreError};
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::clock::{Clock, SystemClock};
use crate::config::ChatConfig;
use crate::dedup::SendThrottle;
use crate::error::{ChatError, Result};
use crate::identity::canonical_id;
use crate::observer::{SendReport, SessionObserver};
use crate::store::{MessageStore, OutgoingMessage};
use crate::subscription::SubscriptionHandle;
use crate::summary::SummaryUpdater;

/// Whether a send is currently outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SendPhase {
    #[default]
    Idle,
    Sending,
}

/// The conversation a session has resolved and is listening to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenConversation {
    pub conversation_id: String,
    pub other_user: String,
}

#[derive(Debug)]
struct SessionState {
    phase: SendPhase,
    open: Option<OpenConversation>,
    subscription: Option<SubscriptionHandle>,
    throttle: SendThrottle,
}

/// Drives send and receive for a single conversation view.
///
/// State is owned by this value alone and never shared across views.
/// Dropping the session releases its live subscription.
pub struct ChatSession<B: ChatBackend> {
    username: String,
    config: ChatConfig,
    store: Arc<MessageStore<B>>,
    summaries: Arc<SummaryUpdater<B>>,
    observer: Arc<dyn SessionObserver>,
    clock: Arc<dyn Clock>,
    state: Arc<Mutex<SessionState>>,
}

impl<B: ChatBackend> ChatSession<B> {
    /// Create a session for the logged-in `username`.
    pub fn new(
        username: impl Into<String>,
        backend: Arc<B>,
        observer: Arc<dyn SessionObserver>,
    ) -> Result<Self> {
        Self::with_config(username, backend, observer, ChatConfig::default())
    }

    /// Create a session with explicit timing configuration.
    pub fn with_config(
        username: impl Into<String>,
        backend: Arc<B>,
        observer: Arc<dyn SessionObserver>,
        config: ChatConfig,
    ) -> Result<Self> {
        let username = username.into();
        if username.trim().is_empty() {
            return Err(ChatError::InvalidParticipant(
                "username must not be empty".to_string(),
            ));
        }

        Ok(Self {
            username,
            config,
            store: Arc::new(MessageStore::new(Arc::clone(&backend), &config)),
            summaries: Arc::new(SummaryUpdater::new(backend)),
            observer,
            clock: Arc::new(SystemClock),
            state: Arc::new(Mutex::new(SessionState {
                phase: SendPhase::Idle,
                open: None,
                subscription: None,
                throttle: SendThrottle::new(&config),
            })),
        })
    }

    /// Replace the clock used to stamp outgoing messages.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The logged-in user.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// The message store adapter this session sends through.
    pub fn store(&self) -> &MessageStore<B> {
        &self.store
    }

    /// The conversation currently open, if any.
    pub async fn current(&self) -> Option<OpenConversation> {
        self.state.lock().await.open.clone()
    }

    /// Current send phase.
    pub async fn phase(&self) -> SendPhase {
        self.state.lock().await.phase
    }

    /// Whether a live message feed is attached.
    pub async fn is_listening(&self) -> bool {
        self.state
            .lock()
            .await
            .subscription
            .as_ref()
            .is_some_and(SubscriptionHandle::is_active)
    }

    /// Open the conversation with `other_user`: resolve its id, create the
    /// record if needed, and start the live feed.
    ///
    /// Any previously open conversation's feed is torn down first.
    pub async fn open(&self, other_user: &str) -> Result<Conversation> {
        let other_user = other_user.trim();
        if other_user.is_empty() {
            return Err(ChatError::InvalidParticipant(
                "other user must not be empty".to_string(),
            ));
        }
        if other_user == self.username {
            return Err(ChatError::InvalidParticipant(format!(
                "{} cannot chat with themselves",
                other_user
            )));
        }

        let conversation_id = canonical_id(&self.username, other_user);
        let conversation = self.ensure_conversation(&conversation_id, other_user).await?;

        let mut state = self.state.lock().await;
        if let Some(previous) = state.subscription.take() {
            self.store.unsubscribe(&previous);
        }

        let observer = Arc::clone(&self.observer);
        let handle = self.store.subscribe(&conversation_id, move |messages| {
            observer.on_messages_updated(&messages);
        });

        state.subscription = Some(handle);
        state.open = Some(OpenConversation {
            conversation_id: conversation_id.clone(),
            other_user: other_user.to_string(),
        });
        state.throttle.reset();

        info!(user = %self.username, conversation_id = %conversation_id, "Opened conversation");
        Ok(conversation)
    }

    /// Existence check followed by a conditional create.
    ///
    /// Two clients opening the same pair at once can both miss the check; the
    /// second create then fails and the first writer's record stands.
    async fn ensure_conversation(&self, conversation_id: &str, other_user: &str) -> Result<Conversation> {
        let backend = self.store.backend();
        if let Some(existing) = backend.conversation(conversation_id).await? {
            return Ok(existing);
        }

        let fresh = Conversation::new(conversation_id, self.username.as_str(), other_user);
        match backend.insert_conversation(&fresh).await {
            Ok(()) => {
                info!(conversation_id, "Created conversation");
                Ok(fresh)
            }
            Err(e) if e.is_already_exists() => {
                debug!(conversation_id, "Conversation created concurrently; using existing");
                Ok(backend.conversation(conversation_id).await?.unwrap_or(fresh))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Close the view: stop the live feed and forget the conversation.
    ///
    /// A send still in flight is allowed to finish.
    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        if let Some(handle) = state.subscription.take() {
            self.store.unsubscribe(&handle);
        }
        if let Some(open) = state.open.take() {
            info!(user = %self.username, conversation_id = %open.conversation_id, "Closed conversation");
        }
    }

    /// Send `content` to the open conversation.
    ///
    /// Every attempt is reported through [`SessionObserver::on_send_result`].
    /// Duplicate suppression is reported but not meant to be shown.
    /// Dropping the returned future does not cancel the write: it completes
    /// in the background and the session returns to [`SendPhase::Idle`].
    pub async fn send(&self, content: &str) -> Result<Message> {
        let result = self.try_send(content).await;

        match &result {
            Ok(message) => debug!(message_id = %message.id, "Send succeeded"),
            Err(ChatError::DuplicateMessage) => {
                info!(user = %self.username, "Suppressed duplicate send")
            }
            Err(e) => error!(user = %self.username, "Send failed: {}", e),
        }

        self.observer.on_send_result(&SendReport::from_result(&result));
        result
    }

    async fn try_send(&self, content: &str) -> Result<Message> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ChatError::EmptyContent);
        }

        let now = self.clock.now_millis();
        let outgoing = {
            let mut state = self.state.lock().await;
            let open = state
                .open
                .clone()
                .ok_or(ChatError::NotInitialized("no conversation is open"))?;
            if state.phase == SendPhase::Sending {
                return Err(ChatError::SendInProgress);
            }
            state.throttle.admit(content, now)?;
            state.phase = SendPhase::Sending;

            OutgoingMessage::text(open.conversation_id, self.username.as_str(), open.other_user, content)
        };

        // The append and summary run on their own task, so a caller that
        // stops waiting still leaves the session back in Idle.
        let store = Arc::clone(&self.store);
        let summaries = Arc::clone(&self.summaries);
        let state = Arc::clone(&self.state);
        let delivery = tokio::spawn(async move {
            let result = deliver(&store, &summaries, &outgoing, now).await;
            state.lock().await.phase = SendPhase::Idle;
            result
        });

        match delivery.await {
            Ok(result) => result,
            Err(e) => {
                self.state.lock().await.phase = SendPhase::Idle;
                if e.is_panic() {
                    std::panic::resume_unwind(e.into_panic());
                }
                Err(ChatError::Store(StoreError::Unavailable(format!(
                    "send task ended early: {}",
                    e
                ))))
            }
        }
    }

    /// Mark everything addressed to this user in the open conversation as read.
    pub async fn mark_read(&self) -> Result<u64> {
        let conversation_id = self
            .current()
            .await
            .ok_or(ChatError::NotInitialized("no conversation is open"))?
            .conversation_id;

        let changed = self
            .store
            .backend()
            .mark_read(&conversation_id, &self.username)
            .await?;
        debug!(conversation_id = %conversation_id, changed, "Marked messages read");
        Ok(changed)
    }

    /// The timing configuration in effect.
    pub fn config(&self) -> &ChatConfig {
        &self.config
    }
}

async fn deliver<B: ChatBackend>(
    store: &MessageStore<B>,
    summaries: &SummaryUpdater<B>,
    outgoing: &OutgoingMessage,
    now: i64,
) -> Result<Message> {
    let message = store.send(outgoing, now).await?;
    summaries.apply(&message).await?;
    Ok(message)
}
