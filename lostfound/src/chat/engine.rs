//! Message synchronization for the open conversation.
//!
//! [`MessageSyncEngine`] owns at most one active conversation. Selecting a
//! conversation starts a background task that performs the initial full load
//! and then polls for newer messages every [`EngineConfig::poll_interval`],
//! using the id of the newest known message as the cursor. Sent messages and
//! polled messages are merged through the same id-deduplicating
//! [`MessageLog`], so the echo of a locally sent message is never shown twice.
//!
//! Each selection gets its own conversation record. Results that arrive
//! after the record was closed (deselect, switch to another conversation,
//! engine dropped) are discarded, so a late response can never land in the
//! wrong conversation.
//!
//! UI-facing notifications go out on an [`EngineEvent`] channel.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use lostfound_proto::model::{ChatId, ChatMessage, SendMessageRequest, ValidationError};

use super::log::MessageLog;
use crate::api::{ApiError, Backend};
use crate::auth::{TokenError, TokenProvider};
use crate::guard::InFlightGuard;

/// Default delay between incremental polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Default delay before a scroll-to-end request is emitted, giving the view
/// time to lay out new rows.
pub const DEFAULT_SCROLL_DELAY: Duration = Duration::from_millis(100);

/// Default capacity of the engine event channel.
pub const DEFAULT_EVENT_BUFFER: usize = 64;

/// Timing and buffering knobs for [`MessageSyncEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Delay between incremental polls.
    pub poll_interval: Duration,
    /// Delay before emitting [`EngineEvent::ScrollToEnd`].
    pub scroll_delay: Duration,
    /// Capacity of the event channel. Events are dropped when it is full.
    pub event_buffer: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            scroll_delay: DEFAULT_SCROLL_DELAY,
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

/// Notifications for the view layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// The initial load of `chat_id` finished.
    MessagesLoaded {
        /// Conversation that was loaded.
        chat_id: ChatId,
        /// Number of messages now in the log.
        count: usize,
    },
    /// New messages were appended by a poll or a send.
    MessagesAppended {
        /// Conversation that grew.
        chat_id: ChatId,
        /// Number of messages appended.
        count: usize,
    },
    /// The view should scroll to the newest message.
    ScrollToEnd {
        /// Conversation to scroll.
        chat_id: ChatId,
    },
}

/// Lifecycle of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No conversation is selected.
    Idle,
    /// The initial full load has not finished yet.
    Loading,
    /// Incremental polling is running.
    Polling,
}

/// Result of a single poll attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// This many new messages were appended.
    Appended(usize),
    /// The fetch succeeded but contained nothing new.
    Unchanged,
    /// Another poll was still outstanding; nothing was requested.
    InFlight,
    /// The initial load has not finished; nothing was requested.
    NotReady,
    /// No conversation is selected.
    Idle,
    /// No bearer token was available; nothing was requested.
    TokenUnavailable,
    /// The fetch failed. The next tick retries.
    Failed,
    /// The conversation was closed before the response arrived.
    Stale,
}

/// Errors returned by [`MessageSyncEngine::send_message`].
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// The content was rejected before any network call.
    #[error("invalid message: {0}")]
    Invalid(#[from] ValidationError),

    /// No conversation is selected.
    #[error("no conversation selected")]
    NoConversation,

    /// A previous send for this conversation has not completed.
    #[error("a send is already in progress")]
    AlreadySending,

    /// The token provider had no token.
    #[error("not signed in")]
    TokenUnavailable,

    /// The token provider failed.
    #[error(transparent)]
    Token(#[from] TokenError),

    /// The backend rejected the message or could not be reached.
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// State of one selected conversation.
///
/// Shared between the engine, the poll task, and in-flight sends. Once
/// `closed` is set no further result is applied to `log`.
#[derive(Debug)]
struct Conversation {
    chat_id: ChatId,
    log: parking_lot::Mutex<MessageLog>,
    phase: parking_lot::Mutex<Phase>,
    poll_in_flight: AtomicBool,
    sending: AtomicBool,
    closed: AtomicBool,
}

impl Conversation {
    fn new(chat_id: ChatId) -> Self {
        Self {
            chat_id,
            log: parking_lot::Mutex::new(MessageLog::new()),
            phase: parking_lot::Mutex::new(Phase::Loading),
            poll_in_flight: AtomicBool::new(false),
            sending: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn phase(&self) -> Phase {
        *self.phase.lock()
    }
}

/// Owner of the poll task. Aborts it when dropped.
#[derive(Debug)]
struct PollHandle(JoinHandle<()>);

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// The selected conversation together with its poll task.
#[derive(Debug)]
struct Active {
    conversation: Arc<Conversation>,
    _poller: PollHandle,
}

impl Drop for Active {
    fn drop(&mut self) {
        self.conversation.close();
        tracing::debug!(chat_id = %self.conversation.chat_id, "conversation closed");
    }
}

/// State shared with spawned tasks.
struct Shared<B, T> {
    backend: Arc<B>,
    tokens: Arc<T>,
    config: EngineConfig,
    events: mpsc::Sender<EngineEvent>,
}

impl<B, T> Shared<B, T>
where
    B: Backend + 'static,
    T: TokenProvider + 'static,
{
    async fn token(&self) -> Result<Option<String>, TokenError> {
        self.tokens.get_token().await
    }

    /// Full load of the conversation, then mark it ready for polling.
    ///
    /// Polling starts even when the load fails; its first fetch then has no
    /// cursor and recovers the full history.
    async fn initial_load(&self, conversation: &Arc<Conversation>) {
        self.load_history(conversation).await;
        if !conversation.is_closed() {
            *conversation.phase.lock() = Phase::Polling;
        }
    }

    async fn load_history(&self, conversation: &Arc<Conversation>) {
        let chat_id = &conversation.chat_id;
        let token = match self.token().await {
            Ok(Some(token)) => token,
            Ok(None) => {
                tracing::debug!(%chat_id, "no token, skipping initial message load");
                return;
            }
            Err(e) => {
                tracing::warn!(%chat_id, err = %e, "token provider failed during initial load");
                return;
            }
        };

        match self.backend.fetch_messages(&token, chat_id, None).await {
            Ok(history) => {
                if conversation.is_closed() {
                    tracing::debug!(%chat_id, "dropping initial load for closed conversation");
                    return;
                }
                let count = {
                    let mut log = conversation.log.lock();
                    log.replace_initial(history);
                    log.len()
                };
                tracing::debug!(%chat_id, count, "initial message load complete");
                self.emit(EngineEvent::MessagesLoaded {
                    chat_id: chat_id.clone(),
                    count,
                });
                self.schedule_scroll(conversation);
            }
            Err(e) => {
                tracing::warn!(%chat_id, err = %e, "initial message load failed");
            }
        }
    }

    /// One incremental poll. At most one runs per conversation at a time.
    async fn poll(&self, conversation: &Arc<Conversation>) -> PollOutcome {
        if conversation.is_closed() {
            return PollOutcome::Stale;
        }
        if conversation.phase() == Phase::Loading {
            return PollOutcome::NotReady;
        }
        let Some(_in_flight) = InFlightGuard::try_acquire(&conversation.poll_in_flight) else {
            tracing::trace!(chat_id = %conversation.chat_id, "previous poll outstanding, skipping");
            return PollOutcome::InFlight;
        };

        let chat_id = &conversation.chat_id;
        let token = match self.token().await {
            Ok(Some(token)) => token,
            Ok(None) => return PollOutcome::TokenUnavailable,
            Err(e) => {
                tracing::warn!(%chat_id, err = %e, "token provider failed during poll");
                return PollOutcome::TokenUnavailable;
            }
        };

        let cursor = conversation.log.lock().tail_id().cloned();
        let batch = match self
            .backend
            .fetch_messages(&token, chat_id, cursor.as_ref())
            .await
        {
            Ok(batch) => batch,
            Err(e) => {
                tracing::warn!(%chat_id, err = %e, "message poll failed");
                return PollOutcome::Failed;
            }
        };

        if conversation.is_closed() {
            return PollOutcome::Stale;
        }
        let appended = conversation.log.lock().append_unique(batch);
        if appended == 0 {
            return PollOutcome::Unchanged;
        }
        tracing::debug!(%chat_id, appended, "poll appended messages");
        self.emit(EngineEvent::MessagesAppended {
            chat_id: chat_id.clone(),
            count: appended,
        });
        self.schedule_scroll(conversation);
        PollOutcome::Appended(appended)
    }

    /// Emit [`EngineEvent::ScrollToEnd`] after the configured delay, unless
    /// the conversation is closed by then.
    fn schedule_scroll(&self, conversation: &Arc<Conversation>) {
        let conversation = Arc::clone(conversation);
        let events = self.events.clone();
        let delay = self.config.scroll_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if !conversation.is_closed() {
                let _ = events.try_send(EngineEvent::ScrollToEnd {
                    chat_id: conversation.chat_id.clone(),
                });
            }
        });
    }

    fn emit(&self, event: EngineEvent) {
        if let Err(e) = self.events.try_send(event) {
            tracing::trace!(err = %e, "engine event dropped");
        }
    }
}

/// Loads, polls, and sends messages for the selected conversation.
pub struct MessageSyncEngine<B, T> {
    shared: Arc<Shared<B, T>>,
    active: parking_lot::Mutex<Option<Active>>,
}

impl<B, T> MessageSyncEngine<B, T>
where
    B: Backend + 'static,
    T: TokenProvider + 'static,
{
    /// Create an idle engine and the receiver for its events.
    #[must_use]
    pub fn new(
        backend: Arc<B>,
        tokens: Arc<T>,
        config: EngineConfig,
    ) -> (Self, mpsc::Receiver<EngineEvent>) {
        let (events, rx) = mpsc::channel(config.event_buffer.max(1));
        let engine = Self {
            shared: Arc::new(Shared {
                backend,
                tokens,
                config,
                events,
            }),
            active: parking_lot::Mutex::new(None),
        };
        (engine, rx)
    }

    /// Select `chat_id` as the open conversation.
    ///
    /// Closes the previously selected conversation, cancels its poll task,
    /// and starts the initial load plus polling for the new one. Selecting the
    /// conversation that is already open does nothing.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime, since the poll task is
    /// spawned onto the current runtime.
    pub fn select(&self, chat_id: ChatId) {
        let mut active = self.active.lock();
        if active
            .as_ref()
            .is_some_and(|a| a.conversation.chat_id == chat_id)
        {
            return;
        }
        // Close the old conversation before the new task can produce results.
        drop(active.take());

        tracing::debug!(%chat_id, "conversation selected");
        let conversation = Arc::new(Conversation::new(chat_id));
        let poller = PollHandle(self.spawn_poll_task(&conversation));
        *active = Some(Active {
            conversation,
            _poller: poller,
        });
    }

    /// Close the open conversation and stop polling it.
    pub fn deselect(&self) {
        drop(self.active.lock().take());
    }

    fn spawn_poll_task(&self, conversation: &Arc<Conversation>) -> JoinHandle<()> {
        let shared = Arc::clone(&self.shared);
        let conversation = Arc::clone(conversation);
        tokio::spawn(async move {
            shared.initial_load(&conversation).await;

            let period = shared.config.poll_interval;
            let mut tick = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                tick.tick().await;
                shared.poll(&conversation).await;
                // Ticks that came due while the fetch was outstanding are
                // dropped, not replayed.
                tick.reset();
            }
        })
    }

    fn conversation(&self) -> Option<Arc<Conversation>> {
        self.active
            .lock()
            .as_ref()
            .map(|a| Arc::clone(&a.conversation))
    }

    /// Run one poll now, outside the timer.
    ///
    /// Subject to the same rules as a timer tick: skipped while another poll
    /// is outstanding or before the initial load has finished.
    pub async fn poll_now(&self) -> PollOutcome {
        match self.conversation() {
            Some(conversation) => self.shared.poll(&conversation).await,
            None => PollOutcome::Idle,
        }
    }

    /// Send `content` to the open conversation.
    ///
    /// The content is trimmed first; empty content is rejected without a
    /// network call. On success the server copy is appended to the log
    /// (unless a poll already delivered it) and returned. Nothing is appended
    /// if the conversation was closed while the request was in flight.
    ///
    /// # Errors
    ///
    /// See [`SendError`].
    pub async fn send_message(&self, content: &str) -> Result<ChatMessage, SendError> {
        let request = SendMessageRequest::new(content)?;
        let conversation = self.conversation().ok_or(SendError::NoConversation)?;
        let _sending =
            InFlightGuard::try_acquire(&conversation.sending).ok_or(SendError::AlreadySending)?;

        let token = self
            .shared
            .token()
            .await?
            .ok_or(SendError::TokenUnavailable)?;

        let chat_id = &conversation.chat_id;
        let message = self
            .shared
            .backend
            .send_message(&token, chat_id, &request)
            .await
            .inspect_err(|e| tracing::warn!(%chat_id, err = %e, "send failed"))?;

        if conversation.is_closed() {
            tracing::debug!(%chat_id, "conversation closed during send, not appending");
            return Ok(message);
        }
        let appended = conversation.log.lock().append_unique([message.clone()]);
        tracing::debug!(%chat_id, message_id = %message.id, "message sent");
        if appended > 0 {
            self.shared.emit(EngineEvent::MessagesAppended {
                chat_id: chat_id.clone(),
                count: appended,
            });
            self.shared.schedule_scroll(&conversation);
        }
        Ok(message)
    }

    /// Currently selected conversation.
    #[must_use]
    pub fn active_chat(&self) -> Option<ChatId> {
        self.active
            .lock()
            .as_ref()
            .map(|a| a.conversation.chat_id.clone())
    }

    /// Current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.conversation().map_or(Phase::Idle, |c| c.phase())
    }

    /// Snapshot of the open conversation's messages, oldest first.
    #[must_use]
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.conversation()
            .map(|c| c.log.lock().as_slice().to_vec())
            .unwrap_or_default()
    }

    /// Whether a send is in flight for the open conversation.
    #[must_use]
    pub fn is_sending(&self) -> bool {
        self.conversation()
            .is_some_and(|c| c.sending.load(Ordering::Acquire))
    }

    /// Configuration the engine was built with.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }
}
