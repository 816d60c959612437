//! Chat screen driver.
//!
//! [`ChatSession`] is the state machine behind the chat screen. The host
//! pushes events into it (screen focused, conversation tapped, back pressed,
//! send pressed, search typed) and reads the resulting state back. It owns
//! one [`ChatListStore`], one [`MessageSyncEngine`], and the [`Composer`].
//!
//! Focusing the list view loads the conversation list once per return to the
//! list; while a conversation is open, focus does nothing.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;

use lostfound_proto::model::{Chat, ChatId, ChatMessage, ItemId, Profile, UserId};

use crate::api::Backend;
use crate::auth::TokenProvider;
use crate::chat::{
    ChatListStore, Composer, EngineConfig, EngineEvent, LoadOutcome, MessageSyncEngine, SendError,
    filter,
};

/// Drives the conversation list and the open conversation.
pub struct ChatSession<B, T> {
    backend: Arc<B>,
    tokens: Arc<T>,
    list: ChatListStore<B, T>,
    engine: MessageSyncEngine<B, T>,
    composer: parking_lot::Mutex<Composer>,
    search: parking_lot::Mutex<String>,
    selected: parking_lot::RwLock<Option<Chat>>,
    current_user: parking_lot::RwLock<Option<UserId>>,
    list_loaded: AtomicBool,
}

impl<B, T> ChatSession<B, T>
where
    B: Backend + 'static,
    T: TokenProvider + 'static,
{
    /// Create a session and the receiver for its engine events.
    #[must_use]
    pub fn new(
        backend: Arc<B>,
        tokens: Arc<T>,
        config: EngineConfig,
    ) -> (Self, mpsc::Receiver<EngineEvent>) {
        let (engine, events) =
            MessageSyncEngine::new(Arc::clone(&backend), Arc::clone(&tokens), config);
        let session = Self {
            list: ChatListStore::new(Arc::clone(&backend), Arc::clone(&tokens)),
            backend,
            tokens,
            engine,
            composer: parking_lot::Mutex::new(Composer::new()),
            search: parking_lot::Mutex::new(String::new()),
            selected: parking_lot::RwLock::new(None),
            current_user: parking_lot::RwLock::new(None),
            list_loaded: AtomicBool::new(false),
        };
        (session, events)
    }

    /// Open `chat_id` once the list has loaded, as when navigating here from
    /// another screen.
    pub fn open_on_load(&self, chat_id: ChatId) {
        self.list.set_target(Some(chat_id));
    }

    /// The chat screen gained focus.
    ///
    /// Loads the conversation list unless a conversation is open or the list
    /// was already loaded since the last [`back`](Self::back). If the load
    /// carries a deep-link target and nothing is selected yet, that
    /// conversation is opened. Returns `None` when no load was attempted.
    pub async fn focus(&self) -> Option<LoadOutcome> {
        if self.selected.read().is_some() {
            return None;
        }
        if self.list_loaded.swap(true, Ordering::AcqRel) {
            return None;
        }

        let outcome = self.list.load_chats().await;
        match &outcome {
            LoadOutcome::Loaded { auto_select, .. } => {
                let nothing_open = self.selected.read().is_none();
                if let Some(chat) = auto_select.as_ref().filter(|_| nothing_open) {
                    tracing::debug!(chat_id = %chat.id, "opening deep-linked conversation");
                    self.open(chat.clone());
                }
            }
            // Let the next focus retry.
            _ => self.list_loaded.store(false, Ordering::Release),
        }
        Some(outcome)
    }

    /// Reload the conversation list regardless of the focus latch.
    pub async fn refresh(&self) -> LoadOutcome {
        self.list.load_chats().await
    }

    /// Open a conversation from the list. Returns `false` if `chat_id` is not
    /// in the list.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime; see
    /// [`MessageSyncEngine::select`].
    pub fn select(&self, chat_id: &ChatId) -> bool {
        match self.list.find(chat_id) {
            Some(chat) => {
                self.open(chat);
                true
            }
            None => {
                tracing::debug!(%chat_id, "selected conversation not in list");
                false
            }
        }
    }

    fn open(&self, chat: Chat) {
        self.engine.select(chat.id.clone());
        *self.selected.write() = Some(chat);
    }

    /// Close the open conversation and return to the list.
    ///
    /// Polling stops immediately and the next [`focus`](Self::focus) reloads
    /// the list.
    pub fn back(&self) {
        self.engine.deselect();
        *self.selected.write() = None;
        self.list_loaded.store(false, Ordering::Release);
    }

    /// Start (or resume) the conversation about `item_id` and open it.
    ///
    /// Returns `None` if no token is available or the backend call fails.
    pub async fn open_item_chat(&self, item_id: &ItemId) -> Option<Chat> {
        let token = match self.tokens.get_token().await {
            Ok(Some(token)) => token,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(%item_id, err = %e, "token provider failed");
                return None;
            }
        };
        match self.backend.create_or_get_chat(&token, item_id).await {
            Ok(chat) => {
                tracing::debug!(%item_id, chat_id = %chat.id, "conversation ready");
                self.list.upsert(chat.clone());
                self.open(chat.clone());
                Some(chat)
            }
            Err(e) => {
                tracing::warn!(%item_id, err = %e, "could not start conversation");
                None
            }
        }
    }

    /// Replace the draft message.
    pub fn set_draft(&self, text: impl Into<String>) {
        self.composer.lock().set_text(text);
    }

    /// Current draft message.
    #[must_use]
    pub fn draft(&self) -> String {
        self.composer.lock().text().to_string()
    }

    /// Whether the send action should be enabled.
    #[must_use]
    pub fn can_send(&self) -> bool {
        self.selected.read().is_some()
            && !self.engine.is_sending()
            && self.composer.lock().can_send()
    }

    /// Send the draft to the open conversation.
    ///
    /// The draft is cleared on success and kept on failure.
    ///
    /// # Errors
    ///
    /// See [`SendError`].
    pub async fn send(&self) -> Result<ChatMessage, SendError> {
        let draft = self.draft();
        let message = self.engine.send_message(&draft).await?;
        self.composer.lock().clear();
        Ok(message)
    }

    /// Update the search text.
    pub fn set_search(&self, text: impl Into<String>) {
        *self.search.lock() = text.into();
    }

    /// Conversations matching the current search, in backend order.
    #[must_use]
    pub fn visible_chats(&self) -> Vec<Chat> {
        let query = self.search.lock().clone();
        filter(&self.list.chats(), &query)
    }

    /// Resolve the signed-in user's backend id, used to tell own messages
    /// apart. Cached after the first success.
    pub async fn current_user(&self) -> Option<UserId> {
        let cached = self.current_user.read().clone();
        if cached.is_some() {
            return cached;
        }
        let token = self.tokens.get_token().await.ok().flatten()?;
        match self.backend.fetch_me(&token).await {
            Ok(record) => {
                *self.current_user.write() = Some(record.id.clone());
                Some(record.id)
            }
            Err(e) => {
                tracing::warn!(err = %e, "could not resolve current user");
                None
            }
        }
    }

    /// Whether `message` was written by the signed-in user. `false` until
    /// [`current_user`](Self::current_user) has resolved.
    #[must_use]
    pub fn is_mine(&self, message: &ChatMessage) -> bool {
        self.current_user.read().as_ref() == Some(&message.sender_id)
    }

    /// Profile of the signed-in user.
    pub async fn profile(&self) -> Option<Profile> {
        let token = self.tokens.get_token().await.ok().flatten()?;
        self.backend
            .fetch_profile(&token)
            .await
            .inspect_err(|e| tracing::warn!(err = %e, "could not load profile"))
            .ok()
    }

    /// The open conversation.
    #[must_use]
    pub fn selected(&self) -> Option<Chat> {
        self.selected.read().clone()
    }

    /// Messages of the open conversation, oldest first.
    #[must_use]
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.engine.messages()
    }

    /// The message engine.
    #[must_use]
    pub const fn engine(&self) -> &MessageSyncEngine<B, T> {
        &self.engine
    }

    /// The conversation list.
    #[must_use]
    pub const fn list(&self) -> &ChatListStore<B, T> {
        &self.list
    }
}
