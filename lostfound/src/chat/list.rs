//! Conversation list.
//!
//! [`ChatListStore`] loads the user's conversations from the backend and keeps
//! the last successful result. A load that fails leaves the previous list in
//! place. Only one load runs at a time; a second request while one is in
//! flight is skipped rather than queued.
//!
//! A deep-link target can be registered with [`ChatListStore::set_target`].
//! The first successful load after that consumes it and reports the matching
//! conversation as an auto-select candidate.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use lostfound_proto::model::{Chat, ChatId};

use crate::api::Backend;
use crate::auth::TokenProvider;
use crate::guard::InFlightGuard;

/// Result of [`ChatListStore::load_chats`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The list was replaced with `count` conversations.
    Loaded {
        /// Number of conversations now in the list.
        count: usize,
        /// Conversation matching the deep-link target, if one was pending and
        /// present in the new list.
        auto_select: Option<Chat>,
    },
    /// Another load was already in flight; nothing was requested.
    AlreadyLoading,
    /// No bearer token was available; nothing was requested.
    TokenUnavailable,
    /// The request failed; the previous list is kept.
    Failed,
}

/// Holds the conversation list of the signed-in user.
pub struct ChatListStore<B, T> {
    backend: Arc<B>,
    tokens: Arc<T>,
    chats: parking_lot::RwLock<Vec<Chat>>,
    loading: AtomicBool,
    target: parking_lot::Mutex<Option<ChatId>>,
}

impl<B: Backend, T: TokenProvider> ChatListStore<B, T> {
    /// Create an empty store.
    #[must_use]
    pub fn new(backend: Arc<B>, tokens: Arc<T>) -> Self {
        Self {
            backend,
            tokens,
            chats: parking_lot::RwLock::new(Vec::new()),
            loading: AtomicBool::new(false),
            target: parking_lot::Mutex::new(None),
        }
    }

    /// Register (or clear) the conversation to open after the next load.
    pub fn set_target(&self, chat_id: Option<ChatId>) {
        *self.target.lock() = chat_id;
    }

    /// Pending deep-link target.
    #[must_use]
    pub fn target(&self) -> Option<ChatId> {
        self.target.lock().clone()
    }

    /// Fetch the conversation list and replace the stored one.
    pub async fn load_chats(&self) -> LoadOutcome {
        let Some(_loading) = InFlightGuard::try_acquire(&self.loading) else {
            tracing::debug!("chat list load already in flight, skipping");
            return LoadOutcome::AlreadyLoading;
        };

        let token = match self.tokens.get_token().await {
            Ok(Some(token)) => token,
            Ok(None) => {
                tracing::debug!("no token, skipping chat list load");
                return LoadOutcome::TokenUnavailable;
            }
            Err(e) => {
                tracing::warn!(err = %e, "token provider failed during chat list load");
                return LoadOutcome::TokenUnavailable;
            }
        };

        let chats = match self.backend.fetch_chats(&token).await {
            Ok(chats) => chats,
            Err(e) => {
                tracing::warn!(err = %e, "chat list load failed, keeping previous list");
                return LoadOutcome::Failed;
            }
        };

        let auto_select = self
            .target
            .lock()
            .take()
            .and_then(|target| chats.iter().find(|c| c.id == target).cloned());
        let count = chats.len();
        *self.chats.write() = chats;
        tracing::debug!(count, auto_select = auto_select.is_some(), "chat list loaded");

        LoadOutcome::Loaded { count, auto_select }
    }

    /// Add `chat` to the front of the list, or replace the entry with the
    /// same id in place.
    pub fn upsert(&self, chat: Chat) {
        let mut chats = self.chats.write();
        match chats.iter_mut().find(|c| c.id == chat.id) {
            Some(existing) => *existing = chat,
            None => chats.insert(0, chat),
        }
    }

    /// Snapshot of the list in backend order.
    #[must_use]
    pub fn chats(&self) -> Vec<Chat> {
        self.chats.read().clone()
    }

    /// Look up a conversation by id.
    #[must_use]
    pub fn find(&self, chat_id: &ChatId) -> Option<Chat> {
        self.chats.read().iter().find(|c| c.id == *chat_id).cloned()
    }

    /// Conversations matching `query`, see [`filter`].
    #[must_use]
    pub fn filtered(&self, query: &str) -> Vec<Chat> {
        filter(&self.chats.read(), query)
    }

    /// Whether a load is in flight.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::Acquire)
    }
}

/// Conversations whose other participant's name, item title, or last message
/// contains `query`, ignoring case. Order is preserved.
///
/// A blank query matches everything. Otherwise the query is matched as
/// typed, surrounding whitespace included.
#[must_use]
pub fn filter(chats: &[Chat], query: &str) -> Vec<Chat> {
    if query.trim().is_empty() {
        return chats.to_vec();
    }
    let needle = query.to_lowercase();
    chats
        .iter()
        .filter(|chat| matches(chat, &needle))
        .cloned()
        .collect()
}

fn matches(chat: &Chat, needle: &str) -> bool {
    let contains = |field: &str| field.to_lowercase().contains(needle);
    chat.other_user
        .as_ref()
        .is_some_and(|u| contains(&u.full_name))
        || chat.item_title.as_deref().is_some_and(contains)
        || chat
            .last_message
            .as_ref()
            .is_some_and(|m| contains(&m.content))
}
