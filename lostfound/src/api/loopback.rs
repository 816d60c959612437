//! Loopback backend for testing.
//!
//! [`LoopbackBackend`] keeps chats and messages in memory and answers the
//! same operations as the REST backend. Every call is recorded before it is
//! served, so tests can count requests that are still in flight. Requests can
//! be held open with [`hold`](LoopbackBackend::hold) to simulate a slow
//! network, and individual routes can be made to fail with a status code.

use std::collections::HashMap;

use tokio::sync::watch;

use lostfound_proto::model::{
    Chat, ChatId, ChatMessage, Identity, ItemId, LastMessage, MessageId, Profile,
    SendMessageRequest, UserRecord, UserSummary,
};

use super::{ApiError, Backend};

/// Kind of backend route, used to count calls and inject failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteKind {
    Me,
    Profile,
    ListChats,
    CreateChat,
    ListMessages,
    SendMessage,
}

/// A recorded backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Me,
    Profile,
    ListChats,
    CreateChat {
        item_id: ItemId,
    },
    ListMessages {
        chat_id: ChatId,
        after: Option<MessageId>,
    },
    SendMessage {
        chat_id: ChatId,
        content: String,
    },
}

impl Call {
    /// The route this call targeted.
    #[must_use]
    pub const fn kind(&self) -> RouteKind {
        match self {
            Self::Me => RouteKind::Me,
            Self::Profile => RouteKind::Profile,
            Self::ListChats => RouteKind::ListChats,
            Self::CreateChat { .. } => RouteKind::CreateChat,
            Self::ListMessages { .. } => RouteKind::ListMessages,
            Self::SendMessage { .. } => RouteKind::SendMessage,
        }
    }
}

struct State {
    user: UserSummary,
    email: String,
    chats: Vec<Chat>,
    messages: HashMap<ChatId, Vec<ChatMessage>>,
    failures: HashMap<RouteKind, u16>,
    inclusive_cursor: bool,
    next_id: u64,
}

impl State {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}{}", self.next_id)
    }

    fn check(&self, kind: RouteKind) -> Result<(), ApiError> {
        match self.failures.get(&kind) {
            Some(&status) => Err(ApiError::Status {
                status,
                body: format!("injected failure for {kind:?}"),
            }),
            None => Ok(()),
        }
    }

    fn store_message(
        &mut self,
        chat_id: &ChatId,
        sender: UserSummary,
        content: &str,
    ) -> ChatMessage {
        let message = ChatMessage {
            id: MessageId::new(self.next_id("m")),
            chat_id: chat_id.clone(),
            sender_id: sender.id.clone(),
            content: content.to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            sender: Some(sender),
        };
        self.messages
            .entry(chat_id.clone())
            .or_default()
            .push(message.clone());
        if let Some(chat) = self.chats.iter_mut().find(|c| c.id == *chat_id) {
            chat.last_message = Some(LastMessage {
                id: message.id.clone(),
                content: message.content.clone(),
                created_at: message.created_at.clone(),
            });
            chat.updated_at.clone_from(&message.created_at);
        }
        message
    }
}

/// In-process backend implementing [`Backend`].
pub struct LoopbackBackend {
    state: parking_lot::Mutex<State>,
    calls: parking_lot::Mutex<Vec<Call>>,
    held: watch::Sender<bool>,
}

impl LoopbackBackend {
    /// Create a backend whose signed-in user is `identity`.
    #[must_use]
    pub fn new(identity: &Identity) -> Self {
        let (held, _) = watch::channel(false);
        Self {
            state: parking_lot::Mutex::new(State {
                user: UserSummary {
                    id: identity.id.clone(),
                    full_name: identity.display_name.clone(),
                    avatar_url: None,
                },
                email: identity.email.clone(),
                chats: Vec::new(),
                messages: HashMap::new(),
                failures: HashMap::new(),
                inclusive_cursor: false,
                next_id: 0,
            }),
            calls: parking_lot::Mutex::new(Vec::new()),
            held,
        }
    }

    /// Add a conversation to the user's chat list.
    pub fn insert_chat(&self, chat: Chat) {
        self.state.lock().chats.push(chat);
    }

    /// Store a message written by `sender` (usually the other participant)
    /// and return the server copy.
    pub fn post_message(
        &self,
        chat_id: &ChatId,
        sender: &UserSummary,
        content: &str,
    ) -> ChatMessage {
        self.state
            .lock()
            .store_message(chat_id, sender.clone(), content)
    }

    /// Messages stored for `chat_id`, oldest first.
    #[must_use]
    pub fn stored_messages(&self, chat_id: &ChatId) -> Vec<ChatMessage> {
        self.state
            .lock()
            .messages
            .get(chat_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Make every call to `kind` fail with `status` until [`recover`](Self::recover).
    pub fn fail(&self, kind: RouteKind, status: u16) {
        self.state.lock().failures.insert(kind, status);
    }

    /// Stop failing calls to `kind`.
    pub fn recover(&self, kind: RouteKind) {
        self.state.lock().failures.remove(&kind);
    }

    /// When set, a message-list request with a cursor also returns the
    /// cursor message itself (an overlapping window).
    pub fn set_inclusive_cursor(&self, inclusive: bool) {
        self.state.lock().inclusive_cursor = inclusive;
    }

    /// Hold every request open until [`release`](Self::release).
    ///
    /// Calls are still recorded when they arrive.
    pub fn hold(&self) {
        self.held.send_replace(true);
    }

    /// Let held requests complete.
    pub fn release(&self) {
        self.held.send_replace(false);
    }

    /// All calls received so far, in arrival order.
    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    /// Number of calls received for `kind`.
    #[must_use]
    pub fn count(&self, kind: RouteKind) -> usize {
        self.calls.lock().iter().filter(|c| c.kind() == kind).count()
    }

    /// Forget recorded calls.
    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    /// Record a call, wait while held, then check auth and injected failures.
    async fn admit(&self, token: &str, call: Call) -> Result<(), ApiError> {
        let kind = call.kind();
        self.calls.lock().push(call);

        let mut rx = self.held.subscribe();
        if rx.wait_for(|held| !*held).await.is_err() {
            return Err(ApiError::Network("loopback backend shut down".to_string()));
        }

        if token.is_empty() {
            return Err(ApiError::Status {
                status: 401,
                body: "missing bearer token".to_string(),
            });
        }
        self.state.lock().check(kind)
    }
}

impl Backend for LoopbackBackend {
    async fn fetch_me(&self, token: &str) -> Result<UserRecord, ApiError> {
        self.admit(token, Call::Me).await?;
        let state = self.state.lock();
        Ok(UserRecord {
            id: state.user.id.clone(),
            email: Some(state.email.clone()),
            full_name: Some(state.user.full_name.clone()),
        })
    }

    async fn fetch_profile(&self, token: &str) -> Result<Profile, ApiError> {
        self.admit(token, Call::Profile).await?;
        let state = self.state.lock();
        Ok(Profile {
            full_name: state.user.full_name.clone(),
            avatar_url: state.user.avatar_url.clone(),
        })
    }

    async fn fetch_chats(&self, token: &str) -> Result<Vec<Chat>, ApiError> {
        self.admit(token, Call::ListChats).await?;
        Ok(self.state.lock().chats.clone())
    }

    async fn create_or_get_chat(&self, token: &str, item_id: &ItemId) -> Result<Chat, ApiError> {
        self.admit(
            token,
            Call::CreateChat {
                item_id: item_id.clone(),
            },
        )
        .await?;

        let mut state = self.state.lock();
        if let Some(existing) = state.chats.iter().find(|c| c.item_id == *item_id) {
            return Ok(existing.clone());
        }
        let now = chrono::Utc::now().to_rfc3339();
        let chat = Chat {
            id: ChatId::new(state.next_id("chat_")),
            item_id: item_id.clone(),
            item_title: None,
            item_image: None,
            other_user: None,
            last_message: None,
            created_at: now.clone(),
            updated_at: now,
        };
        state.chats.push(chat.clone());
        Ok(chat)
    }

    async fn fetch_messages(
        &self,
        token: &str,
        chat_id: &ChatId,
        after: Option<&MessageId>,
    ) -> Result<Vec<ChatMessage>, ApiError> {
        self.admit(
            token,
            Call::ListMessages {
                chat_id: chat_id.clone(),
                after: after.cloned(),
            },
        )
        .await?;

        let state = self.state.lock();
        if !state.chats.iter().any(|c| c.id == *chat_id) {
            return Err(ApiError::Status {
                status: 404,
                body: format!("chat {chat_id} not found"),
            });
        }
        let stored = state.messages.get(chat_id).map_or(&[][..], Vec::as_slice);
        let start = after
            .and_then(|cursor| stored.iter().position(|m| m.id == *cursor))
            .map_or(0, |pos| if state.inclusive_cursor { pos } else { pos + 1 });
        Ok(stored[start..].to_vec())
    }

    async fn send_message(
        &self,
        token: &str,
        chat_id: &ChatId,
        request: &SendMessageRequest,
    ) -> Result<ChatMessage, ApiError> {
        self.admit(
            token,
            Call::SendMessage {
                chat_id: chat_id.clone(),
                content: request.content().to_string(),
            },
        )
        .await?;

        let mut state = self.state.lock();
        if !state.chats.iter().any(|c| c.id == *chat_id) {
            return Err(ApiError::Status {
                status: 404,
                body: format!("chat {chat_id} not found"),
            });
        }
        let sender = state.user.clone();
        Ok(state.store_message(chat_id, sender, request.content()))
    }
}
