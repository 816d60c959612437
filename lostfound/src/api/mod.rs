//! Backend API abstraction.
//!
//! Defines the [`Backend`] trait that every backend client must satisfy.
//! Concrete implementations:
//! - [`http::HttpBackend`]: REST client over HTTPS
//! - [`loopback::LoopbackBackend`]: in-process backend for testing

pub mod http;
pub mod loopback;

use lostfound_proto::model::{
    Chat, ChatId, ChatMessage, ItemId, MessageId, Profile, SendMessageRequest, UserRecord,
};

/// Errors that can occur while talking to the backend.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The backend answered with a non-2xx status.
    #[error("backend returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body read as text, for diagnostics.
        body: String,
    },

    /// The request never produced a response (DNS, connect, TLS, timeout).
    #[error("network error: {0}")]
    Network(String),

    /// A 2xx response body could not be decoded.
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// The configured base URL cannot carry API paths.
    #[error("invalid base URL: {0}")]
    InvalidUrl(String),
}

impl ApiError {
    /// Whether the backend rejected the bearer token.
    #[must_use]
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Status { status: 401 | 403, .. })
    }
}

/// Async client for the lost-and-found backend.
///
/// Every operation carries the caller's bearer token; implementations never
/// cache or refresh tokens themselves.
pub trait Backend: Send + Sync {
    /// `GET /api/me`: materialize or verify the backend user record.
    fn fetch_me(
        &self,
        token: &str,
    ) -> impl std::future::Future<Output = Result<UserRecord, ApiError>> + Send;

    /// `GET /api/profile`: the current user's profile.
    fn fetch_profile(
        &self,
        token: &str,
    ) -> impl std::future::Future<Output = Result<Profile, ApiError>> + Send;

    /// `GET /api/chats`: conversations of the current user, in backend order.
    fn fetch_chats(
        &self,
        token: &str,
    ) -> impl std::future::Future<Output = Result<Vec<Chat>, ApiError>> + Send;

    /// `POST /api/chats`: create the conversation for an item, or return the
    /// existing one.
    fn create_or_get_chat(
        &self,
        token: &str,
        item_id: &ItemId,
    ) -> impl std::future::Future<Output = Result<Chat, ApiError>> + Send;

    /// `GET /api/chats/{chatId}/messages`: messages of a conversation.
    ///
    /// With `after = None` the full history is returned; otherwise only
    /// messages newer than the cursor.
    fn fetch_messages(
        &self,
        token: &str,
        chat_id: &ChatId,
        after: Option<&MessageId>,
    ) -> impl std::future::Future<Output = Result<Vec<ChatMessage>, ApiError>> + Send;

    /// `POST /api/chats/{chatId}/messages`: send a message and return the
    /// stored server copy.
    fn send_message(
        &self,
        token: &str,
        chat_id: &ChatId,
        request: &SendMessageRequest,
    ) -> impl std::future::Future<Output = Result<ChatMessage, ApiError>> + Send;
}
