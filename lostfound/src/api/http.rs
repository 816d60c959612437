//! REST backend client.
//!
//! Implements the [`Backend`] trait over HTTPS with `reqwest`. Every request
//! carries `Authorization: Bearer <token>`. Non-2xx responses are mapped to
//! [`ApiError::Status`] with the body read as text for diagnostics; 2xx
//! bodies are decoded as JSON.

use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use serde::de::DeserializeOwned;
use url::Url;

use lostfound_proto::model::{
    Chat, ChatId, ChatMessage, CreateChatRequest, ItemId, MessageId, Profile, SendMessageRequest,
    UserRecord,
};
use lostfound_proto::route::{Method, Route};

use super::{ApiError, Backend};

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Backend client speaking JSON over HTTP(S).
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpBackend {
    /// Create a client for the backend rooted at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidUrl`] if `base_url` does not parse or cannot
    /// carry a path, and [`ApiError::Network`] if the HTTP client cannot be
    /// built (e.g. TLS backend initialization failure).
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let parsed =
            Url::parse(base_url).map_err(|e| ApiError::InvalidUrl(format!("{base_url}: {e}")))?;
        if parsed.cannot_be_a_base() {
            return Err(ApiError::InvalidUrl(format!(
                "{base_url}: cannot carry a path"
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: parsed,
        })
    }

    /// Return the base URL requests are resolved against.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve a route against the base URL, percent-encoding each segment.
    fn url_for(&self, route: &Route<'_>) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| ApiError::InvalidUrl(self.base_url.to_string()))?;
            segments.pop_if_empty().extend(route.segments());
        }
        if let Some((key, value)) = route.query() {
            url.query_pairs_mut().append_pair(key, value);
        }
        Ok(url)
    }

    fn request(&self, route: &Route<'_>, token: &str) -> Result<reqwest::RequestBuilder, ApiError> {
        let url = self.url_for(route)?;
        let builder = match route.method() {
            Method::Get => self.client.get(url),
            Method::Post => self.client.post(url),
        };
        Ok(builder
            .bearer_auth(token)
            .header(CONTENT_TYPE, "application/json"))
    }

    async fn execute<T: DeserializeOwned>(
        route: &Route<'_>,
        builder: reqwest::RequestBuilder,
    ) -> Result<T, ApiError> {
        let response = builder.send().await.map_err(|e| {
            tracing::debug!(%route, err = %e, "backend request failed before a response");
            ApiError::Network(e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::debug!(%route, status = status.as_u16(), "backend returned an error status");
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }
}

impl Backend for HttpBackend {
    async fn fetch_me(&self, token: &str) -> Result<UserRecord, ApiError> {
        let route = Route::Me;
        let builder = self.request(&route, token)?;
        Self::execute(&route, builder).await
    }

    async fn fetch_profile(&self, token: &str) -> Result<Profile, ApiError> {
        let route = Route::Profile;
        let builder = self.request(&route, token)?;
        Self::execute(&route, builder).await
    }

    async fn fetch_chats(&self, token: &str) -> Result<Vec<Chat>, ApiError> {
        let route = Route::ListChats;
        let builder = self.request(&route, token)?;
        Self::execute(&route, builder).await
    }

    async fn create_or_get_chat(&self, token: &str, item_id: &ItemId) -> Result<Chat, ApiError> {
        let route = Route::CreateChat;
        let body = CreateChatRequest {
            item_id: item_id.clone(),
        };
        let builder = self.request(&route, token)?.json(&body);
        Self::execute(&route, builder).await
    }

    async fn fetch_messages(
        &self,
        token: &str,
        chat_id: &ChatId,
        after: Option<&MessageId>,
    ) -> Result<Vec<ChatMessage>, ApiError> {
        let route = Route::ListMessages { chat_id, after };
        let builder = self.request(&route, token)?;
        Self::execute(&route, builder).await
    }

    async fn send_message(
        &self,
        token: &str,
        chat_id: &ChatId,
        request: &SendMessageRequest,
    ) -> Result<ChatMessage, ApiError> {
        let route = Route::SendMessage { chat_id };
        let builder = self.request(&route, token)?.json(request);
        Self::execute(&route, builder).await
    }
}
