//! JSON model for the lost-and-found backend.
//!
//! Field names follow the backend's camelCase convention. Optional fields
//! accept both a missing key and an explicit `null`. Timestamps are kept as
//! the backend's ISO-8601 strings; parsing happens at display time.

use serde::{Deserialize, Serialize};

/// Maximum allowed message content size in bytes (64 KB).
pub const MAX_CONTENT_SIZE: usize = 64 * 1024;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wraps a backend-issued identifier.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }
    };
}

string_id!(
    /// Identifier of a user, shared by the auth provider and the backend.
    UserId
);
string_id!(
    /// Identifier of a conversation.
    ChatId
);
string_id!(
    /// Identifier of a chat message. Doubles as the polling cursor.
    MessageId
);
string_id!(
    /// Identifier of a lost or found item listing.
    ItemId
);

/// The authenticated end-user as known to the auth provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Provider-issued user id.
    pub id: UserId,
    /// Primary e-mail address.
    pub email: String,
    /// Human-readable name.
    pub display_name: String,
}

impl Identity {
    /// Creates an identity from its parts.
    pub fn new(
        id: impl Into<String>,
        email: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            id: UserId::new(id),
            email: email.into(),
            display_name: display_name.into(),
        }
    }

    /// Returns the lowercase domain part of the e-mail address, if any.
    #[must_use]
    pub fn email_domain(&self) -> Option<String> {
        let (_, domain) = self.email.rsplit_once('@')?;
        if domain.is_empty() {
            None
        } else {
            Some(domain.to_ascii_lowercase())
        }
    }
}

/// The backend's user record, returned by `GET /api/me`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    /// Backend user id (same value as the provider id).
    pub id: UserId,
    /// E-mail address, when the backend stores one.
    #[serde(default)]
    pub email: Option<String>,
    /// Full name, when the backend stores one.
    #[serde(default)]
    pub full_name: Option<String>,
}

/// Profile shown on the profile tab, returned by `GET /api/profile`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    /// Full name.
    #[serde(default)]
    pub full_name: String,
    /// Avatar image URL.
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// A participant as embedded in chats and messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: UserId,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// Preview of the most recent message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastMessage {
    pub id: MessageId,
    pub content: String,
    #[serde(default)]
    pub created_at: String,
}

/// A conversation about one item between two participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: ChatId,
    pub item_id: ItemId,
    #[serde(default)]
    pub item_title: Option<String>,
    #[serde(default)]
    pub item_image: Option<String>,
    #[serde(default)]
    pub other_user: Option<UserSummary>,
    #[serde(default)]
    pub last_message: Option<LastMessage>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: MessageId,
    pub chat_id: ChatId,
    pub sender_id: UserId,
    pub content: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub sender: Option<UserSummary>,
}

/// Body of `POST /api/chats`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateChatRequest {
    pub item_id: ItemId,
}

/// Body of `POST /api/chats/{chatId}/messages`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessageRequest {
    content: String,
}

/// Error returned when outgoing message content fails validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Content is empty after trimming.
    #[error("message content is empty")]
    Empty,
    /// Content exceeds the maximum allowed size.
    #[error("message too large ({size} bytes, max {max} bytes)")]
    TooLarge {
        /// Actual size of the trimmed content in bytes.
        size: usize,
        /// Maximum allowed size in bytes.
        max: usize,
    },
}

impl SendMessageRequest {
    /// Builds a send request from raw composer text.
    ///
    /// Surrounding whitespace is trimmed before validation.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::Empty`] if nothing remains after trimming,
    /// or [`ValidationError::TooLarge`] if the content exceeds
    /// [`MAX_CONTENT_SIZE`].
    pub fn new(raw: &str) -> Result<Self, ValidationError> {
        let content = raw.trim();
        if content.is_empty() {
            return Err(ValidationError::Empty);
        }
        if content.len() > MAX_CONTENT_SIZE {
            return Err(ValidationError::TooLarge {
                size: content.len(),
                max: MAX_CONTENT_SIZE,
            });
        }
        Ok(Self {
            content: content.to_string(),
        })
    }

    /// Returns the trimmed content.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }
}
