//! Route table for the backend REST API.
//!
//! Every route is authenticated with a bearer token. A [`Route`] knows its
//! HTTP method, its path segments (unencoded; the transport is responsible for
//! percent-encoding), and its optional query parameter.

use std::fmt;

use crate::model::{ChatId, MessageId};

/// HTTP method used by a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => write!(f, "GET"),
            Self::Post => write!(f, "POST"),
        }
    }
}

/// A backend endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route<'a> {
    /// `GET /api/me`: materialize or verify the backend user record.
    Me,
    /// `GET /api/profile`: the current user's profile.
    Profile,
    /// `GET /api/chats`: conversations of the current user.
    ListChats,
    /// `POST /api/chats`: create or get the conversation for an item.
    CreateChat,
    /// `GET /api/chats/{chatId}/messages[?after={id}]`.
    ListMessages {
        chat_id: &'a ChatId,
        after: Option<&'a MessageId>,
    },
    /// `POST /api/chats/{chatId}/messages`.
    SendMessage { chat_id: &'a ChatId },
}

impl<'a> Route<'a> {
    /// Returns the HTTP method for this route.
    #[must_use]
    pub const fn method(&self) -> Method {
        match self {
            Self::Me | Self::Profile | Self::ListChats | Self::ListMessages { .. } => Method::Get,
            Self::CreateChat | Self::SendMessage { .. } => Method::Post,
        }
    }

    /// Returns the unencoded path segments, starting after the base URL.
    #[must_use]
    pub fn segments(&self) -> Vec<&'a str> {
        match *self {
            Self::Me => vec!["api", "me"],
            Self::Profile => vec!["api", "profile"],
            Self::ListChats | Self::CreateChat => vec!["api", "chats"],
            Self::ListMessages { chat_id, .. } | Self::SendMessage { chat_id } => {
                vec!["api", "chats", chat_id.as_str(), "messages"]
            }
        }
    }

    /// Returns the query parameter, if this route carries one.
    #[must_use]
    pub fn query(&self) -> Option<(&'static str, &'a str)> {
        match *self {
            Self::ListMessages {
                after: Some(after), ..
            } => Some(("after", after.as_str())),
            _ => None,
        }
    }
}

impl fmt::Display for Route<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ", self.method())?;
        for segment in self.segments() {
            write!(f, "/{segment}")?;
        }
        if let Some((key, value)) = self.query() {
            write!(f, "?{key}={value}")?;
        }
        Ok(())
    }
}
