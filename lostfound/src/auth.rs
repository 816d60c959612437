//! Identity provider seam.
//!
//! Defines the [`TokenProvider`] trait through which the core obtains
//! short-lived bearer tokens from the third-party auth provider, a settable
//! [`StaticTokenProvider`], and the [`DomainPolicy`] that restricts which
//! e-mail domains may use the service.

use lostfound_proto::model::Identity;

/// Default allowed e-mail domain for campus accounts.
pub const DEFAULT_ALLOWED_DOMAIN: &str = "hcmut.edu.vn";

/// Errors that can occur while obtaining a token.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// The provider could not be reached or refused to issue a token.
    #[error("token provider unavailable: {0}")]
    Unavailable(String),

    /// The session has expired and the user must sign in again.
    #[error("session expired")]
    SessionExpired,
}

/// Issues bearer tokens for the currently authenticated identity.
///
/// `Ok(None)` means "not yet": the identity is not ready or there is no
/// signed-in user. Callers treat it as a silent no-op, never as an error.
pub trait TokenProvider: Send + Sync {
    /// Fetch a fresh bearer token.
    fn get_token(
        &self,
    ) -> impl std::future::Future<Output = Result<Option<String>, TokenError>> + Send;
}

/// Token provider backed by a token held in memory.
///
/// Used by the command-line client (token from config or environment) and
/// by tests, which flip it between present and absent.
pub struct StaticTokenProvider {
    token: parking_lot::RwLock<Option<String>>,
}

impl StaticTokenProvider {
    /// Create a provider holding `token`.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: parking_lot::RwLock::new(Some(token.into())),
        }
    }

    /// Create a provider that has no token yet.
    #[must_use]
    pub fn signed_out() -> Self {
        Self {
            token: parking_lot::RwLock::new(None),
        }
    }

    /// Replace the held token.
    pub fn set_token(&self, token: impl Into<String>) {
        *self.token.write() = Some(token.into());
    }

    /// Forget the held token.
    pub fn clear(&self) {
        *self.token.write() = None;
    }
}

impl TokenProvider for StaticTokenProvider {
    async fn get_token(&self) -> Result<Option<String>, TokenError> {
        Ok(self.token.read().clone())
    }
}

/// Restricts sign-in to a set of e-mail domains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainPolicy {
    allowed: Vec<String>,
}

impl DomainPolicy {
    /// Allow only the given domains (case-insensitive). An empty list allows
    /// every identity.
    pub fn new<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            allowed: domains
                .into_iter()
                .map(|d| d.as_ref().trim().to_ascii_lowercase())
                .filter(|d| !d.is_empty())
                .collect(),
        }
    }

    /// A policy that accepts every identity.
    #[must_use]
    pub const fn allow_all() -> Self {
        Self {
            allowed: Vec::new(),
        }
    }

    /// Returns the allowed domains.
    #[must_use]
    pub fn domains(&self) -> &[String] {
        &self.allowed
    }

    /// Whether `identity` may use the service.
    ///
    /// An identity without an e-mail address has no domain to check and is
    /// permitted; only a present address outside the allowed domains is
    /// rejected.
    #[must_use]
    pub fn permits(&self, identity: &Identity) -> bool {
        if self.allowed.is_empty() || identity.email.trim().is_empty() {
            return true;
        }
        identity
            .email_domain()
            .is_some_and(|domain| self.allowed.iter().any(|d| *d == domain))
    }
}

impl Default for DomainPolicy {
    fn default() -> Self {
        Self::new([DEFAULT_ALLOWED_DOMAIN])
    }
}
