//! Identity-to-backend synchronization.
//!
//! [`IdentitySync`] makes sure the backend holds a user record for the
//! currently authenticated identity. It calls `GET /api/me` once per identity
//! transition: after a confirmed 2xx for identity A, further triggers for A
//! make no network call, and a switch to identity B syncs again.
//!
//! Triggers arrive from anywhere the identity may have changed (sign-in,
//! screen focus, re-render). At most one sync runs at a time; a trigger that
//! arrives while one is in flight is dropped. Failures are logged and leave
//! the last-synced identity unchanged, so the next trigger retries.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use lostfound_proto::model::{Identity, UserId};

use crate::api::Backend;
use crate::auth::{DomainPolicy, TokenProvider};
use crate::guard::InFlightGuard;

/// What a call to [`IdentitySync::on_identity`] did.
///
/// Reported for logging and tests; none of these are shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The backend confirmed the identity.
    Synced,
    /// The identity was already synced; no call was made.
    AlreadySynced,
    /// Another sync was in flight; no call was made.
    InFlight,
    /// No identity is signed in.
    NoIdentity,
    /// The identity's e-mail domain is not allowed. The caller should sign
    /// the user out.
    Rejected,
    /// No token was available; retried on the next trigger.
    TokenUnavailable,
    /// The backend call failed; retried on the next trigger.
    Failed,
}

/// Snapshot of the sync state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SyncState {
    /// Identity confirmed by the last successful sync.
    pub last_synced: Option<UserId>,
    /// Whether a sync is currently running.
    pub in_flight: bool,
}

/// Receives the identity after each confirmed sync.
///
/// Used to attach the user to error-reporting context. Called inline, so
/// implementations must not block.
pub trait IdentityObserver: Send + Sync {
    /// The backend confirmed `identity`.
    fn identity_synced(&self, identity: &Identity);
}

/// Default observer: records the identity as a structured log event.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogObserver;

impl IdentityObserver for LogObserver {
    fn identity_synced(&self, identity: &Identity) {
        tracing::info!(
            user_id = %identity.id,
            email = %identity.email,
            "user attached to diagnostics context"
        );
    }
}

/// Syncs the authenticated identity with the backend user record.
pub struct IdentitySync<B, T> {
    backend: Arc<B>,
    tokens: Arc<T>,
    policy: DomainPolicy,
    observer: Box<dyn IdentityObserver>,
    last_synced: parking_lot::Mutex<Option<UserId>>,
    in_flight: AtomicBool,
}

impl<B: Backend, T: TokenProvider> IdentitySync<B, T> {
    /// Create a sync component with the default [`LogObserver`].
    #[must_use]
    pub fn new(backend: Arc<B>, tokens: Arc<T>, policy: DomainPolicy) -> Self {
        Self {
            backend,
            tokens,
            policy,
            observer: Box::new(LogObserver),
            last_synced: parking_lot::Mutex::new(None),
            in_flight: AtomicBool::new(false),
        }
    }

    /// Replace the observer notified after each confirmed sync.
    #[must_use]
    pub fn with_observer(mut self, observer: impl IdentityObserver + 'static) -> Self {
        self.observer = Box::new(observer);
        self
    }

    /// Handle an identity trigger.
    ///
    /// `None` means nobody is signed in. See [`SyncOutcome`] for the possible
    /// results.
    pub async fn on_identity(&self, identity: Option<&Identity>) -> SyncOutcome {
        let Some(identity) = identity else {
            return SyncOutcome::NoIdentity;
        };

        if !self.policy.permits(identity) {
            tracing::warn!(
                user_id = %identity.id,
                domain = identity.email_domain().as_deref().unwrap_or(""),
                "identity outside allowed domains, not syncing"
            );
            return SyncOutcome::Rejected;
        }

        if self.is_synced(&identity.id) {
            return SyncOutcome::AlreadySynced;
        }

        let Some(_in_flight) = InFlightGuard::try_acquire(&self.in_flight) else {
            tracing::debug!(user_id = %identity.id, "identity sync already in flight");
            return SyncOutcome::InFlight;
        };

        // A sync that finished between the check above and the acquire may
        // already cover this identity.
        if self.is_synced(&identity.id) {
            return SyncOutcome::AlreadySynced;
        }

        let token = match self.tokens.get_token().await {
            Ok(Some(token)) => token,
            Ok(None) => {
                tracing::debug!(user_id = %identity.id, "no token yet, deferring identity sync");
                return SyncOutcome::TokenUnavailable;
            }
            Err(e) => {
                tracing::warn!(user_id = %identity.id, err = %e, "token fetch failed");
                return SyncOutcome::TokenUnavailable;
            }
        };

        match self.backend.fetch_me(&token).await {
            Ok(record) => {
                if record.id != identity.id {
                    tracing::debug!(
                        user_id = %identity.id,
                        backend_id = %record.id,
                        "backend user id differs from provider id"
                    );
                }
                *self.last_synced.lock() = Some(identity.id.clone());
                tracing::info!(user_id = %identity.id, "identity synced");
                self.observer.identity_synced(identity);
                SyncOutcome::Synced
            }
            Err(e) => {
                tracing::warn!(user_id = %identity.id, err = %e, "identity sync failed");
                SyncOutcome::Failed
            }
        }
    }

    /// Forget the last synced identity, e.g. on sign-out.
    pub fn reset(&self) {
        *self.last_synced.lock() = None;
    }

    /// Current state snapshot.
    #[must_use]
    pub fn state(&self) -> SyncState {
        SyncState {
            last_synced: self.last_synced.lock().clone(),
            in_flight: self.in_flight.load(Ordering::Acquire),
        }
    }

    /// Allowed-domain policy in force.
    #[must_use]
    pub const fn policy(&self) -> &DomainPolicy {
        &self.policy
    }

    fn is_synced(&self, id: &UserId) -> bool {
        self.last_synced.lock().as_ref() == Some(id)
    }
}
