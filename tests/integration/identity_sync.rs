//! Integration tests for identity synchronization.
//!
//! Drives `IdentitySync` against the loopback backend and checks that the
//! backend user record is requested once per identity transition, never
//! concurrently, and retried after failures.
//!
//! Run with: `cargo test --test identity_sync`

use std::sync::Arc;
use std::time::Duration;

use lostfound::api::loopback::{LoopbackBackend, RouteKind};
use lostfound::auth::{DomainPolicy, StaticTokenProvider};
use lostfound::sync::{IdentitySync, SyncOutcome};
use lostfound_proto::model::{Identity, UserId};

// =============================================================================
// Test helpers
// =============================================================================

fn alice() -> Identity {
    Identity::new("user_alice", "alice@hcmut.edu.vn", "Alice")
}

fn bob() -> Identity {
    Identity::new("user_bob", "bob@hcmut.edu.vn", "Bob")
}

fn setup() -> (
    Arc<LoopbackBackend>,
    Arc<StaticTokenProvider>,
    IdentitySync<LoopbackBackend, StaticTokenProvider>,
) {
    let backend = Arc::new(LoopbackBackend::new(&alice()));
    let tokens = Arc::new(StaticTokenProvider::new("token-alice"));
    let sync = IdentitySync::new(
        Arc::clone(&backend),
        Arc::clone(&tokens),
        DomainPolicy::default(),
    );
    (backend, tokens, sync)
}

// =============================================================================
// Once per identity
// =============================================================================

#[tokio::test]
async fn syncs_once_per_identity() {
    let (backend, _tokens, sync) = setup();
    let a = alice();

    assert_eq!(sync.on_identity(Some(&a)).await, SyncOutcome::Synced);
    for _ in 0..3 {
        assert_eq!(sync.on_identity(Some(&a)).await, SyncOutcome::AlreadySynced);
    }
    assert_eq!(backend.count(RouteKind::Me), 1);
    assert_eq!(sync.state().last_synced, Some(UserId::new("user_alice")));
}

#[tokio::test]
async fn switching_identity_syncs_exactly_once_more() {
    let (backend, _tokens, sync) = setup();
    let (a, b) = (alice(), bob());

    sync.on_identity(Some(&a)).await;
    assert_eq!(sync.on_identity(Some(&b)).await, SyncOutcome::Synced);
    assert_eq!(sync.on_identity(Some(&b)).await, SyncOutcome::AlreadySynced);

    assert_eq!(backend.count(RouteKind::Me), 2);
    assert_eq!(sync.state().last_synced, Some(UserId::new("user_bob")));
}

#[tokio::test]
async fn sign_out_then_in_does_not_resync_same_identity() {
    let (backend, _tokens, sync) = setup();
    let a = alice();

    sync.on_identity(Some(&a)).await;
    assert_eq!(sync.on_identity(None).await, SyncOutcome::NoIdentity);
    assert_eq!(sync.on_identity(Some(&a)).await, SyncOutcome::AlreadySynced);
    assert_eq!(backend.count(RouteKind::Me), 1);
}

// =============================================================================
// Re-entrancy
// =============================================================================

#[tokio::test]
async fn rapid_triggers_make_one_call() {
    let (backend, _tokens, sync) = setup();
    let a = alice();
    backend.hold();

    let first = sync.on_identity(Some(&a));
    let second = async {
        while backend.count(RouteKind::Me) == 0 {
            tokio::task::yield_now().await;
        }
        assert!(sync.state().in_flight);
        let outcome = sync.on_identity(Some(&a)).await;
        backend.release();
        outcome
    };
    let (first, second) = tokio::join!(first, second);

    assert_eq!(first, SyncOutcome::Synced);
    assert_eq!(second, SyncOutcome::InFlight);
    assert_eq!(backend.count(RouteKind::Me), 1);
    assert!(!sync.state().in_flight);
}

#[tokio::test(start_paused = true)]
async fn cancelled_sync_releases_in_flight_flag() {
    let (backend, _tokens, sync) = setup();
    let a = alice();
    backend.hold();

    let result = tokio::time::timeout(Duration::from_secs(1), sync.on_identity(Some(&a))).await;
    assert!(result.is_err(), "held sync should time out");
    assert!(!sync.state().in_flight);
    assert!(sync.state().last_synced.is_none());

    backend.release();
    assert_eq!(sync.on_identity(Some(&a)).await, SyncOutcome::Synced);
    assert_eq!(backend.count(RouteKind::Me), 2);
}

// =============================================================================
// Failures and retries
// =============================================================================

#[tokio::test]
async fn token_arrives_later() {
    let (backend, tokens, sync) = setup();
    let a = alice();
    tokens.clear();

    assert_eq!(
        sync.on_identity(Some(&a)).await,
        SyncOutcome::TokenUnavailable
    );
    assert_eq!(backend.count(RouteKind::Me), 0);

    tokens.set_token("token-alice");
    assert_eq!(sync.on_identity(Some(&a)).await, SyncOutcome::Synced);
    assert_eq!(backend.count(RouteKind::Me), 1);
}

#[tokio::test]
async fn backend_failure_is_retried_on_next_trigger() {
    let (backend, _tokens, sync) = setup();
    let a = alice();
    backend.fail(RouteKind::Me, 503);

    assert_eq!(sync.on_identity(Some(&a)).await, SyncOutcome::Failed);
    assert_eq!(sync.on_identity(Some(&a)).await, SyncOutcome::Failed);
    assert!(sync.state().last_synced.is_none());

    backend.recover(RouteKind::Me);
    assert_eq!(sync.on_identity(Some(&a)).await, SyncOutcome::Synced);
    assert_eq!(backend.count(RouteKind::Me), 3);
}

#[tokio::test]
async fn rejected_token_counts_as_failure() {
    let (backend, tokens, sync) = setup();
    let a = alice();
    tokens.set_token("");

    assert_eq!(sync.on_identity(Some(&a)).await, SyncOutcome::Failed);
    assert_eq!(backend.count(RouteKind::Me), 1);
    assert!(sync.state().last_synced.is_none());
}

// =============================================================================
// Domain policy
// =============================================================================

#[tokio::test]
async fn outside_domain_is_rejected_and_never_synced() {
    let (backend, _tokens, sync) = setup();
    let outsider = Identity::new("user_eve", "eve@gmail.com", "Eve");

    for _ in 0..2 {
        assert_eq!(
            sync.on_identity(Some(&outsider)).await,
            SyncOutcome::Rejected
        );
    }
    assert_eq!(backend.count(RouteKind::Me), 0);
}

#[tokio::test]
async fn domain_match_ignores_case() {
    let (backend, _tokens, sync) = setup();
    let shouting = Identity::new("user_alice", "ALICE@HCMUT.EDU.VN", "Alice");
    assert_eq!(sync.on_identity(Some(&shouting)).await, SyncOutcome::Synced);
    assert_eq!(backend.count(RouteKind::Me), 1);
}

#[tokio::test]
async fn identity_without_email_is_synced_under_default_policy() {
    let (backend, _tokens, sync) = setup();
    let no_email = Identity::new("user_alice", "", "Alice");
    assert_eq!(sync.on_identity(Some(&no_email)).await, SyncOutcome::Synced);
    assert_eq!(sync.on_identity(Some(&no_email)).await, SyncOutcome::AlreadySynced);
    assert_eq!(backend.count(RouteKind::Me), 1);
}

#[tokio::test]
async fn open_policy_accepts_any_domain() {
    let backend = Arc::new(LoopbackBackend::new(&alice()));
    let sync = IdentitySync::new(
        Arc::clone(&backend),
        Arc::new(StaticTokenProvider::new("t")),
        DomainPolicy::allow_all(),
    );
    let outsider = Identity::new("user_eve", "eve@gmail.com", "Eve");
    assert_eq!(sync.on_identity(Some(&outsider)).await, SyncOutcome::Synced);
}
