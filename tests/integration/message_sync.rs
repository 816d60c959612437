//! Integration tests for message synchronization.
//!
//! Runs `MessageSyncEngine` against the loopback backend with tokio's paused
//! clock, so poll ticks are driven by advancing virtual time.
//!
//! Run with: `cargo test --test message_sync`

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use lostfound::api::loopback::{Call, LoopbackBackend, RouteKind};
use lostfound::auth::StaticTokenProvider;
use lostfound::chat::{
    EngineConfig, EngineEvent, MessageSyncEngine, Phase, PollOutcome, SendError,
};
use lostfound_proto::model::{Chat, ChatId, Identity, MessageId, UserSummary};

type Engine = MessageSyncEngine<LoopbackBackend, StaticTokenProvider>;

// =============================================================================
// Test helpers
// =============================================================================

/// Lets spawned work settle without reaching the next poll tick.
const SETTLE: Duration = Duration::from_millis(50);

/// One poll interval plus settle time.
const ONE_TICK: Duration = Duration::from_millis(2050);

fn me() -> Identity {
    Identity::new("user_me", "me@hcmut.edu.vn", "Me")
}

fn peer() -> UserSummary {
    UserSummary {
        id: "user_peer".into(),
        full_name: "Trần Bình".to_string(),
        avatar_url: None,
    }
}

fn chat(id: &str) -> Chat {
    Chat {
        id: id.into(),
        item_id: format!("item_{id}").as_str().into(),
        item_title: Some("Balo đen".to_string()),
        item_image: None,
        other_user: Some(peer()),
        last_message: None,
        created_at: String::new(),
        updated_at: String::new(),
    }
}

fn setup_with(
    tokens: StaticTokenProvider,
) -> (Arc<LoopbackBackend>, Engine, mpsc::Receiver<EngineEvent>) {
    let backend = Arc::new(LoopbackBackend::new(&me()));
    backend.insert_chat(chat("c1"));
    backend.insert_chat(chat("c2"));
    let (engine, events) = MessageSyncEngine::new(
        Arc::clone(&backend),
        Arc::new(tokens),
        EngineConfig::default(),
    );
    (backend, engine, events)
}

fn setup() -> (Arc<LoopbackBackend>, Engine, mpsc::Receiver<EngineEvent>) {
    setup_with(StaticTokenProvider::new("tok"))
}

fn ids(engine: &Engine) -> Vec<String> {
    engine.messages().iter().map(|m| m.id.to_string()).collect()
}

fn message_fetches(backend: &LoopbackBackend) -> Vec<Option<MessageId>> {
    backend
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            Call::ListMessages { after, .. } => Some(after),
            _ => None,
        })
        .collect()
}

// =============================================================================
// Initial load and polling
// =============================================================================

#[tokio::test(start_paused = true)]
async fn initial_load_then_polls_with_tail_cursor() {
    let (backend, engine, _events) = setup();
    let c1 = ChatId::new("c1");
    let m1 = backend.post_message(&c1, &peer(), "Mình nhặt được balo của bạn");

    engine.select(c1.clone());
    assert_eq!(engine.phase(), Phase::Loading);
    tokio::time::sleep(SETTLE).await;
    assert_eq!(engine.phase(), Phase::Polling);
    assert_eq!(ids(&engine), [m1.id.to_string()]);

    tokio::time::sleep(ONE_TICK).await;
    assert_eq!(message_fetches(&backend), [None, Some(m1.id.clone())]);
}

#[tokio::test(start_paused = true)]
async fn overlapping_window_does_not_duplicate() {
    let (backend, engine, _events) = setup();
    let c1 = ChatId::new("c1");
    let m1 = backend.post_message(&c1, &peer(), "first");

    engine.select(c1.clone());
    tokio::time::sleep(SETTLE).await;

    backend.set_inclusive_cursor(true);
    let m2 = backend.post_message(&c1, &peer(), "second");
    tokio::time::sleep(ONE_TICK).await;

    assert_eq!(ids(&engine), [m1.id.to_string(), m2.id.to_string()]);

    // The same window again appends nothing.
    tokio::time::sleep(ONE_TICK).await;
    assert_eq!(engine.messages().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn failed_initial_load_recovers_on_first_poll() {
    let (backend, engine, _events) = setup();
    let c1 = ChatId::new("c1");
    backend.post_message(&c1, &peer(), "a");
    backend.post_message(&c1, &peer(), "b");
    backend.fail(RouteKind::ListMessages, 500);

    engine.select(c1);
    tokio::time::sleep(SETTLE).await;
    assert!(engine.messages().is_empty());
    assert_eq!(engine.phase(), Phase::Polling);

    backend.recover(RouteKind::ListMessages);
    tokio::time::sleep(ONE_TICK).await;
    assert_eq!(engine.messages().len(), 2);
    assert_eq!(message_fetches(&backend), [None, None]);
}

#[tokio::test(start_paused = true)]
async fn poll_failure_keeps_messages_and_retries_next_tick() {
    let (backend, engine, _events) = setup();
    let c1 = ChatId::new("c1");
    backend.post_message(&c1, &peer(), "a");
    engine.select(c1.clone());
    tokio::time::sleep(SETTLE).await;

    backend.fail(RouteKind::ListMessages, 502);
    backend.post_message(&c1, &peer(), "b");
    tokio::time::sleep(ONE_TICK).await;
    assert_eq!(engine.messages().len(), 1);

    backend.recover(RouteKind::ListMessages);
    tokio::time::sleep(ONE_TICK).await;
    assert_eq!(engine.messages().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn no_token_means_no_requests() {
    let (backend, engine, _events) = setup_with(StaticTokenProvider::signed_out());
    engine.select(ChatId::new("c1"));
    tokio::time::sleep(ONE_TICK).await;

    assert_eq!(engine.poll_now().await, PollOutcome::TokenUnavailable);
    assert!(backend.calls().is_empty());
}

// =============================================================================
// Poll mutual exclusion
// =============================================================================

#[tokio::test(start_paused = true)]
async fn tick_during_outstanding_poll_is_skipped() {
    let (backend, engine, _events) = setup();
    engine.select(ChatId::new("c1"));
    tokio::time::sleep(SETTLE).await;
    assert_eq!(backend.count(RouteKind::ListMessages), 1);

    backend.hold();
    tokio::time::sleep(ONE_TICK).await;
    assert_eq!(backend.count(RouteKind::ListMessages), 2);

    // Several intervals pass while the poll is held open.
    tokio::time::sleep(Duration::from_secs(7)).await;
    assert_eq!(engine.poll_now().await, PollOutcome::InFlight);
    assert_eq!(backend.count(RouteKind::ListMessages), 2);

    backend.release();
    tokio::time::sleep(SETTLE).await;
    assert_eq!(engine.poll_now().await, PollOutcome::Unchanged);
    assert_eq!(backend.count(RouteKind::ListMessages), 3);
}

#[tokio::test(start_paused = true)]
async fn manual_poll_waits_for_initial_load() {
    let (backend, engine, _events) = setup();
    backend.hold();
    engine.select(ChatId::new("c1"));
    tokio::time::sleep(SETTLE).await;

    assert_eq!(engine.phase(), Phase::Loading);
    assert_eq!(engine.poll_now().await, PollOutcome::NotReady);
    assert_eq!(backend.count(RouteKind::ListMessages), 1);
    backend.release();
}

// =============================================================================
// Sending
// =============================================================================

#[tokio::test(start_paused = true)]
async fn sent_message_is_not_duplicated_by_poll_echo() {
    let (backend, engine, _events) = setup();
    let c1 = ChatId::new("c1");
    backend.post_message(&c1, &peer(), "Bạn mất balo à?");
    engine.select(c1);
    tokio::time::sleep(SETTLE).await;

    // Inclusive cursor: the next poll returns the sent message again.
    backend.set_inclusive_cursor(true);
    let sent = engine.send_message("  Đúng rồi, cảm ơn bạn!  ").await.unwrap();
    assert_eq!(sent.content, "Đúng rồi, cảm ơn bạn!");
    assert_eq!(engine.messages().len(), 2);

    tokio::time::sleep(ONE_TICK).await;
    assert_eq!(message_fetches(&backend).last(), Some(&Some(sent.id.clone())));
    let messages = engine.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages.iter().filter(|m| m.id == sent.id).count(), 1);
}

#[tokio::test(start_paused = true)]
async fn blank_send_makes_no_network_call() {
    let (backend, engine, _events) = setup();
    engine.select(ChatId::new("c1"));
    tokio::time::sleep(SETTLE).await;
    let before = engine.messages();

    for blank in ["", "   ", "\n\t"] {
        assert!(matches!(
            engine.send_message(blank).await,
            Err(SendError::Invalid(_))
        ));
    }
    assert_eq!(backend.count(RouteKind::SendMessage), 0);
    assert_eq!(engine.messages(), before);
}

#[tokio::test(start_paused = true)]
async fn failed_send_leaves_sequence_unchanged() {
    let (backend, engine, _events) = setup();
    engine.select(ChatId::new("c1"));
    tokio::time::sleep(SETTLE).await;

    backend.fail(RouteKind::SendMessage, 500);
    let result = engine.send_message("hello").await;
    assert!(matches!(result, Err(SendError::Api(_))));
    assert!(engine.messages().is_empty());
    assert!(!engine.is_sending());
}

#[tokio::test(start_paused = true)]
async fn double_submit_is_rejected() {
    let (backend, engine, _events) = setup();
    engine.select(ChatId::new("c1"));
    tokio::time::sleep(SETTLE).await;
    backend.hold();

    let first = engine.send_message("one");
    let second = async {
        while backend.count(RouteKind::SendMessage) == 0 {
            tokio::task::yield_now().await;
        }
        assert!(engine.is_sending());
        let outcome = engine.send_message("one").await;
        backend.release();
        outcome
    };
    let (first, second) = tokio::join!(first, second);

    assert!(first.is_ok());
    assert!(matches!(second, Err(SendError::AlreadySending)));
    assert_eq!(backend.count(RouteKind::SendMessage), 1);
    assert_eq!(engine.messages().len(), 1);
}

// =============================================================================
// Teardown and stale responses
// =============================================================================

#[tokio::test(start_paused = true)]
async fn deselect_stops_polling() {
    let (backend, engine, _events) = setup();
    engine.select(ChatId::new("c1"));
    tokio::time::sleep(ONE_TICK).await;
    assert!(backend.count(RouteKind::ListMessages) >= 2);

    engine.deselect();
    backend.clear_calls();
    tokio::time::sleep(Duration::from_secs(20)).await;
    assert!(backend.calls().is_empty());
    assert_eq!(engine.phase(), Phase::Idle);
}

#[tokio::test(start_paused = true)]
async fn dropping_engine_stops_polling() {
    let (backend, engine, _events) = setup();
    engine.select(ChatId::new("c1"));
    tokio::time::sleep(SETTLE).await;

    drop(engine);
    backend.clear_calls();
    tokio::time::sleep(Duration::from_secs(20)).await;
    assert!(backend.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn switching_chats_polls_only_the_new_one() {
    let (backend, engine, _events) = setup();
    engine.select(ChatId::new("c1"));
    tokio::time::sleep(SETTLE).await;
    engine.select(ChatId::new("c2"));
    backend.clear_calls();

    tokio::time::sleep(Duration::from_secs(10)).await;
    let calls = backend.calls();
    assert!(!calls.is_empty());
    assert!(calls.iter().all(|call| matches!(
        call,
        Call::ListMessages { chat_id, .. } if chat_id.as_str() == "c2"
    )));
}

#[tokio::test(start_paused = true)]
async fn late_response_for_previous_chat_is_discarded() {
    let (backend, engine, _events) = setup();
    let (c1, c2) = (ChatId::new("c1"), ChatId::new("c2"));
    backend.post_message(&c1, &peer(), "for c1");
    let in_c2 = backend.post_message(&c2, &peer(), "for c2");

    // c1's initial load is held open when c2 is selected.
    backend.hold();
    engine.select(c1);
    tokio::time::sleep(SETTLE).await;
    engine.select(c2.clone());
    tokio::time::sleep(SETTLE).await;
    backend.release();
    tokio::time::sleep(SETTLE).await;

    let messages = engine.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].id, in_c2.id);
    assert!(messages.iter().all(|m| m.chat_id == c2));
}

#[tokio::test(start_paused = true)]
async fn send_to_closed_conversation_is_not_applied() {
    let (backend, engine, _events) = setup();
    engine.select(ChatId::new("c1"));
    tokio::time::sleep(SETTLE).await;
    backend.hold();

    let send = engine.send_message("late");
    let switch = async {
        while backend.count(RouteKind::SendMessage) == 0 {
            tokio::task::yield_now().await;
        }
        engine.select(ChatId::new("c2"));
        backend.release();
    };
    let (sent, ()) = tokio::join!(send, switch);

    // Stored server-side, but never shown in c2.
    let sent = sent.unwrap();
    assert_eq!(sent.chat_id.as_str(), "c1");
    tokio::time::sleep(SETTLE).await;
    assert!(engine.messages().iter().all(|m| m.id != sent.id));
}

// =============================================================================
// Events
// =============================================================================

#[tokio::test(start_paused = true)]
async fn appends_emit_event_then_delayed_scroll() {
    let (backend, engine, mut events) = setup();
    let c1 = ChatId::new("c1");
    backend.post_message(&c1, &peer(), "hello");
    engine.select(c1.clone());

    assert_eq!(
        events.recv().await,
        Some(EngineEvent::MessagesLoaded {
            chat_id: c1.clone(),
            count: 1
        })
    );
    let started = tokio::time::Instant::now();
    assert_eq!(
        events.recv().await,
        Some(EngineEvent::ScrollToEnd {
            chat_id: c1.clone()
        })
    );
    assert!(started.elapsed() >= Duration::from_millis(100));

    engine.send_message("hi").await.unwrap();
    assert_eq!(
        events.recv().await,
        Some(EngineEvent::MessagesAppended {
            chat_id: c1.clone(),
            count: 1
        })
    );
    assert_eq!(
        events.recv().await,
        Some(EngineEvent::ScrollToEnd { chat_id: c1 })
    );
}

#[tokio::test(start_paused = true)]
async fn dropped_event_receiver_does_not_affect_data() {
    let (backend, engine, events) = setup();
    drop(events);
    let c1 = ChatId::new("c1");
    backend.post_message(&c1, &peer(), "hello");

    engine.select(c1);
    tokio::time::sleep(SETTLE).await;
    engine.send_message("hi").await.unwrap();
    assert_eq!(engine.messages().len(), 2);
}
