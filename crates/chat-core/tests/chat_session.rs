//! Chat session controller behavior, end to end over in-memory backends.

mod common;

use std::sync::Arc;
use std::time::Duration;

use chat_core::{
    ChatError, ChatSession, ErrorKind, ManualClock, NoOpObserver, SendPhase, SummaryUpdater,
};
use chat_store::{ChatBackend, Conversation, MemoryBackend};
use common::{assert_silent, channel_observer, FaultyBackend};

fn session_at<B: ChatBackend>(
    user: &str,
    backend: &Arc<B>,
    clock: &Arc<ManualClock>,
) -> (ChatSession<B>, common::ObserverInbox) {
    let (observer, inbox) = channel_observer();
    let session = ChatSession::new(user, Arc::clone(backend), observer)
        .unwrap()
        .with_clock(clock.clone());
    (session, inbox)
}

#[tokio::test]
async fn open_creates_conversation_and_send_updates_summary() {
    let backend = Arc::new(MemoryBackend::new());
    let clock = Arc::new(ManualClock::at(1000));
    let (alice, mut inbox) = session_at("alice", &backend, &clock);

    assert!(backend.conversation("alice_bob").await.unwrap().is_none());

    let conversation = alice.open("bob").await.unwrap();
    assert_eq!(conversation.id, "alice_bob");
    assert_eq!(conversation.last_message_text, "");
    assert_eq!(conversation.last_message_at, 0);
    assert_eq!(conversation.last_message_sender, "");
    assert_eq!(
        backend.conversation("alice_bob").await.unwrap(),
        Some(conversation)
    );

    let message = alice.send("hello").await.unwrap();
    assert_eq!(message.content, "hello");
    assert_eq!(message.sent_at, 1000);

    let report = inbox.next_report().await;
    assert!(report.success);
    assert_eq!(report.message_id.as_deref(), Some(message.id.as_str()));

    let stored = backend.conversation("alice_bob").await.unwrap().unwrap();
    assert_eq!(stored.last_message_text, "hello");
    assert_eq!(stored.last_message_at, 1000);
    assert_eq!(stored.last_message_sender, "alice");

    let feed = inbox.wait_for_feed(|feed| feed.len() == 1).await;
    assert_eq!(feed[0], message);
}

#[tokio::test]
async fn immediate_repeat_is_suppressed_as_duplicate() {
    let backend = Arc::new(MemoryBackend::new());
    let clock = Arc::new(ManualClock::at(1000));
    let (alice, mut inbox) = session_at("alice", &backend, &clock);
    alice.open("bob").await.unwrap();

    alice.send("hello").await.unwrap();
    clock.set(1500);
    let second = alice.send("hello").await;

    assert!(matches!(second, Err(ChatError::DuplicateMessage)));
    assert_eq!(backend.message_count().await, 1);

    assert!(inbox.next_report().await.success);
    let report = inbox.next_report().await;
    assert_eq!(report.error, Some(ErrorKind::DuplicateMessage));
    assert!(!report.should_surface());
    assert!(report.clears_input());
}

#[tokio::test]
async fn store_side_check_catches_duplicates_across_sessions() {
    // Two views of the same user: each has its own throttle, so only the
    // store-side check stands between them.
    let backend = Arc::new(MemoryBackend::new());
    let clock = Arc::new(ManualClock::at(1000));
    let (first, _first_inbox) = session_at("alice", &backend, &clock);
    let (second, _second_inbox) = session_at("alice", &backend, &clock);
    first.open("bob").await.unwrap();
    second.open("bob").await.unwrap();

    first.send("hello").await.unwrap();
    clock.set(1500);
    let result = second.send("hello").await;

    assert!(matches!(result, Err(ChatError::DuplicateMessage)));
    assert_eq!(backend.message_count().await, 1);

    clock.set(3500);
    second.send("hello").await.unwrap();
    assert_eq!(backend.message_count().await, 2);
}

#[tokio::test]
async fn whitespace_only_content_never_reaches_the_store() {
    let backend = Arc::new(FaultyBackend::new());
    let clock = Arc::new(ManualClock::at(1000));
    let (alice, mut inbox) = session_at("alice", &backend, &clock);
    alice.open("bob").await.unwrap();
    inbox.wait_for_feed(|_| true).await;
    backend.reset_calls();

    let result = alice.send("   ").await;

    assert!(matches!(result, Err(ChatError::EmptyContent)));
    assert_eq!(backend.calls(), 0);
    assert_eq!(backend.inner.message_count().await, 0);
    let report = inbox.next_report().await;
    assert_eq!(report.error, Some(ErrorKind::EmptyContent));
    assert!(report.should_surface());
}

#[tokio::test]
async fn content_is_trimmed_before_sending() {
    let backend = Arc::new(MemoryBackend::new());
    let clock = Arc::new(ManualClock::at(1000));
    let (alice, _inbox) = session_at("alice", &backend, &clock);
    alice.open("bob").await.unwrap();

    let message = alice.send("  hi there \n").await.unwrap();
    assert_eq!(message.content, "hi there");
}

#[tokio::test]
async fn send_before_open_is_not_initialized() {
    let backend = Arc::new(MemoryBackend::new());
    let clock = Arc::new(ManualClock::at(1000));
    let (alice, mut inbox) = session_at("alice", &backend, &clock);

    let result = alice.send("hello").await;
    assert!(matches!(result, Err(ChatError::NotInitialized(_))));
    assert_eq!(
        inbox.next_report().await.error,
        Some(ErrorKind::NotInitialized)
    );

    alice.open("bob").await.unwrap();
    alice.close().await;
    assert!(matches!(
        alice.send("hello").await,
        Err(ChatError::NotInitialized(_))
    ));
}

#[tokio::test]
async fn invalid_participants_are_rejected() {
    let backend = Arc::new(MemoryBackend::new());

    let no_user = ChatSession::new("  ", Arc::clone(&backend), Arc::new(NoOpObserver));
    assert!(matches!(no_user, Err(ChatError::InvalidParticipant(_))));

    let alice = ChatSession::new("alice", Arc::clone(&backend), Arc::new(NoOpObserver)).unwrap();
    assert!(matches!(
        alice.open("").await,
        Err(ChatError::InvalidParticipant(_))
    ));
    assert!(matches!(
        alice.open("alice").await,
        Err(ChatError::InvalidParticipant(_))
    ));
    assert!(backend.conversations().await.unwrap().is_empty());
}

#[tokio::test]
async fn store_failure_is_surfaced_and_session_returns_to_idle() {
    let backend = Arc::new(FaultyBackend::new());
    let clock = Arc::new(ManualClock::at(1000));
    let (alice, mut inbox) = session_at("alice", &backend, &clock);
    alice.open("bob").await.unwrap();

    backend.fail_inserts(true);
    let result = alice.send("hello").await;
    match result {
        Err(ChatError::Store(e)) => assert!(e.to_string().contains("permission denied")),
        other => panic!("expected store error, got {:?}", other),
    }
    let report = inbox.next_report().await;
    assert_eq!(report.error, Some(ErrorKind::StoreError));
    assert!(report.should_surface());
    assert!(!report.clears_input());
    assert_eq!(alice.phase().await, SendPhase::Idle);

    // Manual retry once the backend recovers and the throttle window passes.
    backend.fail_inserts(false);
    clock.advance(2000);
    alice.send("hello").await.unwrap();
    assert_eq!(backend.inner.message_count().await, 1);
}

#[tokio::test]
async fn id_allocation_failures_are_hard_failures() {
    let backend = Arc::new(FaultyBackend::new());
    let clock = Arc::new(ManualClock::at(1000));
    let (alice, _inbox) = session_at("alice", &backend, &clock);
    alice.open("bob").await.unwrap();

    backend.fail_keys(true);
    let result = alice.send("first").await;
    assert!(matches!(result, Err(ChatError::IdGenerationFailure(_))));

    backend.fail_keys(false);
    backend.empty_keys(true);
    let result = alice.send("second").await;
    assert!(matches!(result, Err(ChatError::IdGenerationFailure(_))));

    assert_eq!(backend.inner.message_count().await, 0);
}

#[tokio::test]
async fn summary_failure_reports_failure_but_message_persists() {
    let backend = Arc::new(FaultyBackend::new());
    let clock = Arc::new(ManualClock::at(1000));
    let (alice, mut inbox) = session_at("alice", &backend, &clock);
    alice.open("bob").await.unwrap();

    backend.fail_summaries(true);
    let result = alice.send("hello").await;

    assert!(matches!(result, Err(ChatError::Store(_))));
    assert!(!inbox.next_report().await.success);
    assert_eq!(backend.inner.message_count().await, 1);
    let stored = backend.inner.conversation("alice_bob").await.unwrap().unwrap();
    assert_eq!(stored.last_message_text, "");
}

#[tokio::test]
async fn second_send_while_first_in_flight_is_rejected() {
    let backend = Arc::new(FaultyBackend::new());
    backend.delay_inserts(Duration::from_millis(300));
    let clock = Arc::new(ManualClock::at(1000));
    let (alice, _inbox) = session_at("alice", &backend, &clock);
    let alice = Arc::new(alice);
    alice.open("bob").await.unwrap();

    let first = {
        let alice = Arc::clone(&alice);
        tokio::spawn(async move { alice.send("first").await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(alice.phase().await, SendPhase::Sending);

    let second = alice.send("second").await;
    assert!(matches!(second, Err(ChatError::SendInProgress)));

    first.await.unwrap().unwrap();
    assert_eq!(alice.phase().await, SendPhase::Idle);
    assert_eq!(backend.inner.message_count().await, 1);
}

#[tokio::test]
async fn abandoned_send_still_completes_and_returns_to_idle() {
    let backend = Arc::new(FaultyBackend::new());
    backend.delay_inserts(Duration::from_millis(300));
    let clock = Arc::new(ManualClock::at(1000));
    let (alice, _inbox) = session_at("alice", &backend, &clock);
    alice.open("bob").await.unwrap();

    let gave_up = tokio::time::timeout(Duration::from_millis(50), alice.send("first")).await;
    assert!(gave_up.is_err());

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(alice.phase().await, SendPhase::Idle);
    assert_eq!(backend.inner.message_count().await, 1);

    clock.advance(10_000);
    let later = alice.send("second").await.unwrap();
    assert_eq!(later.content, "second");
    assert_eq!(backend.inner.message_count().await, 2);
}

#[tokio::test]
async fn receiver_sees_messages_live() {
    let backend = Arc::new(MemoryBackend::new());
    let clock = Arc::new(ManualClock::at(1000));
    let (alice, _alice_inbox) = session_at("alice", &backend, &clock);
    let (bob, mut bob_inbox) = session_at("bob", &backend, &clock);
    alice.open("bob").await.unwrap();
    bob.open("alice").await.unwrap();

    alice.send("hello").await.unwrap();
    clock.set(1200);
    bob.send("hi alice").await.unwrap();

    let feed = bob_inbox.wait_for_feed(|feed| feed.len() == 2).await;
    assert_eq!(feed[0].sender_id, "alice");
    assert_eq!(feed[1].sender_id, "bob");
}

#[tokio::test]
async fn close_stops_live_updates() {
    let backend = Arc::new(MemoryBackend::new());
    let clock = Arc::new(ManualClock::at(1000));
    let (alice, mut alice_inbox) = session_at("alice", &backend, &clock);
    let (bob, _bob_inbox) = session_at("bob", &backend, &clock);
    alice.open("bob").await.unwrap();
    bob.open("alice").await.unwrap();
    alice_inbox.wait_for_feed(|_| true).await;

    alice.close().await;
    alice.close().await;
    assert!(!alice.is_listening().await);
    assert!(alice.current().await.is_none());
    alice_inbox.drain_feeds();

    bob.send("are you there?").await.unwrap();
    assert_silent(&mut alice_inbox.feeds).await;
}

#[tokio::test]
async fn reopening_replaces_the_previous_feed() {
    let backend = Arc::new(MemoryBackend::new());
    let clock = Arc::new(ManualClock::at(1000));
    let (alice, mut alice_inbox) = session_at("alice", &backend, &clock);
    let (bob, _bob_inbox) = session_at("bob", &backend, &clock);
    bob.open("alice").await.unwrap();

    alice.open("bob").await.unwrap();
    alice.open("carol").await.unwrap();
    assert_eq!(
        alice.current().await.unwrap().conversation_id,
        "alice_carol"
    );
    assert!(alice.is_listening().await);
    tokio::time::sleep(Duration::from_millis(100)).await;
    alice_inbox.drain_feeds();

    bob.send("over here").await.unwrap();
    assert_silent(&mut alice_inbox.feeds).await;
}

#[tokio::test]
async fn mark_read_updates_the_feed() {
    let backend = Arc::new(MemoryBackend::new());
    let clock = Arc::new(ManualClock::at(1000));
    let (alice, mut alice_inbox) = session_at("alice", &backend, &clock);
    let (bob, _bob_inbox) = session_at("bob", &backend, &clock);

    assert!(matches!(
        alice.mark_read().await,
        Err(ChatError::NotInitialized(_))
    ));

    bob.open("alice").await.unwrap();
    bob.send("ping").await.unwrap();

    alice.open("bob").await.unwrap();
    alice_inbox
        .wait_for_feed(|feed| feed.len() == 1 && !feed[0].read)
        .await;

    assert_eq!(alice.mark_read().await.unwrap(), 1);
    alice_inbox
        .wait_for_feed(|feed| feed.len() == 1 && feed[0].read)
        .await;
}

#[tokio::test]
async fn concurrent_open_keeps_a_single_conversation() {
    let backend = Arc::new(MemoryBackend::new());
    let clock = Arc::new(ManualClock::at(1000));
    let (alice, _alice_inbox) = session_at("alice", &backend, &clock);
    let (bob, _bob_inbox) = session_at("bob", &backend, &clock);

    let (from_alice, from_bob) = tokio::join!(alice.open("bob"), bob.open("alice"));
    let from_alice = from_alice.unwrap();
    let from_bob = from_bob.unwrap();

    let all = backend.conversations().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(from_alice.id, "alice_bob");
    assert_eq!(from_bob.id, "alice_bob");
    // Whoever created it first fixed the participant order for both.
    assert_eq!(from_alice.participant_a, all[0].participant_a);
    assert_eq!(from_bob.participant_a, all[0].participant_a);
}

#[tokio::test]
async fn creation_race_loser_sees_first_writers_record() {
    let backend = Arc::new(MemoryBackend::new());
    // Another client slipped its record in between our check and our create.
    backend
        .insert_conversation(&Conversation::new("alice_bob", "bob", "alice"))
        .await
        .unwrap();

    let alice = ChatSession::new("alice", Arc::clone(&backend), Arc::new(NoOpObserver)).unwrap();
    let conversation = alice.open("bob").await.unwrap();
    assert_eq!(conversation.participant_a, "bob");
    assert_eq!(conversation.participant_b, "alice");
}

#[tokio::test]
async fn summary_is_last_writer_wins() {
    let backend = Arc::new(MemoryBackend::new());
    let clock = Arc::new(ManualClock::at(2000));
    let (alice, _inbox) = session_at("alice", &backend, &clock);
    alice.open("bob").await.unwrap();
    let newer = alice.send("newer").await.unwrap();

    // A slower client's summary write for an older message lands afterwards.
    let older = chat_core::Message {
        id: "late-1500".to_string(),
        sender_id: "bob".to_string(),
        receiver_id: "alice".to_string(),
        content: "older".to_string(),
        sent_at: 1500,
        ..newer
    };
    SummaryUpdater::new(Arc::clone(&backend))
        .apply(&older)
        .await
        .unwrap();

    let stored = backend.conversation("alice_bob").await.unwrap().unwrap();
    assert_eq!(stored.last_message_text, "older");
    assert_eq!(stored.last_message_at, 1500);
    assert_eq!(stored.last_message_sender, "bob");
}
