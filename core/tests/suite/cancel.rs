use std::sync::Arc;
use std::time::Duration;

use coral_core::ChatManager;
use coral_core::InMemoryConversationStore;
use coral_core::SendOptions;
use coral_core::SessionStatus;
use coral_core::protocol::ChunkEvent;
use coral_core::protocol::ConversationId;
use coral_core::protocol::SessionKey;
use pretty_assertions::assert_eq;
use tokio::time::sleep;

use crate::common::FakeTransport;
use crate::common::text_delta;
use crate::common::wait_for;
use crate::common::wait_for_status;

fn conversation(id: &str) -> SessionKey {
    SessionKey::Conversation(ConversationId::from(id))
}

#[tokio::test]
async fn cancel_mid_stream_drops_late_chunks() {
    let transport = FakeTransport::new();
    let chunks = transport.script_manual().await;
    let manager = ChatManager::new(transport.clone(), Arc::new(InMemoryConversationStore::new()));

    let session = manager.session(&conversation("c1")).await;
    session.send("hello", SendOptions::default()).await.unwrap();
    chunks.send(Ok(text_delta("He"))).await.unwrap();
    wait_for(&session, |snapshot| {
        snapshot.messages.len() == 2 && snapshot.messages[1].text() == "He"
    })
    .await;

    session.cancel().await;
    assert_eq!(session.status(), SessionStatus::Idle);

    // Chunks that were already in flight when the user canceled must not
    // reappear in the message list. The exchange task may already have hung
    // up on the channel, which is equally fine.
    let _ = chunks.send(Ok(text_delta("llo"))).await;
    let _ = chunks.send(Ok(ChunkEvent::Finish)).await;
    sleep(Duration::from_millis(50)).await;

    let snapshot = session.snapshot();
    assert_eq!(snapshot.status, SessionStatus::Idle);
    assert_eq!(snapshot.messages[1].text(), "He");

    // The backend was told to stop generating.
    wait_for_stop(transport.as_ref(), "c1").await;
}

#[tokio::test]
async fn cancel_before_the_first_chunk_keeps_only_the_user_message() {
    let transport = FakeTransport::new();
    let _chunks = transport.script_manual().await;
    let manager = ChatManager::new(transport, Arc::new(InMemoryConversationStore::new()));

    let session = manager.session(&conversation("c1")).await;
    session.send("hello", SendOptions::default()).await.unwrap();
    session.cancel().await;

    let snapshot = session.snapshot();
    assert_eq!(snapshot.status, SessionStatus::Idle);
    assert_eq!(snapshot.messages.len(), 1);
    assert_eq!(snapshot.messages[0].text(), "hello");
}

#[tokio::test]
async fn cancel_without_an_exchange_is_a_noop() {
    let transport = FakeTransport::new();
    let manager = ChatManager::new(transport.clone(), Arc::new(InMemoryConversationStore::new()));

    let session = manager.session(&conversation("c1")).await;
    session.cancel().await;

    assert_eq!(session.status(), SessionStatus::Idle);
    assert!(transport.stops.lock().await.is_empty());
}

#[tokio::test]
async fn canceling_a_pending_session_sends_no_stop_notification() {
    let transport = FakeTransport::new();
    let _chunks = transport.script_manual().await;
    let manager = ChatManager::new(transport.clone(), Arc::new(InMemoryConversationStore::new()));

    let session = manager.session(&SessionKey::Pending).await;
    session.send("hello", SendOptions::default()).await.unwrap();
    session.cancel().await;

    assert_eq!(session.status(), SessionStatus::Idle);
    // No permanent id was ever assigned, so there is nothing to address a
    // stop request to.
    sleep(Duration::from_millis(50)).await;
    assert!(transport.stops.lock().await.is_empty());
}

#[tokio::test]
async fn a_new_exchange_after_cancel_streams_normally() {
    let transport = FakeTransport::new();
    let _first = transport.script_manual().await;
    transport
        .script_chunks(vec![text_delta("second answer"), ChunkEvent::Finish])
        .await;
    let manager = ChatManager::new(transport, Arc::new(InMemoryConversationStore::new()));

    let session = manager.session(&conversation("c1")).await;
    session.send("one", SendOptions::default()).await.unwrap();
    session.cancel().await;

    session.send("two", SendOptions::default()).await.unwrap();
    let snapshot = wait_for_status(&session, SessionStatus::Idle).await;

    assert_eq!(snapshot.messages.len(), 3);
    assert_eq!(snapshot.messages[2].text(), "second answer");
}

async fn wait_for_stop(transport: &FakeTransport, id: &str) {
    let expected = ConversationId::from(id);
    for _ in 0..100 {
        if transport.stops.lock().await.contains(&expected) {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("backend never received a stop notification for {id}");
}
