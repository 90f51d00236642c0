use std::sync::Arc;
use std::time::Duration;

use coral_core::ChatManager;
use coral_core::ConversationStore;
use coral_core::InMemoryConversationStore;
use coral_core::SendOptions;
use coral_core::SessionStatus;
use coral_core::protocol::ChunkEvent;
use coral_core::protocol::ConversationId;
use coral_core::protocol::ConversationRecord;
use coral_core::protocol::Message;
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

fn record(id: &str, messages: Vec<Message>) -> ConversationRecord {
    let mut record = ConversationRecord::stub(ConversationId::from(id));
    record.messages = messages;
    record
}

#[tokio::test]
async fn persisted_snapshot_is_ignored_mid_stream_and_applied_once_idle() {
    let transport = FakeTransport::new();
    let chunks = transport.script_manual().await;
    let store = Arc::new(InMemoryConversationStore::new());
    let manager = ChatManager::new(transport, Arc::clone(&store) as Arc<dyn ConversationStore>);

    let key = conversation("c1");
    let session = manager.session(&key).await;
    session.send("live", SendOptions::default()).await.unwrap();
    chunks.send(Ok(text_delta("streaming"))).await.unwrap();
    wait_for(&session, |snapshot| snapshot.messages.len() == 2).await;

    // A snapshot fetched before the exchange started must lose to the live
    // list while chunks are still arriving.
    store
        .insert_record(record("c1", vec![Message::user("stale")]))
        .await;
    assert!(!manager.refresh(&key).await.unwrap());
    assert_eq!(session.snapshot().messages[0].text(), "live");

    chunks.send(Ok(ChunkEvent::Finish)).await.unwrap();
    wait_for_status(&session, SessionStatus::Idle).await;

    // Once idle the persisted copy is authoritative again.
    let persisted = vec![Message::user("from persistence"), Message::assistant()];
    store.insert_record(record("c1", persisted.clone())).await;
    assert!(manager.refresh(&key).await.unwrap());
    assert_eq!(session.snapshot().messages, persisted);
}

#[tokio::test]
async fn live_messages_mirror_into_the_cache_while_streaming() {
    let transport = FakeTransport::new();
    let chunks = transport.script_manual().await;
    let store = Arc::new(InMemoryConversationStore::new());
    let manager = ChatManager::new(transport, Arc::clone(&store) as Arc<dyn ConversationStore>);

    let session = manager.session(&conversation("c1")).await;
    session.send("question", SendOptions::default()).await.unwrap();
    chunks.send(Ok(text_delta("partial answer"))).await.unwrap();

    // The live-out task runs on its own schedule; poll the cache until the
    // mirrored messages show up.
    let id = ConversationId::from("c1");
    let mut mirrored = None;
    for _ in 0..100 {
        if let Some(cached) = store.fetch(&id).await.unwrap()
            && cached.messages.len() == 2
        {
            mirrored = Some(cached);
            break;
        }
        sleep(Duration::from_millis(10)).await;
    }
    let cached = mirrored.expect("live messages never reached the cache");
    assert_eq!(cached.messages[0].text(), "question");
    assert_eq!(cached.messages[1].text(), "partial answer");

    chunks.send(Ok(ChunkEvent::Finish)).await.unwrap();
    wait_for_status(&session, SessionStatus::Idle).await;
}

#[tokio::test]
async fn pending_sessions_never_write_to_the_cache() {
    let transport = FakeTransport::new();
    let chunks = transport.script_manual().await;
    let store = Arc::new(InMemoryConversationStore::new());
    let manager = ChatManager::new(transport, Arc::clone(&store) as Arc<dyn ConversationStore>);

    let session = manager.session(&SessionKey::Pending).await;
    session.send("hello", SendOptions::default()).await.unwrap();
    chunks.send(Ok(text_delta("reply"))).await.unwrap();
    wait_for(&session, |snapshot| snapshot.messages.len() == 2).await;

    // There is no conversation id to file the mirror under yet.
    sleep(Duration::from_millis(50)).await;
    assert!(store.list().await.is_empty());

    chunks.send(Ok(ChunkEvent::Finish)).await.unwrap();
    wait_for_status(&session, SessionStatus::Idle).await;
}

#[tokio::test]
async fn refresh_of_a_pending_or_unknown_key_changes_nothing() {
    let transport = FakeTransport::new();
    let store = Arc::new(InMemoryConversationStore::new());
    let manager = ChatManager::new(transport, Arc::clone(&store) as Arc<dyn ConversationStore>);

    assert!(!manager.refresh(&SessionKey::Pending).await.unwrap());

    // Known session, but nothing persisted for it yet.
    let key = conversation("c1");
    manager.session(&key).await;
    assert!(!manager.refresh(&key).await.unwrap());

    // Persisted record, but no live session to apply it to.
    store.insert_record(record("c9", Vec::new())).await;
    assert!(!manager.refresh(&conversation("c9")).await.unwrap());
}
