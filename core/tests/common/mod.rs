#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use coral_core::ChatSession;
use coral_core::ChatTransport;
use coral_core::ChunkStream;
use coral_core::SessionSnapshot;
use coral_core::SessionStatus;
use coral_core::TransportError;
use coral_core::protocol::ChunkEvent;
use coral_core::protocol::ConversationId;
use coral_core::protocol::ConversationSummary;
use coral_core::protocol::OutboundRequest;
use tokio::sync::Mutex;
use tokio::time::timeout;

pub type ChunkSender = async_channel::Sender<Result<ChunkEvent, TransportError>>;

enum Script {
    Chunks(Vec<ChunkEvent>),
    Manual(ChunkStream),
    Fail(TransportError),
}

/// Scripted transport double: each `stream_message` consumes the next
/// scripted exchange in order. `Manual` exchanges hand the sender to the test
/// for chunk-by-chunk pacing.
#[derive(Default)]
pub struct FakeTransport {
    scripts: Mutex<VecDeque<Script>>,
    pub requests: Mutex<Vec<OutboundRequest>>,
    pub stops: Mutex<Vec<ConversationId>>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn script_chunks(&self, chunks: Vec<ChunkEvent>) {
        self.scripts.lock().await.push_back(Script::Chunks(chunks));
    }

    pub async fn script_manual(&self) -> ChunkSender {
        let (tx, rx) = async_channel::unbounded();
        self.scripts.lock().await.push_back(Script::Manual(rx));
        tx
    }

    pub async fn script_fail(&self, err: TransportError) {
        self.scripts.lock().await.push_back(Script::Fail(err));
    }
}

#[async_trait]
impl ChatTransport for FakeTransport {
    async fn stream_message(
        &self,
        request: OutboundRequest,
    ) -> Result<ChunkStream, TransportError> {
        self.requests.lock().await.push(request);
        match self.scripts.lock().await.pop_front() {
            Some(Script::Chunks(chunks)) => {
                let (tx, rx) = async_channel::unbounded();
                for chunk in chunks {
                    tx.send(Ok(chunk)).await.expect("buffer scripted chunk");
                }
                Ok(rx)
            }
            Some(Script::Manual(rx)) => Ok(rx),
            Some(Script::Fail(err)) => Err(err),
            None => Err(TransportError::Connect("no scripted exchange".to_string())),
        }
    }

    async fn stop_streaming(&self, conversation_id: &ConversationId) -> Result<(), TransportError> {
        self.stops.lock().await.push(conversation_id.clone());
        Ok(())
    }
}

pub async fn wait_for_status(session: &ChatSession, status: SessionStatus) -> SessionSnapshot {
    wait_for(session, move |snapshot| snapshot.status == status).await
}

pub async fn wait_for(
    session: &ChatSession,
    predicate: impl Fn(&SessionSnapshot) -> bool,
) -> SessionSnapshot {
    let mut snapshots = session.subscribe();
    timeout(Duration::from_secs(5), snapshots.wait_for(predicate)).await
    .expect("timed out waiting for session state")
    .expect("session dropped")
    .clone()
}

pub fn summary(id: &str, title: &str) -> ConversationSummary {
    ConversationSummary {
        id: ConversationId::from(id),
        title: title.to_string(),
        updated_at: None,
    }
}

pub fn identity_assigned(id: &str, title: &str) -> ChunkEvent {
    ChunkEvent::IdentityAssigned {
        conversation_id: ConversationId::from(id),
        summary: summary(id, title),
    }
}

pub fn text_delta(text: &str) -> ChunkEvent {
    ChunkEvent::TextDelta {
        text: text.to_string(),
    }
}
