use std::sync::Arc;

use coral_protocol::ConversationRecord;
use coral_protocol::SessionKey;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::CoralErr;
use crate::session::ChatSession;
use crate::session::SessionSnapshot;
use crate::store::ConversationStore;
use crate::store::ConversationUpdate;

/// Reconciles a session's live message list with the persisted copy, in both
/// directions, without racing a running stream.
///
/// Direction is decided by current status, never by timestamps: chunk arrival
/// latency is unbounded, so a snapshot fetched before an exchange started
/// must lose to messages appended during that exchange.
pub struct MessageSynchronizer {
    store: Arc<dyn ConversationStore>,
}

impl MessageSynchronizer {
    pub fn new(store: Arc<dyn ConversationStore>) -> Self {
        Self { store }
    }

    /// A fresh persisted snapshot arrived. When the session is idle the
    /// persisted copy is authoritative and replaces the live list exactly;
    /// while an exchange is in flight the snapshot is stale by definition and
    /// is dropped. Returns whether the snapshot was applied.
    pub async fn apply_snapshot(
        &self,
        session: &ChatSession,
        record: ConversationRecord,
    ) -> bool {
        match session.set_messages(record.messages).await {
            Ok(()) => true,
            Err(CoralErr::ReplaceWhileStreaming(status)) => {
                debug!(id = %record.id, %status, "persisted snapshot ignored during live exchange");
                false
            }
            Err(_) => false,
        }
    }

    /// Continuous live-out direction: while the session streams under a
    /// permanent key, mirror its message list into the cached record so list
    /// views and other observers stay current without waiting for
    /// persistence. The task ends when the session is dropped.
    pub fn spawn_live_sync(
        &self,
        mut snapshots: watch::Receiver<SessionSnapshot>,
    ) -> JoinHandle<()> {
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            loop {
                let update = {
                    let snapshot = snapshots.borrow_and_update();
                    live_update(&snapshot)
                };
                if let Some((id, messages)) = update {
                    store
                        .set_conversation(&id, ConversationUpdate::messages(messages))
                        .await;
                }
                if snapshots.changed().await.is_err() {
                    break;
                }
            }
        })
    }
}

fn live_update(
    snapshot: &SessionSnapshot,
) -> Option<(coral_protocol::ConversationId, Vec<coral_protocol::Message>)> {
    if !snapshot.status.is_active() {
        return None;
    }
    match &snapshot.key {
        SessionKey::Pending => None,
        SessionKey::Conversation(id) => Some((id.clone(), snapshot.messages.clone())),
    }
}
