use std::sync::Arc;
use std::sync::Weak;

use async_trait::async_trait;
use coral_protocol::ConversationId;
use coral_protocol::ConversationSummary;
use coral_protocol::SessionKey;
use tracing::info;
use tracing::warn;

use crate::error::Result;
use crate::lifecycle::LifecycleController;
use crate::registry::SessionRegistry;
use crate::session::ChatSession;
use crate::session::ExchangeSignals;
use crate::session::SendOptions;
use crate::store::ConversationStore;
use crate::sync::MessageSynchronizer;
use crate::transport::ChatTransport;

pub(crate) const NOTICE_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Capacity of the view-notice channel. Notices are dropped with a
    /// warning once the channel is full and nobody drains it.
    pub notice_capacity: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            notice_capacity: NOTICE_CHANNEL_CAPACITY,
        }
    }
}

/// Instruction to the view layer, emitted from inside a running stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewNotice {
    /// Navigate to the newly assigned conversation. `already_live` tells the
    /// view not to re-fetch a conversation it already holds live state for.
    ConversationAssigned {
        id: ConversationId,
        already_live: bool,
    },
}

/// Composition root for the streaming subsystem: one per application process,
/// created with its transport and store collaborators injected. Exposes the
/// view boundary (get session, send, cancel, refresh, view transitions).
pub struct ChatManager {
    registry: Arc<SessionRegistry>,
    store: Arc<dyn ConversationStore>,
    transport: Arc<dyn ChatTransport>,
    synchronizer: MessageSynchronizer,
    lifecycle: LifecycleController,
    signals: Arc<ManagerSignals>,
    rx_notice: async_channel::Receiver<ViewNotice>,
}

impl ChatManager {
    pub fn new(transport: Arc<dyn ChatTransport>, store: Arc<dyn ConversationStore>) -> Self {
        Self::with_config(transport, store, ManagerConfig::default())
    }

    pub fn with_config(
        transport: Arc<dyn ChatTransport>,
        store: Arc<dyn ConversationStore>,
        config: ManagerConfig,
    ) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        let (tx_notice, rx_notice) = async_channel::bounded(config.notice_capacity);
        let signals = Arc::new(ManagerSignals {
            registry: Arc::downgrade(&registry),
            store: Arc::clone(&store),
            tx_notice,
        });
        Self {
            synchronizer: MessageSynchronizer::new(Arc::clone(&store)),
            lifecycle: LifecycleController::new(Arc::clone(&registry)),
            registry,
            store,
            transport,
            signals,
            rx_notice,
        }
    }

    /// The session for `key`, created on first access. Creation also starts
    /// the live-out synchronization task for the session.
    pub async fn session(&self, key: &SessionKey) -> Arc<ChatSession> {
        let (session, created) = self
            .registry
            .get_or_create(key, || {
                ChatSession::new(
                    key.clone(),
                    Arc::clone(&self.transport),
                    Arc::clone(&self.signals) as Arc<dyn ExchangeSignals>,
                )
            })
            .await;
        if created {
            self.synchronizer.spawn_live_sync(session.subscribe());
        }
        session
    }

    pub async fn send(
        &self,
        key: &SessionKey,
        text: impl Into<String>,
        options: SendOptions,
    ) -> Result<()> {
        let session = self.session(key).await;
        session.send(text, options).await
    }

    /// Cancel the exchange running under `key`, if any.
    pub async fn cancel(&self, key: &SessionKey) {
        if let Some(session) = self.registry.get(key).await {
            session.cancel().await;
        }
    }

    /// Pull the persisted snapshot for `key` and offer it to the session.
    /// Returns whether the live list was replaced; a pending key, an unknown
    /// conversation, or a session mid-stream all leave it untouched.
    pub async fn refresh(&self, key: &SessionKey) -> Result<bool> {
        let Some(id) = key.conversation_id() else {
            return Ok(false);
        };
        let Some(record) = self.store.fetch(id).await? else {
            return Ok(false);
        };
        let Some(session) = self.registry.get(key).await else {
            return Ok(false);
        };
        Ok(self.synchronizer.apply_snapshot(&session, record).await)
    }

    pub async fn list_conversations(&self) -> Vec<ConversationSummary> {
        self.store.list().await
    }

    /// Entry point for the lifecycle controller: the view moved to `key`.
    pub async fn on_view_change(&self, key: Option<SessionKey>) {
        self.lifecycle.on_view_change(key).await;
    }

    /// Receiver for view notices; clonable, one message per consumer.
    pub fn notices(&self) -> async_channel::Receiver<ViewNotice> {
        self.rx_notice.clone()
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }
}

/// [`ExchangeSignals`] wiring for manager-owned sessions. Holds the registry
/// weakly: sessions own a handle to this and the registry owns the sessions,
/// so a strong reference would cycle.
struct ManagerSignals {
    registry: Weak<SessionRegistry>,
    store: Arc<dyn ConversationStore>,
    tx_notice: async_channel::Sender<ViewNotice>,
}

#[async_trait]
impl ExchangeSignals for ManagerSignals {
    async fn identity_assigned(
        &self,
        session: &Arc<ChatSession>,
        conversation_id: ConversationId,
        summary: ConversationSummary,
    ) -> Result<()> {
        let Some(registry) = self.registry.upgrade() else {
            // Manager shut down while the stream was still running.
            return Ok(());
        };
        let old_key = session.key();
        let new_key = SessionKey::Conversation(conversation_id.clone());
        registry.rekey(&old_key, new_key.clone()).await?;
        info!(%old_key, %new_key, "conversation identity assigned mid-stream");

        self.store.insert_summary(summary).await;

        let notice = ViewNotice::ConversationAssigned {
            id: conversation_id,
            already_live: true,
        };
        if self.tx_notice.try_send(notice).is_err() {
            warn!("view notice dropped: channel full or closed");
        }
        Ok(())
    }
}
