use std::collections::HashMap;

use async_trait::async_trait;
use coral_protocol::ConversationId;
use coral_protocol::ConversationRecord;
use coral_protocol::ConversationSummary;
use coral_protocol::Message;
use tokio::sync::Mutex;

use crate::error::StoreError;

/// Merge-style write against a cached conversation record.
///
/// The cache is shared with the list view and other independent readers, so
/// writes only touch the fields they carry; everything else on the record is
/// preserved.
#[derive(Debug, Clone, Default)]
pub struct ConversationUpdate {
    pub messages: Option<Vec<Message>>,
    pub title: Option<String>,
}

impl ConversationUpdate {
    pub fn messages(messages: Vec<Message>) -> Self {
        Self {
            messages: Some(messages),
            title: None,
        }
    }
}

/// The query/cache boundary to the persistence layer.
///
/// `fetch` and `list` read through the cache; `set_conversation` and
/// `insert_summary` are cache writes used to keep other observers current
/// without waiting for persistence.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// `Ok(None)` when the conversation does not exist.
    async fn fetch(&self, id: &ConversationId) -> Result<Option<ConversationRecord>, StoreError>;

    async fn list(&self) -> Vec<ConversationSummary>;

    /// Merge `update` into the cached record for `id`, creating a stub record
    /// when the cache has not seen the conversation yet.
    async fn set_conversation(&self, id: &ConversationId, update: ConversationUpdate);

    /// Insert a newly created conversation at the head of the list cache.
    async fn insert_summary(&self, summary: ConversationSummary);
}

/// In-memory [`ConversationStore`], newest conversation first.
///
/// The reference implementation used by tests and by embedders that have no
/// backend cache of their own.
#[derive(Default)]
pub struct InMemoryConversationStore {
    inner: Mutex<StoreInner>,
}

#[derive(Default)]
struct StoreInner {
    records: HashMap<ConversationId, ConversationRecord>,
    order: Vec<ConversationId>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a full record, e.g. a persisted snapshot in tests.
    pub async fn insert_record(&self, record: ConversationRecord) {
        let mut inner = self.inner.lock().await;
        let id = record.id.clone();
        if !inner.order.contains(&id) {
            inner.order.push(id.clone());
        }
        inner.records.insert(id, record);
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn fetch(&self, id: &ConversationId) -> Result<Option<ConversationRecord>, StoreError> {
        Ok(self.inner.lock().await.records.get(id).cloned())
    }

    async fn list(&self) -> Vec<ConversationSummary> {
        let inner = self.inner.lock().await;
        inner
            .order
            .iter()
            .filter_map(|id| inner.records.get(id))
            .map(|record| record.summary.clone())
            .collect()
    }

    async fn set_conversation(&self, id: &ConversationId, update: ConversationUpdate) {
        let mut inner = self.inner.lock().await;
        if !inner.records.contains_key(id) {
            inner.order.insert(0, id.clone());
            inner
                .records
                .insert(id.clone(), ConversationRecord::stub(id.clone()));
        }
        if let Some(record) = inner.records.get_mut(id) {
            if let Some(messages) = update.messages {
                record.messages = messages;
            }
            if let Some(title) = update.title {
                record.summary.title = title;
            }
        }
    }

    async fn insert_summary(&self, summary: ConversationSummary) {
        let mut inner = self.inner.lock().await;
        let id = summary.id.clone();
        inner.order.retain(|existing| existing != &id);
        inner.order.insert(0, id.clone());
        match inner.records.get_mut(&id) {
            Some(record) => record.summary = summary,
            None => {
                let mut record = ConversationRecord::stub(id.clone());
                record.summary = summary;
                inner.records.insert(id, record);
            }
        }
    }
}
