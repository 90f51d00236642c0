use serde::Deserialize;
use serde::Serialize;

use crate::ConversationId;
use crate::Message;

/// List-view projection of a conversation, as cached by the query layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: ConversationId,
    pub title: String,
    /// Backend timestamp, opaque to this subsystem.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// Persisted snapshot of one conversation as last fetched.
///
/// Never authoritative over a session's live message list while that session
/// is actively streaming; staleness is expected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub id: ConversationId,
    pub summary: ConversationSummary,
    pub messages: Vec<Message>,
}

impl ConversationRecord {
    /// Empty record skeleton, used when the cache learns about a conversation
    /// before its first fetch.
    pub fn stub(id: ConversationId) -> Self {
        Self {
            summary: ConversationSummary {
                id: id.clone(),
                title: String::new(),
                updated_at: None,
            },
            id,
            messages: Vec::new(),
        }
    }
}

/// Request issued to the transport boundary for one exchange.
///
/// An absent `conversation_key` asks the backend to create a new
/// conversation; its permanent identity comes back in-stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_key: Option<ConversationId>,
    pub message: OutboundMessage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_selection: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contextual_mentions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub text: String,
}
