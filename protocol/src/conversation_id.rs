use std::fmt::Display;

use serde::Deserialize;
use serde::Serialize;

/// Server-assigned identifier for a persisted conversation.
///
/// The backend owns the format; clients treat it as opaque and only compare
/// and display it. Notably this is *never* generated client-side: a
/// conversation has no `ConversationId` until the backend announces one via
/// an identity-assigned chunk.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ConversationId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Address of one session slot.
///
/// A conversation that has not been persisted yet lives under the reserved
/// `Pending` key; once the backend assigns its permanent identifier the
/// session is re-keyed to `Conversation(id)` while its in-progress stream
/// continues uninterrupted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SessionKey {
    Pending,
    Conversation(ConversationId),
}

const PENDING_KEY: &str = "pending";

impl SessionKey {
    /// The permanent identifier, if this key has one.
    pub fn conversation_id(&self) -> Option<&ConversationId> {
        match self {
            SessionKey::Pending => None,
            SessionKey::Conversation(id) => Some(id),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, SessionKey::Pending)
    }
}

impl Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionKey::Pending => write!(f, "{PENDING_KEY}"),
            SessionKey::Conversation(id) => write!(f, "{id}"),
        }
    }
}

impl From<ConversationId> for SessionKey {
    fn from(id: ConversationId) -> Self {
        SessionKey::Conversation(id)
    }
}

impl Serialize for SessionKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SessionKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        if value == PENDING_KEY {
            Ok(SessionKey::Pending)
        } else {
            Ok(SessionKey::Conversation(ConversationId(value)))
        }
    }
}
