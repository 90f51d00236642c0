use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

/// Identifier of a single message.
///
/// Messages composed client-side carry a provisional UUID until the backend
/// assigns the permanent id via a message-identity-assigned chunk; the
/// synchronizer then rewrites the id in place without disturbing order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn provisional() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// One entry in a conversation, ordered by insertion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub parts: Vec<MessagePart>,
}

impl Message {
    /// A user message holding a single, already-complete text part.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            id: MessageId::provisional(),
            role: Role::User,
            parts: vec![MessagePart::Text(TextPart {
                text: text.into(),
                done: true,
            })],
        }
    }

    /// An empty assistant message, ready to accumulate streamed parts.
    pub fn assistant() -> Self {
        Self {
            id: MessageId::provisional(),
            role: Role::Assistant,
            parts: Vec::new(),
        }
    }

    /// Concatenation of all text parts, for display and assertions.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for part in &self.parts {
            if let MessagePart::Text(part) = part {
                out.push_str(&part.text);
            }
        }
        out
    }
}

/// Ordered content of a message. Closed set: rendering and chunk application
/// both dispatch over this exhaustively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum MessagePart {
    Text(TextPart),
    ToolCall(ToolCallPart),
    Data(DataPart),
}

/// A span of assistant (or user) text. `done` flips when the exchange that
/// opened the span finalizes it; a finalized span is never appended to again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextPart {
    pub text: String,
    #[serde(default)]
    pub done: bool,
}

/// A tool invocation surfaced inside an assistant message, keyed by the
/// backend's call identifier and advanced through [`ToolCallState`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallPart {
    pub call_id: String,
    pub tool_name: String,
    /// Raw argument text accumulated while the call's input streams in.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub input_fragments: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub state: ToolCallState,
}

impl ToolCallPart {
    pub fn started(call_id: impl Into<String>, tool_name: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            input_fragments: String::new(),
            input: None,
            output: None,
            error: None,
            state: ToolCallState::InputStreaming,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolCallState {
    InputStreaming,
    InputAvailable,
    OutputAvailable,
    OutputError,
}

/// Structured out-of-band content attached to a message (e.g. a table of
/// query results). Opaque to the session engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPart {
    pub name: String,
    pub value: Value,
}
