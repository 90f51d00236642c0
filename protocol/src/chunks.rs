use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::ConversationId;
use crate::ConversationSummary;
use crate::MessageId;

/// One incremental unit of a streamed response.
///
/// Chunks arrive strictly ordered for a given exchange and are applied in
/// arrival order. Most variants carry visible message content; the two
/// `data-*` variants are out-of-band control signals whose side effects must
/// complete before the next chunk of the same exchange is applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ChunkEvent {
    /// Append to the open text part of the current exchange, or open one.
    TextDelta { text: String },
    /// A tool call began; its arguments will stream in.
    ToolInputStart { call_id: String, tool_name: String },
    ToolInputDelta {
        call_id: String,
        input_text_delta: String,
    },
    /// The call's arguments are complete and parsed.
    ToolInputAvailable { call_id: String, input: Value },
    ToolOutputAvailable { call_id: String, output: Value },
    ToolOutputError { call_id: String, error: String },
    /// The backend persisted the conversation and assigned its permanent
    /// identity. Triggers re-keying and a view transition.
    #[serde(rename = "data-identity-assigned")]
    IdentityAssigned {
        conversation_id: ConversationId,
        summary: ConversationSummary,
    },
    /// The backend assigned a permanent id to the most recent user message.
    #[serde(rename = "data-message-identity-assigned")]
    MessageIdentityAssigned { new_id: MessageId },
    /// Graceful end of the exchange.
    Finish,
    /// Backend-reported failure. Partial content stays in the message list.
    Error { message: String },
}
