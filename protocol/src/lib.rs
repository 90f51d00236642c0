//! Wire vocabulary shared between the session engine and its transports.
//!
//! Everything in this crate is plain data: the chunk events a streaming
//! exchange may emit, the message/part model those chunks build up, and the
//! conversation records the query layer caches. No I/O, no runtime.

mod chunks;
mod conversation_id;
mod message;
mod record;

pub use chunks::ChunkEvent;
pub use conversation_id::ConversationId;
pub use conversation_id::SessionKey;
pub use message::DataPart;
pub use message::Message;
pub use message::MessageId;
pub use message::MessagePart;
pub use message::Role;
pub use message::TextPart;
pub use message::ToolCallPart;
pub use message::ToolCallState;
pub use record::ConversationRecord;
pub use record::ConversationSummary;
pub use record::OutboundMessage;
pub use record::OutboundRequest;
