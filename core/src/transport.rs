use async_trait::async_trait;
use coral_protocol::ChunkEvent;
use coral_protocol::ConversationId;
use coral_protocol::OutboundRequest;

use crate::error::TransportError;

/// Ordered chunk stream for one exchange. The sender side lives in the
/// transport; the channel closing without a `finish` chunk is treated as an
/// interrupted stream.
pub type ChunkStream = async_channel::Receiver<Result<ChunkEvent, TransportError>>;

/// The network boundary: carries one outbound message and streams back the
/// response chunks. Implementations are opaque to the session engine.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Issue the request and return the chunk stream for the new exchange.
    async fn stream_message(&self, request: OutboundRequest)
    -> Result<ChunkStream, TransportError>;

    /// Ask the backend to stop producing chunks for a canceled exchange.
    /// Best-effort: callers must not let a failure here block or fail the
    /// local cancellation.
    async fn stop_streaming(&self, conversation_id: &ConversationId) -> Result<(), TransportError>;
}
