//! Minimal doubles shared by unit tests in this crate.

use async_trait::async_trait;
use coral_protocol::ConversationId;
use coral_protocol::OutboundRequest;

use crate::error::TransportError;
use crate::transport::ChatTransport;
use crate::transport::ChunkStream;

/// Transport whose streams end immediately. For tests that never exercise an
/// exchange.
pub(crate) struct NoopTransport;

#[async_trait]
impl ChatTransport for NoopTransport {
    async fn stream_message(
        &self,
        _request: OutboundRequest,
    ) -> Result<ChunkStream, TransportError> {
        let (_, rx) = async_channel::bounded(1);
        Ok(rx)
    }

    async fn stop_streaming(
        &self,
        _conversation_id: &ConversationId,
    ) -> Result<(), TransportError> {
        Ok(())
    }
}
