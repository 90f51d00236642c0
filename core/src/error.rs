use coral_protocol::SessionKey;
use thiserror::Error;

use crate::session::SessionStatus;

pub type Result<T> = std::result::Result<T, CoralErr>;

#[derive(Debug, Error)]
pub enum CoralErr {
    /// Network or backend failure mid-stream. The session keeps any partial
    /// content and reports `Error` status; the user may retry.
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// Lookup or re-key against a key with no live session. Indicates a
    /// broken invariant upstream, so it propagates to the caller instead of
    /// being converted into a status transition.
    #[error("no session registered for key `{0}`")]
    SessionNotFound(SessionKey),

    /// A `send` while an exchange is already in flight. Rejected
    /// synchronously with no state change.
    #[error("send rejected while session is {0}")]
    ConcurrentSend(SessionStatus),

    /// Replacing the message list would race with arriving chunks.
    #[error("cannot replace messages while session is {0}")]
    ReplaceWhileStreaming(SessionStatus),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to reach backend: {0}")]
    Connect(String),

    #[error("stream failed: {0}")]
    Stream(String),

    /// The chunk channel closed before a `finish` or `error` chunk arrived.
    #[error("stream ended before completion")]
    Interrupted,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("conversation store failure: {0}")]
    Backend(String),
}
