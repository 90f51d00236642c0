//! Root of the `coral-core` library: the session registry and message
//! synchronizer behind the chat surface.
//!
//! The crate owns one hard problem: a long-lived, cancelable, incrementally
//! updating exchange per conversation, whose in-memory state must stay
//! consistent with a separately fetched persisted copy and survive acquiring
//! a permanent identity mid-stream. Persistence and the network transport are
//! external collaborators behind the [`ConversationStore`] and
//! [`ChatTransport`] traits.

// Library code never writes to stdout/stderr directly; diagnostics go through
// the tracing stack.
#![deny(clippy::print_stdout, clippy::print_stderr)]

mod error;
mod lifecycle;
mod manager;
mod registry;
mod session;
mod store;
mod sync;
#[cfg(test)]
mod testing;
mod transport;

pub use coral_protocol as protocol;

pub use error::CoralErr;
pub use error::Result;
pub use error::StoreError;
pub use error::TransportError;
pub use lifecycle::LifecycleController;
pub use manager::ChatManager;
pub use manager::ManagerConfig;
pub use manager::ViewNotice;
pub use registry::SessionRegistry;
pub use session::ChatSession;
pub use session::ExchangeSignals;
pub use session::NullSignals;
pub use session::SendOptions;
pub use session::SessionSnapshot;
pub use session::SessionStatus;
pub use store::ConversationStore;
pub use store::ConversationUpdate;
pub use store::InMemoryConversationStore;
pub use sync::MessageSynchronizer;
pub use transport::ChatTransport;
pub use transport::ChunkStream;
