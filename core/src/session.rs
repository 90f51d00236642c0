use std::fmt::Display;
use std::sync::Arc;

use async_trait::async_trait;
use coral_protocol::ChunkEvent;
use coral_protocol::ConversationId;
use coral_protocol::ConversationSummary;
use coral_protocol::Message;
use coral_protocol::MessageId;
use coral_protocol::MessagePart;
use coral_protocol::OutboundMessage;
use coral_protocol::OutboundRequest;
use coral_protocol::Role;
use coral_protocol::SessionKey;
use coral_protocol::TextPart;
use coral_protocol::ToolCallPart;
use coral_protocol::ToolCallState;
use tokio::sync::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::warn;

use crate::error::CoralErr;
use crate::error::Result;
use crate::error::TransportError;
use crate::transport::ChatTransport;

/// Status of a session's current (or most recent) exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Submitted,
    Streaming,
    Error,
}

impl SessionStatus {
    /// Whether an exchange is in flight, i.e. chunks may still arrive.
    pub fn is_active(self) -> bool {
        matches!(self, SessionStatus::Submitted | SessionStatus::Streaming)
    }
}

impl Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Submitted => "submitted",
            SessionStatus::Streaming => "streaming",
            SessionStatus::Error => "error",
        };
        write!(f, "{label}")
    }
}

/// Observable projection of a session, published through a watch channel so
/// rendering surfaces and the synchronizer subscribe to state changes without
/// touching session internals.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub key: SessionKey,
    pub messages: Vec<Message>,
    pub status: SessionStatus,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    pub model_selection: Option<String>,
    pub contextual_mentions: Vec<String>,
}

/// Side effects triggered by out-of-band chunks. Implemented by the manager
/// so a session never reaches into registry, store, or view wiring directly.
#[async_trait]
pub trait ExchangeSignals: Send + Sync {
    /// The backend assigned the conversation's permanent identity while the
    /// stream is still running. Must complete before the next chunk of the
    /// same exchange is applied.
    async fn identity_assigned(
        &self,
        session: &Arc<ChatSession>,
        conversation_id: ConversationId,
        summary: ConversationSummary,
    ) -> Result<()>;
}

/// No-op signal handler for sessions running outside a manager (tests,
/// embedders that never use placeholder keys).
#[derive(Debug, Default)]
pub struct NullSignals;

#[async_trait]
impl ExchangeSignals for NullSignals {
    async fn identity_assigned(
        &self,
        _session: &Arc<ChatSession>,
        conversation_id: ConversationId,
        _summary: ConversationSummary,
    ) -> Result<()> {
        debug!(%conversation_id, "identity assignment ignored (no signal handler)");
        Ok(())
    }
}

/// One streaming conversational exchange and its message state.
///
/// A session has at most one exchange in flight. Chunk application is
/// serialized by the state mutex and driven by a single exchange task, so the
/// visible message list only ever changes in chunk arrival order.
pub struct ChatSession {
    transport: Arc<dyn ChatTransport>,
    signals: Arc<dyn ExchangeSignals>,
    state: Mutex<SessionState>,
    active: Mutex<Option<ActiveExchange>>,
    tx_snapshot: watch::Sender<SessionSnapshot>,
}

impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession").finish_non_exhaustive()
    }
}

struct ActiveExchange {
    seq: u64,
    token: CancellationToken,
}

impl ChatSession {
    pub fn new(
        key: SessionKey,
        transport: Arc<dyn ChatTransport>,
        signals: Arc<dyn ExchangeSignals>,
    ) -> Arc<Self> {
        let state = SessionState::new(key);
        let (tx_snapshot, _) = watch::channel(state.snapshot());
        Arc::new(Self {
            transport,
            signals,
            state: Mutex::new(state),
            active: Mutex::new(None),
            tx_snapshot,
        })
    }

    /// The key this session is currently registered under.
    pub fn key(&self) -> SessionKey {
        self.tx_snapshot.borrow().key.clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.tx_snapshot.borrow().status
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.tx_snapshot.borrow().clone()
    }

    /// Subscribe to state change notifications.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.tx_snapshot.subscribe()
    }

    /// Append the user message and start a new exchange.
    ///
    /// Rejected synchronously with [`CoralErr::ConcurrentSend`] while an
    /// exchange is already in flight; overlapping exchanges on one session
    /// would interleave chunk application.
    pub async fn send(self: &Arc<Self>, text: impl Into<String>, options: SendOptions) -> Result<()> {
        let text = text.into();
        let (seq, request) = {
            let mut state = self.state.lock().await;
            if state.status.is_active() {
                return Err(CoralErr::ConcurrentSend(state.status));
            }
            state.exchange_seq += 1;
            state.messages.push(Message::user(text.clone()));
            state.status = SessionStatus::Submitted;
            state.last_error = None;
            self.publish(&state);
            let request = OutboundRequest {
                conversation_key: state.key.conversation_id().cloned(),
                message: OutboundMessage { text },
                model_selection: options.model_selection,
                contextual_mentions: options.contextual_mentions,
            };
            (state.exchange_seq, request)
        };

        let token = CancellationToken::new();
        *self.active.lock().await = Some(ActiveExchange {
            seq,
            token: token.clone(),
        });

        let session = Arc::clone(self);
        tokio::spawn(async move {
            session.run_exchange(seq, request, token).await;
        });
        Ok(())
    }

    /// Stop the current exchange, if any.
    ///
    /// The local status transition is immediate; chunks already in flight for
    /// the canceled exchange are dropped at the next suspension point. The
    /// backend is notified best-effort on a detached task so a slow or failed
    /// notification never delays the transition.
    pub async fn cancel(&self) {
        let Some(active) = self.active.lock().await.take() else {
            return;
        };
        active.token.cancel();

        {
            let mut state = self.state.lock().await;
            if state.exchange_seq == active.seq && state.status.is_active() {
                state.finalize_open_parts();
                state.status = SessionStatus::Idle;
                self.publish(&state);
            }
        }

        if let Some(id) = self.key().conversation_id().cloned() {
            let transport = Arc::clone(&self.transport);
            tokio::spawn(async move {
                if let Err(err) = transport.stop_streaming(&id).await {
                    warn!(conversation_id = %id, "failed to notify backend of cancellation: {err}");
                }
            });
        }
    }

    /// Replace the full message list atomically.
    ///
    /// Rejected while an exchange is in flight: the replacement would race
    /// with concurrently arriving chunks.
    pub async fn set_messages(&self, messages: Vec<Message>) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.status.is_active() {
            return Err(CoralErr::ReplaceWhileStreaming(state.status));
        }
        state.messages = messages;
        self.publish(&state);
        Ok(())
    }

    pub(crate) async fn set_key(&self, key: SessionKey) {
        let mut state = self.state.lock().await;
        state.key = key;
        self.publish(&state);
    }

    fn publish(&self, state: &SessionState) {
        self.tx_snapshot.send_replace(state.snapshot());
    }

    async fn run_exchange(
        self: Arc<Self>,
        seq: u64,
        request: OutboundRequest,
        token: CancellationToken,
    ) {
        let opened = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            res = self.transport.stream_message(request) => Some(res),
        };

        match opened {
            None => {}
            Some(Err(err)) => {
                self.fail_exchange(seq, err.to_string()).await;
            }
            Some(Ok(chunks)) => loop {
                let next = tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    next = chunks.recv() => next,
                };
                match next {
                    Ok(Ok(chunk)) => {
                        if !self.apply_chunk(seq, chunk).await {
                            break;
                        }
                    }
                    Ok(Err(err)) => {
                        self.fail_exchange(seq, err.to_string()).await;
                        break;
                    }
                    // Channel closed without a terminal chunk.
                    Err(_) => {
                        self.fail_exchange(seq, TransportError::Interrupted.to_string())
                            .await;
                        break;
                    }
                }
            },
        }

        self.clear_active(seq).await;
    }

    /// Apply one chunk in arrival order. Returns `false` once the exchange is
    /// over (terminal chunk, cancellation, or superseded sequence).
    async fn apply_chunk(self: &Arc<Self>, seq: u64, chunk: ChunkEvent) -> bool {
        let mut state = self.state.lock().await;
        if state.exchange_seq != seq || !state.status.is_active() {
            debug!(key = %state.key, "dropping chunk for stale exchange");
            return false;
        }

        match chunk {
            // Out-of-band: the handler runs to completion before the caller
            // reads the next chunk, preserving exchange ordering. Control
            // chunks carry no visible content, so the status stays where the
            // content chunks left it.
            ChunkEvent::IdentityAssigned {
                conversation_id,
                summary,
            } => {
                drop(state);
                if let Err(err) = self
                    .signals
                    .identity_assigned(self, conversation_id.clone(), summary)
                    .await
                {
                    error!(%conversation_id, "identity assignment failed: {err}");
                }
                return true;
            }
            ChunkEvent::MessageIdentityAssigned { new_id } => {
                state.assign_user_message_id(new_id);
            }
            ChunkEvent::TextDelta { text } => {
                state.status = SessionStatus::Streaming;
                state.append_text_delta(&text);
            }
            ChunkEvent::ToolInputStart { call_id, tool_name } => {
                state.status = SessionStatus::Streaming;
                state.start_tool_call(call_id, tool_name);
            }
            ChunkEvent::ToolInputDelta {
                call_id,
                input_text_delta,
            } => {
                state.status = SessionStatus::Streaming;
                state.append_tool_input(&call_id, &input_text_delta);
            }
            ChunkEvent::ToolInputAvailable { call_id, input } => {
                state.status = SessionStatus::Streaming;
                state.complete_tool_input(&call_id, input);
            }
            ChunkEvent::ToolOutputAvailable { call_id, output } => {
                state.status = SessionStatus::Streaming;
                state.complete_tool_output(&call_id, Ok(output));
            }
            ChunkEvent::ToolOutputError { call_id, error } => {
                state.status = SessionStatus::Streaming;
                state.complete_tool_output(&call_id, Err(error));
            }
            ChunkEvent::Finish => {
                state.finalize_open_parts();
                state.status = SessionStatus::Idle;
                self.publish(&state);
                return false;
            }
            // Partial content is not rolled back: the user keeps whatever
            // already streamed in, plus an error indicator.
            ChunkEvent::Error { message } => {
                state.status = SessionStatus::Error;
                state.last_error = Some(message);
                self.publish(&state);
                return false;
            }
        }

        self.publish(&state);
        true
    }

    async fn fail_exchange(&self, seq: u64, message: String) {
        let mut state = self.state.lock().await;
        if state.exchange_seq != seq || !state.status.is_active() {
            return;
        }
        warn!(key = %state.key, "exchange failed: {message}");
        state.status = SessionStatus::Error;
        state.last_error = Some(message);
        self.publish(&state);
    }

    async fn clear_active(&self, seq: u64) {
        let mut active = self.active.lock().await;
        if active.as_ref().is_some_and(|a| a.seq == seq) {
            *active = None;
        }
    }
}

/// Mutable per-session state. All mutation happens under the session mutex;
/// the chunk application helpers are synchronous and unit-tested directly.
struct SessionState {
    key: SessionKey,
    messages: Vec<Message>,
    status: SessionStatus,
    last_error: Option<String>,
    /// Monotonic per-send counter. Guards against a late chunk of a previous
    /// exchange mutating state even if the cancellation race is lost.
    exchange_seq: u64,
}

impl SessionState {
    fn new(key: SessionKey) -> Self {
        Self {
            key,
            messages: Vec::new(),
            status: SessionStatus::Idle,
            last_error: None,
            exchange_seq: 0,
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            key: self.key.clone(),
            messages: self.messages.clone(),
            status: self.status,
            last_error: self.last_error.clone(),
        }
    }

    /// The assistant message currently under construction, appending one if
    /// the conversation does not end with an assistant message.
    fn last_assistant_mut(&mut self) -> &mut Message {
        let ends_with_assistant =
            matches!(self.messages.last(), Some(m) if m.role == Role::Assistant);
        if !ends_with_assistant {
            self.messages.push(Message::assistant());
        }
        let idx = self.messages.len() - 1;
        &mut self.messages[idx]
    }

    fn append_text_delta(&mut self, delta: &str) {
        let message = self.last_assistant_mut();
        match message.parts.last_mut() {
            Some(MessagePart::Text(part)) if !part.done => part.text.push_str(delta),
            _ => message.parts.push(MessagePart::Text(TextPart {
                text: delta.to_string(),
                done: false,
            })),
        }
    }

    fn start_tool_call(&mut self, call_id: String, tool_name: String) {
        // A tool call closes the preceding text span; any later delta opens a
        // fresh one.
        self.finalize_open_parts();
        let message = self.last_assistant_mut();
        message
            .parts
            .push(MessagePart::ToolCall(ToolCallPart::started(
                call_id, tool_name,
            )));
    }

    fn tool_part_mut(&mut self, call_id: &str) -> Option<&mut ToolCallPart> {
        for message in self.messages.iter_mut().rev() {
            if message.role != Role::Assistant {
                continue;
            }
            for part in message.parts.iter_mut().rev() {
                if let MessagePart::ToolCall(part) = part
                    && part.call_id == call_id
                {
                    return Some(part);
                }
            }
        }
        None
    }

    fn append_tool_input(&mut self, call_id: &str, delta: &str) {
        match self.tool_part_mut(call_id) {
            Some(part) => part.input_fragments.push_str(delta),
            None => warn!(call_id, "tool input delta for unknown call"),
        }
    }

    fn complete_tool_input(&mut self, call_id: &str, input: serde_json::Value) {
        match self.tool_part_mut(call_id) {
            Some(part) => {
                part.input = Some(input);
                part.state = ToolCallState::InputAvailable;
            }
            None => warn!(call_id, "tool input for unknown call"),
        }
    }

    fn complete_tool_output(&mut self, call_id: &str, result: std::result::Result<serde_json::Value, String>) {
        match self.tool_part_mut(call_id) {
            Some(part) => match result {
                Ok(output) => {
                    part.output = Some(output);
                    part.state = ToolCallState::OutputAvailable;
                }
                Err(error) => {
                    part.error = Some(error);
                    part.state = ToolCallState::OutputError;
                }
            },
            None => warn!(call_id, "tool output for unknown call"),
        }
    }

    /// Rewrite the id of the most recent user message in place. No-op when no
    /// user message exists.
    fn assign_user_message_id(&mut self, new_id: MessageId) {
        if let Some(message) = self
            .messages
            .iter_mut()
            .rev()
            .find(|m| m.role == Role::User)
        {
            message.id = new_id;
        } else {
            debug!("message identity assigned but no user message present");
        }
    }

    fn finalize_open_parts(&mut self) {
        for message in &mut self.messages {
            for part in &mut message.parts {
                if let MessagePart::Text(part) = part {
                    part.done = true;
                }
            }
        }
    }
}
