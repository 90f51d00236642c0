use std::collections::HashMap;
use std::sync::Arc;

use coral_protocol::SessionKey;
use tokio::sync::Mutex;
use tracing::debug;
use tracing::error;
use tracing::warn;

use crate::error::CoralErr;
use crate::error::Result;
use crate::session::ChatSession;

/// Process-wide table mapping a session key to at most one live session.
///
/// A plain constructible object rather than a global: the manager owns one
/// per application process, and tests build as many independent registries as
/// they need. Every operation takes the single table lock, so no two
/// sessions can transiently exist for one key.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<SessionKey, Arc<ChatSession>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: &SessionKey) -> Option<Arc<ChatSession>> {
        self.sessions.lock().await.get(key).cloned()
    }

    pub async fn contains(&self, key: &SessionKey) -> bool {
        self.sessions.lock().await.contains_key(key)
    }

    /// Return the session for `key`, constructing and registering one with
    /// `make` if absent. The boolean reports whether a session was created.
    pub async fn get_or_create(
        &self,
        key: &SessionKey,
        make: impl FnOnce() -> Arc<ChatSession>,
    ) -> (Arc<ChatSession>, bool) {
        let mut sessions = self.sessions.lock().await;
        if let Some(session) = sessions.get(key) {
            return (Arc::clone(session), false);
        }
        debug!(%key, "registering new session");
        let session = make();
        sessions.insert(key.clone(), Arc::clone(&session));
        (session, true)
    }

    /// Move the session from `old` to `new` atomically, updating the
    /// session's own key cell under the same table lock.
    ///
    /// Re-keying happens once per logical conversation, from its provisional
    /// to its permanent identity, so a session already present under `new` is
    /// discarded last-write-wins. Server-assigned identifiers are unique;
    /// displacing a session that is actively streaming means an upstream
    /// invariant broke, so that case asserts loudly instead of staying
    /// silent.
    pub async fn rekey(&self, old: &SessionKey, new: SessionKey) -> Result<Arc<ChatSession>> {
        let mut sessions = self.sessions.lock().await;
        let Some(session) = sessions.remove(old) else {
            return Err(CoralErr::SessionNotFound(old.clone()));
        };
        session.set_key(new.clone()).await;
        if let Some(displaced) = sessions.insert(new.clone(), Arc::clone(&session)) {
            if displaced.status().is_active() {
                debug_assert!(false, "rekey displaced a streaming session at `{new}`");
                error!(key = %new, "rekey displaced a streaming session");
            } else {
                warn!(key = %new, "rekey displaced an existing session");
            }
        }
        debug!(%old, %new, "session re-keyed");
        Ok(session)
    }

    /// Remove the mapping for `key`. Idempotent: disposing an absent key is a
    /// no-op and returns `false`.
    pub async fn dispose(&self, key: &SessionKey) -> bool {
        let removed = self.sessions.lock().await.remove(key).is_some();
        if removed {
            debug!(%key, "session disposed");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }
}
