use std::sync::Arc;

use coral_protocol::SessionKey;
use tokio::sync::Mutex;
use tracing::debug;

use crate::registry::SessionRegistry;
use crate::session::SessionStatus;

/// Bounds memory by disposing sessions that are neither streaming nor being
/// viewed.
///
/// A session left `Submitted`/`Streaming` stays registered so its exchange
/// can finish unobserved and be resumed if the user returns before it
/// completes; resumption shows the latest state without re-sending.
pub struct LifecycleController {
    registry: Arc<SessionRegistry>,
    viewed: Mutex<Option<SessionKey>>,
}

impl LifecycleController {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self {
            registry,
            viewed: Mutex::new(None),
        }
    }

    /// The view moved to `next` (or away from any conversation). Disposes the
    /// previously viewed session if it exists and is inactive.
    pub async fn on_view_change(&self, next: Option<SessionKey>) {
        let previous = {
            let mut viewed = self.viewed.lock().await;
            std::mem::replace(&mut *viewed, next.clone())
        };
        let Some(previous) = previous else {
            return;
        };
        if next.as_ref() == Some(&previous) {
            return;
        }
        let Some(session) = self.registry.get(&previous).await else {
            return;
        };
        match session.status() {
            SessionStatus::Idle | SessionStatus::Error => {
                debug!(key = %previous, "disposing session no longer in view");
                self.registry.dispose(&previous).await;
            }
            SessionStatus::Submitted | SessionStatus::Streaming => {
                debug!(key = %previous, "leaving streaming session registered");
            }
        }
    }

    pub async fn viewed(&self) -> Option<SessionKey> {
        self.viewed.lock().await.clone()
    }
}
