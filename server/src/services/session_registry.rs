use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use crate::metrics::{SESSIONS_ACTIVE, SESSIONS_TOTAL};
use crate::models::SessionState;

pub type SharedSession = Arc<Mutex<SessionState>>;

/// In-memory session table. Each session sits behind its own mutex so
/// requests against the same session serialize while different sessions
/// proceed independently. Sessions live until the client ends them or the
/// process restarts.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<RwLock<HashMap<String, SharedSession>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self, player_name: Option<String>) -> SharedSession {
        let id = Uuid::new_v4().to_string();
        let session = Arc::new(Mutex::new(SessionState::new(id.clone(), player_name)));
        self.inner.write().await.insert(id.clone(), session.clone());

        SESSIONS_TOTAL.with_label_values(&["created"]).inc();
        SESSIONS_ACTIVE.inc();
        info!("Created session {}", id);
        session
    }

    pub async fn get(&self, id: &str) -> Option<SharedSession> {
        self.inner.read().await.get(id).cloned()
    }

    pub async fn remove(&self, id: &str) -> bool {
        let removed = self.inner.write().await.remove(id).is_some();
        if removed {
            SESSIONS_TOTAL.with_label_values(&["ended"]).inc();
            SESSIONS_ACTIVE.dec();
            info!("Ended session {}", id);
        } else {
            debug!("Ignoring end request for unknown session {}", id);
        }
        removed
    }

    pub async fn active_count(&self) -> usize {
        self.inner.read().await.len()
    }
}
