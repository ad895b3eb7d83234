//! In-memory session store.
//!
//! Each user id maps to one [`SessionHandle`]. A handle carries two locks:
//! the turn lock is held for the whole handling of one inbound message, so
//! messages from the same user never interleave; the state lock guards the
//! record itself and is only held for short synchronous edits. That split
//! lets the agent's extraction tool write into a session while the owning
//! turn is suspended on the agent call.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use super::model::Session;
use super::step::Step;

/// Shared per-user session slot.
pub struct SessionHandle {
    user_id: String,
    turn: Arc<Mutex<()>>,
    state: Mutex<Session>,
}

impl SessionHandle {
    fn new(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            turn: Arc::new(Mutex::new(())),
            state: Mutex::new(Session::new(user_id)),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Wait for exclusive use of this session for one message.
    pub async fn begin_turn(&self) -> OwnedMutexGuard<()> {
        Arc::clone(&self.turn).lock_owned().await
    }

    /// Run a synchronous edit against the session record.
    pub async fn update<R>(&self, f: impl FnOnce(&mut Session) -> R) -> R {
        let mut session = self.state.lock().await;
        f(&mut session)
    }

    /// Clone the current record.
    pub async fn snapshot(&self) -> Session {
        self.state.lock().await.clone()
    }

    pub async fn step(&self) -> Step {
        self.state.lock().await.step
    }
}

/// Maps external user ids to sessions; lazily creates on first contact.
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<SessionHandle>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the session for `user_id`, creating it if absent.
    pub async fn get_or_create(&self, user_id: &str) -> Arc<SessionHandle> {
        if let Some(handle) = self.sessions.read().await.get(user_id) {
            return Arc::clone(handle);
        }
        let mut sessions = self.sessions.write().await;
        let handle = sessions.entry(user_id.to_string()).or_insert_with(|| {
            tracing::info!(user_id = %user_id, "Created new session");
            Arc::new(SessionHandle::new(user_id))
        });
        Arc::clone(handle)
    }

    /// Get an existing session without creating one.
    pub async fn get(&self, user_id: &str) -> Option<Arc<SessionHandle>> {
        self.sessions.read().await.get(user_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
