//! In-memory session store backed by a `HashMap` behind a `Mutex`.

use async_trait::async_trait;
use pokenae_types::{Session, SessionId, SessionStore, error::Result, token::now_secs};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// An in-memory [`SessionStore`]. Expired sessions are never returned and are
/// dropped lazily on access or by [`InMemorySessionStore::purge_expired`].
pub struct InMemorySessionStore {
    data: Mutex<HashMap<SessionId, Session>>,
}

impl InMemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SessionId, Session>> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Removes every session whose lifetime has ended. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = now_secs();
        let mut data = self.lock();
        let before = data.len();
        data.retain(|_, s| !s.is_expired_at(now));
        let purged = before - data.len();
        if purged > 0 {
            tracing::debug!(purged, "expired sessions purged");
        }
        purged
    }

    /// Number of sessions currently held, expired or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, id: &SessionId) -> Result<Option<Session>> {
        let mut data = self.lock();
        match data.get(id) {
            Some(s) if s.is_expired_at(now_secs()) => {
                data.remove(id);
                Ok(None)
            }
            other => Ok(other.cloned()),
        }
    }

    async fn save(&self, session: &Session) -> Result<()> {
        self.lock().insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn remove(&self, id: &SessionId) -> Result<()> {
        self.lock().remove(id);
        Ok(())
    }

    async fn take_auth_state(&self, id: &SessionId) -> Result<Option<String>> {
        let now = now_secs();
        let mut data = self.lock();
        Ok(data
            .get_mut(id)
            .filter(|s| !s.is_expired_at(now))
            .and_then(|s| s.auth_state.take()))
    }
}
