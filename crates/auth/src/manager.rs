//! Access-token lifecycle for authenticated sessions.
//!
//! Responsibilities:
//! - Load the session's token from a [`SessionStore`].
//! - Reuse it while `now < expires_at`; otherwise refresh through the
//!   configured [`TokenExchanger`].
//! - Single-flight refresh per session: concurrent callers wait on a
//!   per-session async lock and reuse the first caller's result.
//! - Cooldown after a failed refresh (30 s) during which the stale token is
//!   returned with its error flag instead of calling the provider again.
//! - Logout takes the same per-session lock, so an in-flight refresh can never
//!   write a removed session back.
use pokenae_types::{
    GatewayError, REFRESH_ERROR, Session, SessionId, SessionStore, SessionToken, TokenExchanger,
    TokenState, error::Result, token::now_secs,
};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};
use tokio::time::Instant;

const REFRESH_COOLDOWN: Duration = Duration::from_secs(30);

#[derive(Default)]
struct RefreshState {
    lock: Arc<tokio::sync::Mutex<()>>,
    last_failure: Option<Instant>,
}

impl RefreshState {
    /// Nobody holds or waits on the lock and no cooldown is pending.
    fn is_idle(&self) -> bool {
        Arc::strong_count(&self.lock) == 1
            && self
                .last_failure
                .is_none_or(|at| at.elapsed() >= REFRESH_COOLDOWN)
    }
}

pub struct AuthManager {
    store: Arc<dyn SessionStore>,
    exchanger: Arc<dyn TokenExchanger>,
    state: Mutex<HashMap<SessionId, RefreshState>>,
}

impl AuthManager {
    pub fn new(store: Arc<dyn SessionStore>, exchanger: Arc<dyn TokenExchanger>) -> Self {
        Self {
            store,
            exchanger,
            state: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    #[must_use]
    pub fn exchanger(&self) -> &Arc<dyn TokenExchanger> {
        &self.exchanger
    }

    fn refresh_state(&self) -> MutexGuard<'_, HashMap<SessionId, RefreshState>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn session_lock(&self, id: &SessionId) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(&self.refresh_state().entry(id.clone()).or_default().lock)
    }

    /// Drop refresh bookkeeping for sessions with no refresh in flight and no
    /// active cooldown. Returns how many entries were removed.
    pub fn prune_refresh_state(&self) -> usize {
        let mut state = self.refresh_state();
        let before = state.len();
        state.retain(|_, s| !s.is_idle());
        before - state.len()
    }

    /// Load the session if it exists, is unexpired and has completed login.
    ///
    /// # Errors
    ///
    /// Returns an error if the session store fails.
    pub async fn active_session(&self, id: &SessionId) -> Result<Option<Session>> {
        Ok(self.store.load(id).await?.filter(Session::is_authenticated))
    }

    /// Return a token for the session, refreshing it first when it has expired
    /// and a refresh token is available.
    ///
    /// A failed refresh does not fail the call: the existing token is returned
    /// with `error` set to [`REFRESH_ERROR`].
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Unauthorized`] if the session is missing or not
    /// authenticated, or a storage error.
    pub async fn get_token(&self, id: &SessionId) -> Result<SessionToken> {
        let token = self
            .active_session(id)
            .await?
            .and_then(|s| s.token)
            .ok_or(GatewayError::Unauthorized)?;

        match token.state() {
            TokenState::Valid | TokenState::Invalid => Ok(token),
            TokenState::Expired => self.refresh_session(id).await,
        }
    }

    /// Remove the session and forget its refresh bookkeeping. Waits for an
    /// in-flight refresh of the same session to finish first.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails to remove the session.
    pub async fn logout(&self, id: &SessionId) -> Result<()> {
        let lock = self.session_lock(id);
        let guard = lock.lock().await;
        let removed = self.store.remove(id).await;
        drop(guard);
        self.refresh_state().remove(id);
        removed
    }

    async fn refresh_session(&self, id: &SessionId) -> Result<SessionToken> {
        let lock = self.session_lock(id);
        let result = self.refresh_locked(id, &lock).await;
        drop(lock);
        self.prune_refresh_state();
        result
    }

    async fn refresh_locked(
        &self,
        id: &SessionId,
        lock: &tokio::sync::Mutex<()>,
    ) -> Result<SessionToken> {
        let _guard = lock.lock().await;

        // Another caller may have refreshed while we waited.
        let mut session = self
            .active_session(id)
            .await?
            .ok_or(GatewayError::Unauthorized)?;
        let Some(token) = session.token.as_mut() else {
            return Err(GatewayError::Unauthorized);
        };
        let Some(refresh_token) = token.refresh_token.clone() else {
            return Ok(token.clone());
        };
        if !token.is_expired_at(now_secs()) {
            return Ok(token.clone());
        }

        let cooling_down = self
            .refresh_state()
            .get(id)
            .and_then(|s| s.last_failure)
            .is_some_and(|at| at.elapsed() < REFRESH_COOLDOWN);
        if cooling_down {
            tracing::debug!(session = %id, "refresh cooldown active, returning stale token");
            return Ok(token.clone());
        }

        match self.exchanger.refresh(&refresh_token).await {
            Ok(refreshed) => {
                token.apply_refresh(refreshed);
                if let Some(s) = self.refresh_state().get_mut(id) {
                    s.last_failure = None;
                }
                tracing::info!(session = %id, "access token refreshed");
            }
            Err(e) => {
                tracing::warn!(session = %id, error = %e, "access token refresh failed");
                token.error = Some(REFRESH_ERROR.to_string());
                self.refresh_state().entry(id.clone()).or_default().last_failure =
                    Some(Instant::now());
            }
        }

        let token = token.clone();
        self.store.save(&session).await?;
        Ok(token)
    }

    #[cfg(test)]
    fn refresh_entries(&self) -> usize {
        self.refresh_state().len()
    }
}
