//! Async traits shared across all pokenae crates.
//!
//! Every cross-crate abstraction is defined here so that higher layers depend
//! only on `pokenae-types`, not on each other.

use crate::{Session, SessionId, SessionToken, error::Result};
use async_trait::async_trait;
use std::time::Duration;

/// Server-side session storage keyed by [`SessionId`].
///
/// Implementations must not hand out sessions whose `expires_at` has passed.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load a live session.
    async fn load(&self, id: &SessionId) -> Result<Option<Session>>;
    /// Insert or overwrite a session.
    async fn save(&self, session: &Session) -> Result<()>;
    /// Delete a session. Removing an unknown id is not an error.
    async fn remove(&self, id: &SessionId) -> Result<()>;

    /// Atomically take the pending OAuth state out of a session.
    ///
    /// The default implementation is a load-modify-save; stores shared between
    /// processes should override it with a single atomic operation.
    async fn take_auth_state(&self, id: &SessionId) -> Result<Option<String>> {
        let Some(mut session) = self.load(id).await? else {
            return Ok(None);
        };
        let state = session.auth_state.take();
        if state.is_some() {
            self.save(&session).await?;
        }
        Ok(state)
    }
}

/// A short-lived set of already-seen keys, used to make callbacks idempotent.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Record `key` for `ttl`. Returns `true` if the key was not already
    /// present (the caller owns the operation), `false` if it was.
    async fn claim(&self, key: &str, ttl: Duration) -> Result<bool>;
}

/// Turns an authorization code into tokens and renews them.
#[async_trait]
pub trait TokenExchanger: Send + Sync {
    /// Exchange an authorization `code` (and its validated `state`) for tokens.
    async fn exchange_code(&self, code: &str, state: &str) -> Result<SessionToken>;
    /// Obtain a new access token using a refresh token.
    async fn refresh(&self, refresh_token: &str) -> Result<SessionToken>;
}
