//! Server-side session record.
//!
//! The browser only ever holds a signed cookie carrying the [`SessionId`];
//! tokens, the pending OAuth state, and the user profile stay on the server.

use crate::SessionToken;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque session identifier (a random UUID v4 in practice).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a session stands in the login state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginPhase {
    #[default]
    Idle,
    AuthorizationRequested,
    Authenticated,
    Failed,
}

/// Google userinfo profile of the signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    /// Epoch seconds.
    pub created_at: u64,
    /// Epoch seconds after which the session is discarded.
    pub expires_at: u64,
    pub phase: LoginPhase,
    /// Pending OAuth `state`, consumed by the first successful validation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_state: Option<String>,
    /// Where to send the user after a successful login.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<SessionToken>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserProfile>,
    /// Why the last login attempt failed, shown until the next attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Session {
    /// A fresh, unauthenticated session living for `max_age_secs`.
    pub fn new(id: SessionId, now: u64, max_age_secs: u64) -> Self {
        Self {
            id,
            created_at: now,
            expires_at: now.saturating_add(max_age_secs),
            phase: LoginPhase::Idle,
            auth_state: None,
            redirect_url: None,
            token: None,
            user: None,
            error: None,
        }
    }

    #[must_use]
    pub fn is_expired_at(&self, now: u64) -> bool {
        now >= self.expires_at
    }

    /// A session is authenticated once it holds a token and has completed
    /// the login flow.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.phase == LoginPhase::Authenticated && self.token.is_some()
    }

    /// Drops everything tied to a login attempt or signed-in user.
    pub fn reset(&mut self) {
        self.phase = LoginPhase::Idle;
        self.auth_state = None;
        self.redirect_url = None;
        self.token = None;
        self.user = None;
        self.error = None;
    }

    /// Ends a login attempt as failed, keeping only the reason.
    pub fn fail(&mut self, reason: impl Into<String>) {
        self.reset();
        self.phase = LoginPhase::Failed;
        self.error = Some(reason.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_is_idle() {
        let s = Session::new(SessionId::new("abc"), 100, 50);
        assert_eq!(s.phase, LoginPhase::Idle);
        assert_eq!(s.expires_at, 150);
        assert!(!s.is_authenticated());
        assert!(!s.is_expired_at(149));
        assert!(s.is_expired_at(150));
    }

    #[test]
    fn test_authenticated_requires_token() {
        let mut s = Session::new(SessionId::new("abc"), 0, 10);
        s.phase = LoginPhase::Authenticated;
        assert!(!s.is_authenticated());
        s.token = Some(SessionToken::new("tok"));
        assert!(s.is_authenticated());
    }

    #[test]
    fn test_reset_clears_login_data() {
        let mut s = Session::new(SessionId::new("abc"), 0, 10);
        s.phase = LoginPhase::Authenticated;
        s.auth_state = Some("st".into());
        s.token = Some(SessionToken::new("tok"));
        s.reset();
        assert_eq!(s.phase, LoginPhase::Idle);
        assert!(s.auth_state.is_none());
        assert!(s.token.is_none());
    }

    #[test]
    fn test_fail_keeps_reason_only() {
        let mut s = Session::new(SessionId::new("abc"), 0, 10);
        s.auth_state = Some("st".into());
        s.fail("access_denied");
        assert_eq!(s.phase, LoginPhase::Failed);
        assert_eq!(s.error.as_deref(), Some("access_denied"));
        assert!(s.auth_state.is_none());
    }

    #[test]
    fn test_session_id_serializes_transparently() {
        let id = SessionId::new("xyz");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"xyz\"");
        assert_eq!(id.to_string(), "xyz");
    }
}
