//! Session token record and expiry logic.

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Value stored in [`SessionToken::error`] when a refresh attempt failed.
pub const REFRESH_ERROR: &str = "RefreshAccessTokenError";

/// Current time as epoch seconds.
#[must_use]
pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}

/// Current time as epoch milliseconds.
#[must_use]
pub fn now_millis() -> u64 {
    u64::try_from(
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_millis(),
    )
    .unwrap_or(u64::MAX)
}

/// The OAuth token pair held by an authenticated session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionToken {
    pub access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Epoch seconds after which the access token must not be reused.
    #[serde(
        rename = "accessTokenExpiresAt",
        skip_serializing_if = "Option::is_none"
    )]
    pub expires_at: Option<u64>,
    /// Set to [`REFRESH_ERROR`] when the last refresh failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SessionToken {
    /// Create a token with no expiry and no refresh token.
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expires_at: None,
            error: None,
        }
    }

    /// Set the expiry to `expires_in_secs` seconds from now.
    #[must_use]
    pub fn with_expiry(mut self, expires_in_secs: u64) -> Self {
        self.expires_at = Some(now_secs().saturating_add(expires_in_secs));
        self
    }

    /// Attach a refresh token.
    #[must_use]
    pub fn with_refresh(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    /// Return `true` once `now` has reached the expiry. Tokens without an
    /// expiry never expire.
    #[must_use]
    pub fn is_expired_at(&self, now: u64) -> bool {
        self.expires_at.is_some_and(|exp| now >= exp)
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_secs())
    }

    /// Determine the token state based on expiry and refresh availability.
    #[must_use]
    pub fn state_at(&self, now: u64) -> TokenState {
        if !self.is_expired_at(now) {
            TokenState::Valid
        } else if self.refresh_token.is_some() {
            TokenState::Expired
        } else {
            TokenState::Invalid
        }
    }

    #[must_use]
    pub fn state(&self) -> TokenState {
        self.state_at(now_secs())
    }

    /// Merge a freshly refreshed token into this one: the access token and
    /// expiry are replaced, the refresh token only when a new one was issued,
    /// and any previous refresh error is cleared.
    pub fn apply_refresh(&mut self, refreshed: SessionToken) {
        self.access_token = refreshed.access_token;
        self.expires_at = refreshed.expires_at;
        if refreshed.refresh_token.is_some() {
            self.refresh_token = refreshed.refresh_token;
        }
        self.error = None;
    }
}

/// Describes the usability state of a [`SessionToken`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenState {
    Valid,
    /// Expired but a refresh token is available for renewal.
    Expired,
    /// Expired with no refresh token; the token cannot be renewed.
    Invalid,
}
