//! Browser login flow: authorization redirect and callback handling.

use crate::{AuthManager, google, state};
use pokenae_config::OAuthConfig;
use pokenae_types::{
    GatewayError, IdempotencyStore, LoginPhase, Session, SessionId, error::Result,
    token::{now_millis, now_secs},
};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::{sync::Arc, time::Duration};

/// How long a consumed authorization code is remembered.
pub const CODE_REPLAY_TTL: Duration = Duration::from_secs(10 * 60);

/// Query parameters Google appends to the redirect URI.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Only same-origin relative paths are honored as post-login targets.
#[must_use]
pub fn sanitize_redirect(target: Option<&str>) -> String {
    match target {
        Some(t) if t.starts_with('/') && !t.starts_with("//") && !t.starts_with("/\\") => {
            t.to_string()
        }
        _ => "/".to_string(),
    }
}

/// Idempotency key of an authorization code; the code itself is never stored.
#[must_use]
pub fn code_key(code: &str) -> String {
    hex::encode(Sha256::digest(code.as_bytes()))
}

pub struct LoginFlow {
    auth: Arc<AuthManager>,
    idempotency: Arc<dyn IdempotencyStore>,
    http: rquest::Client,
    oauth: OAuthConfig,
    client_id: String,
    redirect_uri: String,
    session_max_age: u64,
}

impl LoginFlow {
    pub fn new(
        auth: Arc<AuthManager>,
        idempotency: Arc<dyn IdempotencyStore>,
        http: rquest::Client,
        oauth: OAuthConfig,
        client_id: impl Into<String>,
        redirect_uri: impl Into<String>,
        session_max_age: u64,
    ) -> Self {
        Self {
            auth,
            idempotency,
            http,
            oauth,
            client_id: client_id.into(),
            redirect_uri: redirect_uri.into(),
            session_max_age,
        }
    }

    /// Load a live session or start a new one under a random id.
    ///
    /// # Errors
    ///
    /// Returns an error if the session store fails.
    pub async fn session_or_new(&self, id: Option<&SessionId>) -> Result<Session> {
        if let Some(id) = id
            && let Some(session) = self.auth.store().load(id).await?
        {
            return Ok(session);
        }
        let id = SessionId::new(uuid_v4());
        Ok(Session::new(id, now_secs(), self.session_max_age))
    }

    /// Start a login: store a fresh state and the sanitized return URL in the
    /// session and return the provider authorization URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be encoded or the store fails.
    pub async fn begin(
        &self,
        session: &mut Session,
        callback_url: Option<&str>,
        user_agent: &str,
    ) -> Result<String> {
        let state = state::StatePayload::generate(user_agent, now_millis()).encode()?;
        let url = google::build_auth_url(&self.oauth, &self.client_id, &self.redirect_uri, &state)?;

        session.reset();
        session.phase = LoginPhase::AuthorizationRequested;
        session.auth_state = Some(state);
        session.redirect_url = Some(sanitize_redirect(callback_url));
        self.auth.store().save(session).await?;

        tracing::info!(session = %session.id, "login started");
        Ok(url)
    }

    /// Finish a login from the provider callback.
    ///
    /// On success the session is moved to a fresh id, which the caller must
    /// hand back to the browser, and the post-login URL is returned.
    ///
    /// A failure ends the attempt: a pending session is reset to `Failed` with
    /// the reason recorded, and the error is returned for display. Sessions
    /// that are already signed in, and sessions hit by a reused code, are left
    /// untouched.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::Auth`] for provider errors, missing code, replayed
    ///   codes or a failed exchange.
    /// - [`GatewayError::StateInvalid`] / [`GatewayError::StateExpired`] for
    ///   state validation failures.
    /// - [`GatewayError::Timeout`] when the provider does not answer in time.
    pub async fn complete(
        &self,
        id: &SessionId,
        params: &CallbackParams,
        user_agent: &str,
    ) -> Result<LoginOutcome> {
        match self.try_complete(id, params, user_agent).await {
            Ok(Completion::Fresh(outcome)) => Ok(outcome),
            Ok(Completion::Replayed(outcome)) => {
                tracing::info!(session = %id, "duplicate callback for authenticated session");
                Ok(outcome)
            }
            Ok(Completion::CodeReused) => {
                tracing::warn!(session = %id, "authorization code already used");
                Err(GatewayError::Auth(
                    "authorization code has already been used".into(),
                ))
            }
            Err(e) => {
                tracing::warn!(session = %id, code = %e.code(), error = %e, "login failed");
                if let Some(mut session) = self.auth.store().load(id).await?
                    && session.phase != LoginPhase::Authenticated
                {
                    session.fail(e.to_string());
                    self.auth.store().save(&session).await?;
                }
                Err(e)
            }
        }
    }

    async fn try_complete(
        &self,
        id: &SessionId,
        params: &CallbackParams,
        user_agent: &str,
    ) -> Result<Completion> {
        if let Some(err) = &params.error {
            let reason = params.error_description.as_deref().unwrap_or(err.as_str());
            return Err(GatewayError::Auth(format!("provider returned error: {reason}")));
        }
        let code = params
            .code
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| GatewayError::Auth("missing code parameter in callback".into()))?;
        let received_state = params.state.as_deref().unwrap_or_default();

        if !self.idempotency.claim(&code_key(code), CODE_REPLAY_TTL).await? {
            return Ok(match self.auth.active_session(id).await? {
                Some(session) => Completion::Replayed(LoginOutcome {
                    session_id: session.id,
                    redirect: session.redirect_url.unwrap_or_else(|| "/".into()),
                }),
                None => Completion::CodeReused,
            });
        }

        let stored = self.auth.store().take_auth_state(id).await?;
        state::validate_state(stored.as_deref(), received_state, user_agent, now_millis())?;

        let token = self.auth.exchanger().exchange_code(code, received_state).await?;
        let user = if self.oauth.fetch_profile {
            let profile = google::fetch_user_profile(
                &self.http,
                &self.oauth.userinfo_url,
                &token.access_token,
                self.oauth.timeout(),
            )
            .await?;
            Some(profile)
        } else {
            None
        };

        let mut session = self
            .auth
            .store()
            .load(id)
            .await?
            .ok_or_else(|| GatewayError::StateInvalid("session ended during login".into()))?;

        // Signed-in sessions never keep their pre-login id.
        let previous = std::mem::replace(&mut session.id, SessionId::new(uuid_v4()));
        session.phase = LoginPhase::Authenticated;
        session.token = Some(token);
        session.user = user;
        session.error = None;
        let redirect = session.redirect_url.clone().unwrap_or_else(|| "/".into());
        self.auth.store().save(&session).await?;
        self.auth.store().remove(&previous).await?;

        tracing::info!(session = %session.id, "login completed");
        Ok(Completion::Fresh(LoginOutcome {
            session_id: session.id,
            redirect,
        }))
    }
}

/// A finished login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginOutcome {
    /// Session the browser must present from now on.
    pub session_id: SessionId,
    /// Where to send the browser next.
    pub redirect: String,
}

enum Completion {
    Fresh(LoginOutcome),
    Replayed(LoginOutcome),
    CodeReused,
}

fn uuid_v4() -> String {
    uuid::Uuid::new_v4().to_string()
}
