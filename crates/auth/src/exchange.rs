//! [`TokenExchanger`] implementations.
//!
//! - [`GoogleExchanger`] talks to Google's token endpoint directly.
//! - [`BackendExchanger`] hands the code to the backend's authentication
//!   callback, which performs the exchange and returns its own session token.

use crate::google;
use async_trait::async_trait;
use pokenae_types::{GatewayError, SessionToken, TokenExchanger, error::Result};
use secrecy::{ExposeSecret as _, SecretString};
use std::time::Duration;

/// Limit applied to provider calls unless overridden with `with_timeout`.
pub const DEFAULT_OAUTH_TIMEOUT: Duration = Duration::from_secs(30);

/// Run a provider call, failing with [`GatewayError::Timeout`] once `limit`
/// has passed.
pub(crate) async fn timed<T>(
    limit: Duration,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(limit, call).await.map_err(|_| {
        GatewayError::Timeout(u64::try_from(limit.as_millis()).unwrap_or(u64::MAX))
    })?
}

/// Exchanges codes and refreshes tokens at the OAuth provider.
pub struct GoogleExchanger {
    http: rquest::Client,
    token_url: String,
    client_id: String,
    client_secret: SecretString,
    redirect_uri: String,
    timeout: Duration,
}

impl GoogleExchanger {
    pub fn new(
        http: rquest::Client,
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: SecretString,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            http,
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret,
            redirect_uri: redirect_uri.into(),
            timeout: DEFAULT_OAUTH_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn post_form(&self, params: &[(&'static str, String)]) -> Result<serde_json::Value> {
        let (status, json) = timed(self.timeout, async {
            let resp = self
                .http
                .post(&self.token_url)
                .header("Accept", "application/json")
                .form(params)
                .send()
                .await?;
            let status = resp.status();
            let json: serde_json::Value = resp.json().await.map_err(|e| {
                GatewayError::Auth(format!("failed to parse token response: {e}"))
            })?;
            Ok::<_, GatewayError>((status, json))
        })
        .await?;

        if !status.is_success() && json.get("error").is_none() {
            return Err(GatewayError::Auth(format!(
                "token endpoint returned {status}"
            )));
        }
        Ok(json)
    }
}

#[async_trait]
impl TokenExchanger for GoogleExchanger {
    async fn exchange_code(&self, code: &str, _state: &str) -> Result<SessionToken> {
        let params = google::token_form_params(
            &self.client_id,
            self.client_secret.expose_secret(),
            code,
            &self.redirect_uri,
        );
        let json = self.post_form(&params).await?;
        google::parse_token_response(&json)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<SessionToken> {
        let params = google::refresh_form_params(
            &self.client_id,
            self.client_secret.expose_secret(),
            refresh_token,
        );
        let json = self
            .post_form(&params)
            .await
            .map_err(|e| GatewayError::RefreshFailed(e.to_string()))?;
        google::parse_token_response(&json).map_err(|e| GatewayError::RefreshFailed(e.to_string()))
    }
}

/// Delegates the code exchange to `POST {callback_url}` with `{code, state}`.
///
/// The backend answers `{auth_token, expiresIn}` and never issues a refresh
/// token, so sessions created this way re-login when the token expires.
pub struct BackendExchanger {
    http: rquest::Client,
    callback_url: String,
    timeout: Duration,
}

impl BackendExchanger {
    pub fn new(http: rquest::Client, callback_url: impl Into<String>) -> Self {
        Self {
            http,
            callback_url: callback_url.into(),
            timeout: DEFAULT_OAUTH_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn post_code(&self, code: &str, state: &str) -> Result<serde_json::Value> {
        let resp = self
            .http
            .post(&self.callback_url)
            .header("Accept", "application/json")
            .json(&serde_json::json!({ "code": code, "state": state }))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "backend token exchange failed");
            return Err(GatewayError::Auth(format!(
                "token exchange failed: {}",
                error_message(&body)
            )));
        }

        resp.json()
            .await
            .map_err(|e| GatewayError::Auth(format!("failed to parse token response: {e}")))
    }
}

/// Pull a human-readable reason out of an error body.
fn error_message(body: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(json) => json
            .get("message")
            .or_else(|| json.get("error"))
            .and_then(serde_json::Value::as_str)
            .map_or_else(|| json.to_string(), str::to_string),
        Err(_) => body.to_string(),
    }
}

#[async_trait]
impl TokenExchanger for BackendExchanger {
    async fn exchange_code(&self, code: &str, state: &str) -> Result<SessionToken> {
        let json = timed(self.timeout, self.post_code(code, state)).await?;
        let access_token = json
            .get("auth_token")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| GatewayError::Auth("missing auth_token".into()))?;

        let mut token = SessionToken::new(access_token);
        if let Some(exp) = json.get("expiresIn").and_then(serde_json::Value::as_u64) {
            token = token.with_expiry(exp);
        }
        Ok(token)
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<SessionToken> {
        Err(GatewayError::RefreshFailed(
            "backend-issued tokens cannot be refreshed".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Form, Json, Router, http::StatusCode, routing::post};
    use std::collections::HashMap;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{addr}")
    }

    async fn fake_token_endpoint(Form(form): Form<HashMap<String, String>>) -> (StatusCode, Json<serde_json::Value>) {
        match form.get("grant_type").map(String::as_str) {
            Some("authorization_code") if form.get("code").map(String::as_str) == Some("abc") => (
                StatusCode::OK,
                Json(serde_json::json!({
                    "access_token": "tok1",
                    "refresh_token": "ref1",
                    "expires_in": 3600
                })),
            ),
            Some("refresh_token") if form.get("refresh_token").map(String::as_str) == Some("ref1") => (
                StatusCode::OK,
                Json(serde_json::json!({"access_token": "tok2", "expires_in": 3600})),
            ),
            _ => (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": "invalid_grant", "error_description": "Bad Request"})),
            ),
        }
    }

    fn google_exchanger(url: &str) -> GoogleExchanger {
        GoogleExchanger::new(
            rquest::Client::new(),
            format!("{url}/token"),
            "cid",
            SecretString::from("secret"),
            "http://localhost:3001/api/auth/callback",
        )
    }

    #[tokio::test]
    async fn test_google_exchange_and_refresh() {
        let url = serve(Router::new().route("/token", post(fake_token_endpoint))).await;
        let ex = google_exchanger(&url);

        let tok = ex.exchange_code("abc", "st").await.unwrap();
        assert_eq!(tok.access_token, "tok1");
        assert_eq!(tok.refresh_token.as_deref(), Some("ref1"));

        let refreshed = ex.refresh("ref1").await.unwrap();
        assert_eq!(refreshed.access_token, "tok2");
        assert!(refreshed.refresh_token.is_none());
    }

    #[tokio::test]
    async fn test_google_rejected_code() {
        let url = serve(Router::new().route("/token", post(fake_token_endpoint))).await;
        let err = google_exchanger(&url).exchange_code("bad", "st").await.unwrap_err();
        assert!(matches!(err, GatewayError::Auth(_)));
        assert!(err.to_string().contains("Bad Request"));
    }

    #[tokio::test]
    async fn test_google_rejected_refresh_is_refresh_failed() {
        let url = serve(Router::new().route("/token", post(fake_token_endpoint))).await;
        let err = google_exchanger(&url).refresh("stale").await.unwrap_err();
        assert!(matches!(err, GatewayError::RefreshFailed(_)));
    }

    #[tokio::test]
    async fn test_slow_token_endpoint_times_out() {
        let app = Router::new().route(
            "/token",
            post(|| async {
                tokio::time::sleep(Duration::from_millis(500)).await;
                Json(serde_json::json!({"access_token": "late"}))
            }),
        );
        let url = serve(app).await;
        let ex = google_exchanger(&url).with_timeout(Duration::from_millis(100));

        let err = ex.exchange_code("abc", "st").await.unwrap_err();
        assert!(matches!(err, GatewayError::Timeout(100)));

        let err = ex.refresh("ref1").await.unwrap_err();
        assert!(matches!(err, GatewayError::RefreshFailed(_)));
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_unreachable_token_endpoint_is_network_error() {
        let err = google_exchanger("http://127.0.0.1:9")
            .exchange_code("abc", "st")
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Http(_)));
    }

    #[tokio::test]
    async fn test_backend_delegate_exchange() {
        let app = Router::new().route(
            "/api/authentication/callback",
            post(|Json(body): Json<serde_json::Value>| async move {
                if body["code"] == "abc" && body["state"] == "st" {
                    (
                        StatusCode::OK,
                        Json(serde_json::json!({"auth_token": "backend-tok", "expiresIn": 600})),
                    )
                } else {
                    (
                        StatusCode::UNAUTHORIZED,
                        Json(serde_json::json!({"message": "invalid code"})),
                    )
                }
            }),
        );
        let url = serve(app).await;
        let ex = BackendExchanger::new(
            rquest::Client::new(),
            format!("{url}/api/authentication/callback"),
        );

        let tok = ex.exchange_code("abc", "st").await.unwrap();
        assert_eq!(tok.access_token, "backend-tok");
        assert!(tok.expires_at.is_some());
        assert!(tok.refresh_token.is_none());

        let err = ex.exchange_code("nope", "st").await.unwrap_err();
        assert!(err.to_string().contains("invalid code"));

        assert!(matches!(
            ex.refresh("x").await.unwrap_err(),
            GatewayError::RefreshFailed(_)
        ));
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(error_message(r#"{"message":"m"}"#), "m");
        assert_eq!(error_message(r#"{"error":"e"}"#), "e");
        assert_eq!(error_message("plain"), "plain");
    }
}
