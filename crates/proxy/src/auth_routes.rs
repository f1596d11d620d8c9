//! Login, callback, logout and session-status routes.
//!
//! Routes:
//! - `GET  /api/auth/login?callbackUrl=…` -> 302 to the Google consent screen.
//! - `GET  /api/auth/callback` (and `/callback`) -> 302 to the stored URL with
//!   a cookie for the rotated session id, or an error page that returns home
//!   after 5 seconds.
//! - `POST /api/auth/logout` -> success envelope, session cookie expired.
//! - `GET  /api/auth/session` -> `{authenticated, user?, expiresAt?, error?}`.
use crate::{
    AppState,
    error::{ApiError, EnvelopeResponse},
};
use axum::{
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{Html, IntoResponse, Response},
};
use pokenae_auth::CallbackParams;
use pokenae_types::{Envelope, GatewayError, UserProfile};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Seconds the error page waits before returning home.
const ERROR_REDIRECT_SECS: u32 = 5;

#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    #[serde(rename = "callbackUrl")]
    pub callback_url: Option<String>,
}

fn user_agent(headers: &HeaderMap) -> &str {
    headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

fn redirect(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(v) => (StatusCode::FOUND, [(header::LOCATION, v)]).into_response(),
        Err(_) => (StatusCode::FOUND, [(header::LOCATION, HeaderValue::from_static("/"))])
            .into_response(),
    }
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LoginQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let existing = state.cookies.read(&headers);
    let mut session = state.login.session_or_new(existing.as_ref()).await?;
    let url = state
        .login
        .begin(&mut session, query.callback_url.as_deref(), user_agent(&headers))
        .await?;

    let mut resp = redirect(&url);
    resp.headers_mut()
        .insert(header::SET_COOKIE, state.cookies.set(&session.id));
    Ok(resp)
}

pub async fn callback(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CallbackParams>,
    headers: HeaderMap,
) -> Response {
    let Some(session_id) = state.cookies.read(&headers) else {
        tracing::warn!("oauth callback without a session cookie");
        return error_page(&GatewayError::StateInvalid(
            "no pending login for this browser".into(),
        ));
    };

    match state
        .login
        .complete(&session_id, &params, user_agent(&headers))
        .await
    {
        Ok(outcome) => {
            let mut resp = redirect(&outcome.redirect);
            resp.headers_mut()
                .insert(header::SET_COOKIE, state.cookies.set(&outcome.session_id));
            resp
        }
        Err(e) => error_page(&e),
    }
}

pub async fn logout(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if let Some(id) = state.cookies.read(&headers)
        && let Err(e) = state.auth.logout(&id).await
    {
        return ApiError(e).into_response();
    }
    let mut resp = EnvelopeResponse(Envelope::Success {
        data: serde_json::Value::Null,
        message: Some("Logged out".into()),
    })
    .into_response();
    resp.headers_mut()
        .insert(header::SET_COOKIE, state.cookies.clear());
    resp
}

/// Browser-visible view of a session. Tokens never leave the server.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserProfile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub async fn session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let mut status = SessionStatus::default();
    if let Some(id) = state.cookies.read(&headers)
        && let Some(session) = state.auth.store().load(&id).await?
    {
        if session.is_authenticated() {
            let token = state.auth.get_token(&id).await?;
            status.authenticated = true;
            status.user = session.user;
            status.expires_at = token.expires_at;
            status.error = token.error;
        } else {
            status.error = session.error;
        }
    }
    let data = serde_json::to_value(status).map_err(GatewayError::from)?;
    Ok(EnvelopeResponse(Envelope::success(data)).into_response())
}

fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn error_page(err: &GatewayError) -> Response {
    let status = StatusCode::from_u16(err.code().http_status())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let code = err.code();
    let message = html_escape(&err.to_string());
    let secs = ERROR_REDIRECT_SECS;
    let body = format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta http-equiv="refresh" content="{secs};url=/">
<title>Login failed</title>
</head>
<body>
<h1>Login failed</h1>
<p>{message}</p>
<p><small>{code}</small></p>
<p>Returning to the home page in <span id="countdown">{secs}</span> seconds. <a href="/">Go now</a></p>
<script>
let n = {secs};
const el = document.getElementById("countdown");
setInterval(() => {{ if (n > 0) {{ n -= 1; el.textContent = n; }} }}, 1000);
</script>
</body>
</html>
"#
    );
    (status, Html(body)).into_response()
}
