//! Google OAuth 2.0 authorization code flow.
//!
//! URL building, token-endpoint form parameters and response parsing. The
//! endpoints and scopes come from [`OAuthConfig`] so tests can point them at
//! a local server.

use crate::exchange::timed;
use pokenae_config::OAuthConfig;
use pokenae_types::{GatewayError, SessionToken, UserProfile, error::Result};
use std::time::Duration;

/// Build the authorization URL the browser is redirected to.
///
/// Requests offline access and forces the consent screen so Google returns a
/// refresh token on every login.
///
/// # Errors
///
/// Returns an error if the query string cannot be encoded.
pub fn build_auth_url(
    oauth: &OAuthConfig,
    client_id: &str,
    redirect_uri: &str,
    state: &str,
) -> Result<String> {
    let scope = oauth.scopes.join(" ");
    let query = serde_urlencoded::to_string([
        ("response_type", "code"),
        ("client_id", client_id),
        ("redirect_uri", redirect_uri),
        ("scope", scope.as_str()),
        ("state", state),
        ("access_type", "offline"),
        ("prompt", "consent"),
    ])
    .map_err(|e| GatewayError::Auth(format!("failed to encode authorization url: {e}")))?;
    Ok(format!("{}?{query}", oauth.auth_url))
}

/// Form parameters for exchanging an authorization code.
#[must_use]
pub fn token_form_params(
    client_id: &str,
    client_secret: &str,
    code: &str,
    redirect_uri: &str,
) -> Vec<(&'static str, String)> {
    vec![
        ("grant_type", "authorization_code".into()),
        ("client_id", client_id.into()),
        ("client_secret", client_secret.into()),
        ("code", code.into()),
        ("redirect_uri", redirect_uri.into()),
    ]
}

/// Form parameters for a `refresh_token` grant.
#[must_use]
pub fn refresh_form_params(
    client_id: &str,
    client_secret: &str,
    refresh_token: &str,
) -> Vec<(&'static str, String)> {
    vec![
        ("grant_type", "refresh_token".into()),
        ("client_id", client_id.into()),
        ("client_secret", client_secret.into()),
        ("refresh_token", refresh_token.into()),
    ]
}

/// Parse the token endpoint JSON response into a [`SessionToken`].
///
/// # Errors
///
/// Returns an error if the response carries an `error` or lacks `access_token`.
pub fn parse_token_response(json: &serde_json::Value) -> Result<SessionToken> {
    if let Some(err) = json.get("error").and_then(serde_json::Value::as_str) {
        let desc = json
            .get("error_description")
            .and_then(serde_json::Value::as_str)
            .unwrap_or(err);
        return Err(GatewayError::Auth(format!("token endpoint error: {desc}")));
    }

    let access_token = json
        .get("access_token")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| GatewayError::Auth("missing access_token".into()))?;

    let mut token = SessionToken::new(access_token);
    if let Some(r) = json
        .get("refresh_token")
        .and_then(serde_json::Value::as_str)
    {
        token = token.with_refresh(r);
    }
    if let Some(exp) = json.get("expires_in").and_then(serde_json::Value::as_u64) {
        token = token.with_expiry(exp);
    }
    Ok(token)
}

/// Parse a userinfo response. Google's v2 endpoint uses `id`, OpenID Connect
/// uses `sub`; either is accepted.
///
/// # Errors
///
/// Returns an error if neither identifier is present.
pub fn parse_user_profile(json: &serde_json::Value) -> Result<UserProfile> {
    let field = |k: &str| {
        json.get(k)
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
    };
    let id = field("id")
        .or_else(|| field("sub"))
        .ok_or_else(|| GatewayError::Auth("userinfo response has no user id".into()))?;
    Ok(UserProfile {
        id,
        email: field("email"),
        name: field("name"),
        picture: field("picture"),
    })
}

/// Fetch the signed-in user's profile with a fresh access token.
///
/// # Errors
///
/// Returns an error on transport failure, a non-success status, an
/// unparseable body, or when the call takes longer than `timeout`.
pub async fn fetch_user_profile(
    http: &rquest::Client,
    userinfo_url: &str,
    access_token: &str,
    timeout: Duration,
) -> Result<UserProfile> {
    let json = timed(timeout, async {
        let resp = http.get(userinfo_url).bearer_auth(access_token).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "userinfo request failed");
            return Err(GatewayError::Auth(format!(
                "failed to fetch user info ({status}): {body}"
            )));
        }

        resp.json::<serde_json::Value>()
            .await
            .map_err(|e| GatewayError::Auth(format!("failed to parse userinfo response: {e}")))
    })
    .await?;
    parse_user_profile(&json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TEST_CLIENT_ID: &str = "test-id.apps.googleusercontent.com";
    const REDIRECT: &str = "http://localhost:3001/api/auth/callback";

    #[test]
    fn test_auth_url_contains_required_params() {
        let url = build_auth_url(&OAuthConfig::default(), TEST_CLIENT_ID, REDIRECT, "state456")
            .unwrap();
        assert!(url.starts_with("https://accounts.google.com/"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("client_id=test-id.apps.googleusercontent.com"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A3001%2Fapi%2Fauth%2Fcallback"));
        assert!(url.contains("state=state456"));
        assert!(url.contains("access_type=offline"));
        assert!(url.contains("prompt=consent"));
    }

    #[test]
    fn test_auth_url_encodes_scopes() {
        let url = build_auth_url(&OAuthConfig::default(), TEST_CLIENT_ID, REDIRECT, "s").unwrap();
        assert!(url.contains("scope=openid+email+profile"));
        assert!(url.contains("spreadsheets"));
    }

    #[test]
    fn test_token_form_params_fields() {
        let params = token_form_params(TEST_CLIENT_ID, "secret", "mycode", REDIRECT);
        let map: std::collections::HashMap<&str, &str> =
            params.iter().map(|(k, v)| (*k, v.as_str())).collect();
        assert_eq!(map["grant_type"], "authorization_code");
        assert_eq!(map["client_secret"], "secret");
        assert_eq!(map["code"], "mycode");
        assert_eq!(map["redirect_uri"], REDIRECT);
    }

    #[test]
    fn test_refresh_form_params_fields() {
        let params = refresh_form_params(TEST_CLIENT_ID, "secret", "rt");
        assert!(params.contains(&("grant_type", "refresh_token".into())));
        assert!(params.contains(&("refresh_token", "rt".into())));
    }

    #[test]
    fn test_parse_ok() {
        let resp = json!({"access_token": "ga", "refresh_token": "gr", "expires_in": 3600});
        let t = parse_token_response(&resp).unwrap();
        assert_eq!(t.access_token, "ga");
        assert_eq!(t.refresh_token, Some("gr".into()));
        assert!(t.expires_at.is_some());
    }

    #[test]
    fn test_parse_error_response() {
        let resp = json!({"error": "invalid_grant", "error_description": "Bad Request"});
        let err = parse_token_response(&resp).unwrap_err();
        assert!(err.to_string().contains("Bad Request"));
    }

    #[test]
    fn test_parse_missing_access_token() {
        assert!(parse_token_response(&json!({"expires_in": 10})).is_err());
    }

    #[test]
    fn test_parse_user_profile_v2_and_oidc() {
        let v2 = parse_user_profile(&json!({"id": "42", "email": "a@b.c"})).unwrap();
        assert_eq!(v2.id, "42");
        assert_eq!(v2.email.as_deref(), Some("a@b.c"));
        let oidc = parse_user_profile(&json!({"sub": "7", "name": "Ash"})).unwrap();
        assert_eq!(oidc.id, "7");
        assert_eq!(oidc.name.as_deref(), Some("Ash"));
        assert!(parse_user_profile(&json!({})).is_err());
    }
}
