//! Outbound calls to backend services and response normalization.

use crate::registry::ServiceEndpoint;
use axum::http::Method;
use pokenae_types::{Envelope, ErrorCode, Failure, GatewayError};
use secrecy::ExposeSecret as _;
use serde_json::Value;
use std::time::Instant;

/// Header carrying the Google access token alongside `Authorization`.
pub const GOOGLE_TOKEN_HEADER: &str = "x-google-access-token";

/// A request to forward, already stripped of everything the backend must not see.
#[derive(Debug, Clone)]
pub struct ForwardRequest {
    pub method: Method,
    /// Raw (still percent-encoded) path below the service base URL.
    pub path: String,
    pub query: Option<String>,
    pub body: Option<Value>,
    /// Resolved user token; the service API key is used when absent.
    pub bearer: Option<String>,
}

/// Forwards requests over one shared `rquest` client.
#[derive(Clone)]
pub struct ServiceClient {
    http: rquest::Client,
}

impl ServiceClient {
    pub fn new(http: rquest::Client) -> Self {
        Self { http }
    }

    /// Forward `req` to `service` and normalize whatever happens into an
    /// [`Envelope`]. Never fails and never retries.
    pub async fn forward(&self, service: &ServiceEndpoint, req: ForwardRequest) -> Envelope {
        let url = service.url_for(&req.path, req.query.as_deref());
        let mut builder = self
            .http
            .request(req.method.clone(), &url)
            .header("accept", "application/json");

        if let Some(token) = &req.bearer {
            builder = builder
                .header("authorization", format!("Bearer {token}"))
                .header(GOOGLE_TOKEN_HEADER, token.as_str());
        } else if let Some(key) = &service.api_key {
            builder = builder.header("authorization", format!("Bearer {}", key.expose_secret()));
        }
        if let Some(body) = &req.body {
            builder = builder.json(body);
        }

        let started = Instant::now();
        let outcome = tokio::time::timeout(service.timeout, async move {
            let resp = builder.send().await?;
            let status = resp.status();
            let content_type = resp
                .headers()
                .get("content-type")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let text = resp.text().await?;
            Ok::<_, rquest::Error>((status, content_type, text))
        })
        .await;
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match outcome {
            Err(_) => {
                tracing::warn!(service = %service.name, method = %req.method, elapsed_ms, "backend request timed out");
                Envelope::Failure(Failure::from(GatewayError::Timeout(service.timeout_ms())))
            }
            Ok(Err(e)) => {
                tracing::warn!(service = %service.name, method = %req.method, error = %e, "backend request failed");
                Envelope::Failure(Failure::from(GatewayError::from(e)))
            }
            Ok(Ok((status, content_type, text))) => {
                tracing::debug!(
                    service = %service.name,
                    method = %req.method,
                    status = status.as_u16(),
                    elapsed_ms,
                    "backend responded"
                );
                if status.is_success() {
                    success(content_type.as_deref(), text)
                } else {
                    failure(status.as_u16(), status.canonical_reason(), &text)
                }
            }
        }
    }
}

fn success(content_type: Option<&str>, text: String) -> Envelope {
    let is_json = content_type.is_some_and(|ct| ct.contains("application/json"));
    if !is_json {
        return Envelope::success(Value::String(text));
    }
    if text.trim().is_empty() {
        return Envelope::success(Value::Null);
    }
    match serde_json::from_str(&text) {
        Ok(data) => Envelope::success(data),
        Err(e) => Envelope::Failure(Failure::new(
            ErrorCode::UnknownError,
            format!("failed to parse backend response: {e}"),
        )),
    }
}

fn failure(status: u16, reason: Option<&str>, text: &str) -> Envelope {
    let details = if text.trim().is_empty() {
        None
    } else {
        Some(serde_json::from_str::<Value>(text).unwrap_or_else(|_| Value::String(text.to_string())))
    };
    let message = details
        .as_ref()
        .and_then(|d| d.get("message"))
        .and_then(Value::as_str)
        .or(reason)
        .unwrap_or("Request failed")
        .to_string();

    let mut failure = Failure::new(ErrorCode::Http(status), message);
    if let Some(details) = details {
        failure = failure.with_details(details);
    }
    Envelope::Failure(failure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_json() {
        let env = success(Some("application/json; charset=utf-8"), r#"{"id":1}"#.into());
        assert_eq!(env, Envelope::success(json!({"id": 1})));
    }

    #[test]
    fn test_success_text() {
        let env = success(Some("text/plain"), "hello".into());
        assert_eq!(env, Envelope::success(json!("hello")));
        let env = success(None, "raw".into());
        assert_eq!(env, Envelope::success(json!("raw")));
    }

    #[test]
    fn test_success_empty_json_body_is_null() {
        assert_eq!(success(Some("application/json"), String::new()), Envelope::success(Value::Null));
    }

    #[test]
    fn test_success_invalid_json_is_unknown_error() {
        let env = success(Some("application/json"), "{not json".into());
        let Envelope::Failure(f) = env else {
            panic!("expected failure")
        };
        assert_eq!(f.code, ErrorCode::UnknownError);
    }

    #[test]
    fn test_failure_message_from_body() {
        let env = failure(404, Some("Not Found"), r#"{"message":"user not found"}"#);
        let Envelope::Failure(f) = env else {
            panic!("expected failure")
        };
        assert_eq!(f.code, ErrorCode::Http(404));
        assert_eq!(f.message, "user not found");
        assert_eq!(f.details, Some(json!({"message": "user not found"})));
    }

    #[test]
    fn test_failure_message_falls_back_to_reason_then_default() {
        let Envelope::Failure(f) = failure(503, Some("Service Unavailable"), "down") else {
            panic!("expected failure")
        };
        assert_eq!(f.message, "Service Unavailable");
        assert_eq!(f.details, Some(json!("down")));

        let Envelope::Failure(f) = failure(599, None, "") else {
            panic!("expected failure")
        };
        assert_eq!(f.message, "Request failed");
        assert!(f.details.is_none());
    }
}
