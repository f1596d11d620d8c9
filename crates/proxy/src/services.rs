//! `ANY /api/services/{service}/{*path}`: authenticated forwarding to a
//! registered backend.

use crate::{
    AppState,
    client::{ForwardRequest, GOOGLE_TOKEN_HEADER},
    error::{ApiError, EnvelopeResponse},
};
use axum::{
    extract::{Path, State},
    http::{HeaderMap, Method, Uri, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use pokenae_types::GatewayError;
use std::sync::Arc;

const ROUTE_PREFIX: &str = "/api/services/";

const FORWARDED_METHODS: [Method; 5] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::PATCH,
    Method::DELETE,
];

fn is_forwarded_method(method: &Method) -> bool {
    FORWARDED_METHODS.contains(method)
}

/// Path below the service name, taken from the raw request URI so
/// percent-encoded segments reach the backend unchanged.
fn raw_subpath(uri: &Uri) -> &str {
    uri.path()
        .strip_prefix(ROUTE_PREFIX)
        .and_then(|rest| rest.split_once('/'))
        .map_or("", |(_, path)| path)
}

fn bearer_from(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            let (scheme, token) = v.trim_start().split_once(' ')?;
            scheme.eq_ignore_ascii_case("bearer").then_some(token)
        })
        .map(str::trim)
}

/// First non-empty of: session token, inbound `Authorization: Bearer`,
/// inbound `X-Google-Access-Token`.
pub fn resolve_bearer(session_token: Option<&str>, headers: &HeaderMap) -> Option<String> {
    let google = headers
        .get(GOOGLE_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim);
    [session_token, bearer_from(headers), google]
        .into_iter()
        .flatten()
        .find(|t| !t.is_empty())
        .map(str::to_string)
}

/// JSON body to forward: only for methods that carry one, only when declared
/// as JSON, and only when it parses.
fn json_body(method: &Method, headers: &HeaderMap, body: &Bytes) -> Option<serde_json::Value> {
    if *method == Method::GET || *method == Method::DELETE || body.is_empty() {
        return None;
    }
    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.contains("application/json"));
    if !is_json {
        return None;
    }
    match serde_json::from_slice(body) {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::debug!(error = %e, "request body is not valid JSON, forwarding without body");
            None
        }
    }
}

pub async fn proxy(
    State(state): State<Arc<AppState>>,
    method: Method,
    Path((service, _)): Path<(String, String)>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match forward(&state, method, &service, &uri, &headers, &body).await {
        Ok(resp) => resp,
        Err(e) => e.into_response(),
    }
}

async fn forward(
    state: &AppState,
    method: Method,
    service: &str,
    uri: &Uri,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<Response, ApiError> {
    if !is_forwarded_method(&method) {
        return Err(GatewayError::MethodNotAllowed(method.to_string()).into());
    }

    let session_id = state
        .cookies
        .read(headers)
        .ok_or(GatewayError::Unauthorized)?;
    let token = state.auth.get_token(&session_id).await?;

    let endpoint = state.registry.get(service)?;

    let req = ForwardRequest {
        body: json_body(&method, headers, body),
        method,
        path: raw_subpath(uri).to_string(),
        query: uri.query().map(str::to_string),
        bearer: resolve_bearer(Some(&token.access_token), headers),
    };
    tracing::info!(service = %endpoint.name, method = %req.method, path = %req.path, "forwarding");

    let envelope = state.client.forward(endpoint, req).await;
    Ok(EnvelopeResponse(envelope).into_response())
}
