//! Envelope responses and the error wrapper that renders [`GatewayError`]
//! as a failure envelope.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use pokenae_types::{Envelope, Failure, GatewayError};

/// Renders an [`Envelope`] with the outer status its code maps to.
pub struct EnvelopeResponse(pub Envelope);

impl IntoResponse for EnvelopeResponse {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.0)).into_response()
    }
}

/// Wrapper around [`GatewayError`] that implements [`IntoResponse`].
pub struct ApiError(pub GatewayError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if matches!(self.0.code().http_status(), 500) {
            tracing::error!(error = %self.0, "request failed");
        }
        EnvelopeResponse(Envelope::Failure(Failure::from(self.0))).into_response()
    }
}

impl From<GatewayError> for ApiError {
    fn from(e: GatewayError) -> Self {
        Self(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt as _;

    async fn extract_error_body(err: ApiError) -> (StatusCode, serde_json::Value) {
        let resp = err.into_response();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        (status, body)
    }

    #[tokio::test]
    async fn test_unauthorized() {
        let (status, body) = extract_error_body(ApiError(GatewayError::Unauthorized)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn test_invalid_service() {
        let (status, body) = extract_error_body(ApiError(GatewayError::InvalidService {
            name: "x".into(),
            available: vec!["service1".into(), "service2".into()],
        }))
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "INVALID_SERVICE");
        assert_eq!(body["error"]["details"], serde_json::json!(["service1", "service2"]));
    }

    #[tokio::test]
    async fn test_method_not_allowed() {
        let (status, body) =
            extract_error_body(ApiError(GatewayError::MethodNotAllowed("OPTIONS".into()))).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(body["error"]["code"], "METHOD_NOT_ALLOWED");
    }

    #[tokio::test]
    async fn test_timeout() {
        let (status, body) = extract_error_body(ApiError(GatewayError::Timeout(250))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["code"], "TIMEOUT");
        assert_eq!(body["error"]["details"]["timeout"], 250);
    }

    #[tokio::test]
    async fn test_state_errors_are_500() {
        let (status, body) = extract_error_body(ApiError(GatewayError::StateExpired)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["code"], "STATE_EXPIRED");
    }

    #[tokio::test]
    async fn test_success_envelope_is_200() {
        let resp = EnvelopeResponse(Envelope::success(serde_json::json!({"a": 1}))).into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, serde_json::json!({"success": true, "data": {"a": 1}}));
    }
}
