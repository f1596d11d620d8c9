//! Unified error type for the pokenae workspace.

use crate::envelope::ErrorCode;
use thiserror::Error;

/// Enumerates all error kinds that can occur across pokenae crates.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The request carries no authenticated session.
    #[error("authentication required")]
    Unauthorized,

    /// The requested backend service is not in the registry.
    #[error("invalid service name: {name}. Available services: {}", available.join(", "))]
    InvalidService {
        name: String,
        available: Vec<String>,
    },

    /// The HTTP verb is not one the proxy forwards.
    #[error("method not allowed: {0}")]
    MethodNotAllowed(String),

    /// OAuth `state` is missing, mismatched, or malformed.
    #[error("invalid state: {0}")]
    StateInvalid(String),

    /// OAuth `state` is older than the accepted window.
    #[error("state has expired, please try again")]
    StateExpired,

    /// The identity provider or the token exchange rejected the login.
    #[error("authentication error: {0}")]
    Auth(String),

    /// Refreshing the access token failed.
    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    /// An outbound call did not complete in time.
    #[error("request timed out after {0} ms")]
    Timeout(u64),

    /// HTTP transport error (DNS, connect, TLS, body read).
    #[error("http error: {0}")]
    Http(String),

    /// JSON serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration loading or validation error.
    #[error("configuration error: {0}")]
    Config(String),
}

// ── Feature-gated From impls ──────────────────────────────────────────────────

#[cfg(feature = "rquest")]
impl From<rquest::Error> for GatewayError {
    fn from(e: rquest::Error) -> Self {
        Self::Http(e.to_string())
    }
}

impl GatewayError {
    /// Returns the envelope code this error is reported under.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Unauthorized => ErrorCode::Unauthorized,
            Self::InvalidService { .. } => ErrorCode::InvalidService,
            Self::MethodNotAllowed(_) => ErrorCode::MethodNotAllowed,
            Self::StateInvalid(_) => ErrorCode::StateInvalid,
            Self::StateExpired => ErrorCode::StateExpired,
            Self::Auth(_) => ErrorCode::AuthError,
            Self::RefreshFailed(_) => ErrorCode::RefreshFailed,
            Self::Timeout(_) => ErrorCode::Timeout,
            Self::Http(_) => ErrorCode::NetworkError,
            Self::Serialization(_) | Self::Config(_) => ErrorCode::InternalError,
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_auth() {
        let err = GatewayError::Auth("access_denied".to_string());
        assert_eq!(err.to_string(), "authentication error: access_denied");
    }

    #[test]
    fn test_error_display_invalid_service_lists_names() {
        let err = GatewayError::InvalidService {
            name: "nope".into(),
            available: vec!["service1".into(), "service2".into()],
        };
        let s = err.to_string();
        assert!(s.contains("nope"));
        assert!(s.contains("service1, service2"));
    }

    #[test]
    fn test_serialization_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid {{{").unwrap_err();
        let err: GatewayError = json_err.into();
        assert!(matches!(err, GatewayError::Serialization(_)));
        assert_eq!(err.code(), ErrorCode::InternalError);
    }

    #[test]
    fn test_code_mapping() {
        assert_eq!(GatewayError::Unauthorized.code(), ErrorCode::Unauthorized);
        assert_eq!(GatewayError::StateExpired.code(), ErrorCode::StateExpired);
        assert_eq!(
            GatewayError::StateInvalid("mismatch".into()).code(),
            ErrorCode::StateInvalid
        );
        assert_eq!(GatewayError::Timeout(30_000).code(), ErrorCode::Timeout);
        assert_eq!(
            GatewayError::Http("connection refused".into()).code(),
            ErrorCode::NetworkError
        );
        assert_eq!(
            GatewayError::RefreshFailed("invalid_grant".into()).code(),
            ErrorCode::RefreshFailed
        );
    }
}
