//! The uniform `{success, data|error}` wrapper returned by every proxied call.
//!
//! Wire form:
//!
//! ```json
//! {"success": true,  "data": {...}, "message": "optional"}
//! {"success": false, "error": {"code": "HTTP_404", "message": "...", "details": {...}}}
//! ```

use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::{DeserializeOwned, Error as _},
    ser::SerializeStruct as _,
};
use serde_json::Value;
use std::fmt;

/// Machine-readable failure code carried in [`Failure::code`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Unauthorized,
    InvalidService,
    MethodNotAllowed,
    Timeout,
    NetworkError,
    /// Non-2xx response from a backend, rendered as `HTTP_<status>`.
    Http(u16),
    /// OAuth `state` missing, mismatched or malformed (CSRF guard).
    StateInvalid,
    StateExpired,
    RefreshFailed,
    AuthError,
    InternalError,
    UnknownError,
    /// Any code this crate does not know, kept verbatim.
    Other(String),
}

impl ErrorCode {
    /// HTTP status the outer response carries for this code.
    ///
    /// `HTTP_<n>` maps back to `n`; the semantic codes that have a natural
    /// status map to it; everything else is a 500.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Http(status) if (100..=599).contains(status) => *status,
            Self::Unauthorized => 401,
            Self::InvalidService => 400,
            Self::MethodNotAllowed => 405,
            _ => 500,
        }
    }

    /// Parses a wire code; unknown codes are preserved as [`ErrorCode::Other`].
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "UNAUTHORIZED" => Self::Unauthorized,
            "INVALID_SERVICE" => Self::InvalidService,
            "METHOD_NOT_ALLOWED" => Self::MethodNotAllowed,
            "TIMEOUT" => Self::Timeout,
            "NETWORK_ERROR" => Self::NetworkError,
            "STATE_INVALID" => Self::StateInvalid,
            "STATE_EXPIRED" => Self::StateExpired,
            "REFRESH_FAILED" => Self::RefreshFailed,
            "AUTH_ERROR" => Self::AuthError,
            "INTERNAL_ERROR" => Self::InternalError,
            "UNKNOWN_ERROR" => Self::UnknownError,
            other => other
                .strip_prefix("HTTP_")
                .and_then(|n| n.parse::<u16>().ok())
                .map_or_else(|| Self::Other(other.to_string()), Self::Http),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unauthorized => f.write_str("UNAUTHORIZED"),
            Self::InvalidService => f.write_str("INVALID_SERVICE"),
            Self::MethodNotAllowed => f.write_str("METHOD_NOT_ALLOWED"),
            Self::Timeout => f.write_str("TIMEOUT"),
            Self::NetworkError => f.write_str("NETWORK_ERROR"),
            Self::Http(status) => write!(f, "HTTP_{status}"),
            Self::StateInvalid => f.write_str("STATE_INVALID"),
            Self::StateExpired => f.write_str("STATE_EXPIRED"),
            Self::RefreshFailed => f.write_str("REFRESH_FAILED"),
            Self::AuthError => f.write_str("AUTH_ERROR"),
            Self::InternalError => f.write_str("INTERNAL_ERROR"),
            Self::UnknownError => f.write_str("UNKNOWN_ERROR"),
            Self::Other(s) => f.write_str(s),
        }
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ErrorCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::parse(&s))
    }
}

/// The error half of an [`Envelope`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl Failure {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl From<crate::GatewayError> for Failure {
    fn from(e: crate::GatewayError) -> Self {
        let details = match &e {
            crate::GatewayError::InvalidService { available, .. } => {
                Some(Value::from(available.clone()))
            }
            crate::GatewayError::Timeout(ms) => Some(serde_json::json!({ "timeout": ms })),
            _ => None,
        };
        Self {
            code: e.code(),
            message: e.to_string(),
            details,
        }
    }
}

/// Either a successful payload or a structured failure; never both.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope<T = Value> {
    Success { data: T, message: Option<String> },
    Failure(Failure),
}

impl<T> Envelope<T> {
    pub fn success(data: T) -> Self {
        Self::Success {
            data,
            message: None,
        }
    }

    pub fn failure(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Failure(Failure::new(code, message))
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// HTTP status for the outer response: 200 on success, otherwise the
    /// status derived from the failure code.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Success { .. } => 200,
            Self::Failure(f) => f.code.http_status(),
        }
    }

    /// Converts into a `Result`, dropping the optional success message.
    ///
    /// # Errors
    ///
    /// Returns the [`Failure`] when the envelope is not a success.
    pub fn into_result(self) -> Result<T, Failure> {
        match self {
            Self::Success { data, .. } => Ok(data),
            Self::Failure(f) => Err(f),
        }
    }
}

impl<T: Serialize> Serialize for Envelope<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Success { data, message } => {
                let len = if message.is_some() { 3 } else { 2 };
                let mut s = serializer.serialize_struct("Envelope", len)?;
                s.serialize_field("success", &true)?;
                s.serialize_field("data", data)?;
                if let Some(m) = message {
                    s.serialize_field("message", m)?;
                }
                s.end()
            }
            Self::Failure(failure) => {
                let mut s = serializer.serialize_struct("Envelope", 2)?;
                s.serialize_field("success", &false)?;
                s.serialize_field("error", failure)?;
                s.end()
            }
        }
    }
}

#[derive(Deserialize)]
#[serde(bound = "T: DeserializeOwned")]
struct RawEnvelope<T> {
    success: bool,
    #[serde(default, deserialize_with = "deserialize_some")]
    data: Option<T>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<Failure>,
}

/// Keeps an explicit `null` as `Some(null)` so that `data: null` is a valid
/// success payload while a missing field stays `None`.
fn deserialize_some<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for Envelope<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawEnvelope::<T>::deserialize(deserializer)?;
        if raw.success {
            let data = raw.data.ok_or_else(|| D::Error::missing_field("data"))?;
            Ok(Self::Success {
                data,
                message: raw.message,
            })
        } else {
            raw.error
                .map(Self::Failure)
                .ok_or_else(|| D::Error::missing_field("error"))
        }
    }
}
