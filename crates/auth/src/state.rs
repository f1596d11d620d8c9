//! OAuth `state` parameter: generation, encoding and validation.
//!
//! The state is a base64-encoded JSON payload `{nonce, timestamp, userAgent}`.
//! It is stored in the pending-login session before the redirect and must come
//! back byte-identical, within [`STATE_TTL`], exactly once.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use pokenae_types::{GatewayError, error::Result};
use rand::RngCore as _;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Maximum age of a state before it is rejected as expired.
pub const STATE_TTL: Duration = Duration::from_secs(5 * 60);

const NONCE_BYTES: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatePayload {
    pub nonce: String,
    /// Epoch milliseconds at generation time.
    #[serde(rename = "timestamp")]
    pub timestamp_ms: u64,
    #[serde(default)]
    pub user_agent: String,
}

/// Generate a random nonce (32 bytes, hex-encoded).
#[must_use]
pub fn random_nonce() -> String {
    let mut bytes = [0u8; NONCE_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

impl StatePayload {
    #[must_use]
    pub fn generate(user_agent: &str, now_ms: u64) -> Self {
        Self {
            nonce: random_nonce(),
            timestamp_ms: now_ms,
            user_agent: user_agent.to_string(),
        }
    }

    /// Serialize to the wire form sent as the `state` query parameter.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn encode(&self) -> Result<String> {
        Ok(STANDARD.encode(serde_json::to_vec(self)?))
    }

    /// Parse a wire-form state.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::StateInvalid`] if the value is not base64 JSON
    /// or lacks a nonce or timestamp.
    pub fn decode(state: &str) -> Result<Self> {
        let bytes = STANDARD
            .decode(state)
            .map_err(|_| GatewayError::StateInvalid("state is not valid base64".into()))?;
        let payload: Self = serde_json::from_slice(&bytes)
            .map_err(|_| GatewayError::StateInvalid("state payload is malformed".into()))?;
        if payload.nonce.is_empty() || payload.timestamp_ms == 0 {
            return Err(GatewayError::StateInvalid(
                "state payload is missing nonce or timestamp".into(),
            ));
        }
        Ok(payload)
    }
}

/// Validate a callback `state` against the value stored for the session.
///
/// The caller must already have removed `stored` from the session so the
/// state cannot be presented twice.
///
/// # Errors
///
/// - [`GatewayError::StateInvalid`] when nothing was stored, the values
///   differ, or the payload is malformed.
/// - [`GatewayError::StateExpired`] when the payload is older than [`STATE_TTL`].
pub fn validate_state(
    stored: Option<&str>,
    received: &str,
    user_agent: &str,
    now_ms: u64,
) -> Result<StatePayload> {
    let stored = stored.ok_or_else(|| {
        GatewayError::StateInvalid("no pending login for this session".into())
    })?;
    if stored != received {
        return Err(GatewayError::StateInvalid(
            "state mismatch, possible CSRF attack".into(),
        ));
    }

    let payload = StatePayload::decode(received)?;

    let ttl_ms = u64::try_from(STATE_TTL.as_millis()).unwrap_or(u64::MAX);
    let age_ms = now_ms.saturating_sub(payload.timestamp_ms);
    if age_ms > ttl_ms {
        tracing::warn!(age_secs = age_ms / 1000, "oauth state expired");
        return Err(GatewayError::StateExpired);
    }

    if !payload.user_agent.is_empty() && payload.user_agent != user_agent {
        tracing::warn!("user agent changed between login and callback");
    }

    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: u64 = 1_700_000_000_000;
    const UA: &str = "Mozilla/5.0 test";

    fn encoded(payload: &StatePayload) -> String {
        payload.encode().unwrap()
    }

    #[test]
    fn test_nonce_is_64_hex_chars() {
        let n = random_nonce();
        assert_eq!(n.len(), 64);
        assert!(n.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(n, random_nonce());
    }

    #[test]
    fn test_wire_form_uses_timestamp_and_user_agent_keys() {
        let p = StatePayload::generate(UA, NOW);
        let raw = STANDARD.decode(encoded(&p)).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(json["timestamp"], NOW);
        assert_eq!(json["userAgent"], UA);
        assert_eq!(json["nonce"].as_str().unwrap().len(), 64);
    }

    #[test]
    fn test_valid_state_accepted() {
        let p = StatePayload::generate(UA, NOW);
        let s = encoded(&p);
        let got = validate_state(Some(&s), &s, UA, NOW + 1_000).unwrap();
        assert_eq!(got, p);
    }

    #[test]
    fn test_missing_stored_state_rejected() {
        let s = encoded(&StatePayload::generate(UA, NOW));
        let err = validate_state(None, &s, UA, NOW).unwrap_err();
        assert!(matches!(err, GatewayError::StateInvalid(_)));
    }

    #[test]
    fn test_mismatch_rejected() {
        let a = encoded(&StatePayload::generate(UA, NOW));
        let b = encoded(&StatePayload::generate(UA, NOW));
        let err = validate_state(Some(&a), &b, UA, NOW).unwrap_err();
        assert!(err.to_string().contains("CSRF"));
    }

    #[test]
    fn test_expired_state_rejected_even_when_matching() {
        let s = encoded(&StatePayload::generate(UA, NOW));
        let later = NOW + 5 * 60 * 1000 + 1;
        let err = validate_state(Some(&s), &s, UA, later).unwrap_err();
        assert!(matches!(err, GatewayError::StateExpired));
    }

    #[test]
    fn test_exactly_at_ttl_accepted() {
        let s = encoded(&StatePayload::generate(UA, NOW));
        assert!(validate_state(Some(&s), &s, UA, NOW + 5 * 60 * 1000).is_ok());
    }

    #[test]
    fn test_malformed_state_rejected() {
        let err = validate_state(Some("%%%"), "%%%", UA, NOW).unwrap_err();
        assert!(matches!(err, GatewayError::StateInvalid(_)));

        let no_nonce = STANDARD.encode(br#"{"nonce":"","timestamp":5}"#);
        let err = validate_state(Some(&no_nonce), &no_nonce, UA, NOW).unwrap_err();
        assert!(matches!(err, GatewayError::StateInvalid(_)));
    }

    #[test]
    fn test_user_agent_mismatch_only_warns() {
        let s = encoded(&StatePayload::generate(UA, NOW));
        assert!(validate_state(Some(&s), &s, "curl/8", NOW).is_ok());
    }
}
