//! Signed session cookie.
//!
//! The cookie value is `<session id>.<signature>` where the signature is an
//! HMAC-SHA256 of the id under `SESSION_SECRET`, base64url without padding.

use axum::http::{HeaderMap, HeaderValue, header};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use pokenae_types::{GatewayError, SessionId, error::Result};
use secrecy::{ExposeSecret as _, SecretString};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
pub struct SessionCookie {
    name: String,
    mac: HmacSha256,
    max_age_secs: u64,
    secure: bool,
}

impl SessionCookie {
    /// # Errors
    ///
    /// Returns [`GatewayError::Config`] if the signing key is rejected.
    pub fn new(
        name: impl Into<String>,
        key: &SecretString,
        max_age_secs: u64,
        secure: bool,
    ) -> Result<Self> {
        let mac = HmacSha256::new_from_slice(key.expose_secret().as_bytes())
            .map_err(|e| GatewayError::Config(format!("invalid session secret: {e}")))?;
        Ok(Self {
            name: name.into(),
            mac,
            max_age_secs,
            secure,
        })
    }

    #[must_use]
    pub fn sign(&self, id: &SessionId) -> String {
        let mut mac = self.mac.clone();
        mac.update(id.as_str().as_bytes());
        let sig = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        format!("{id}.{sig}")
    }

    /// Returns the session id if the signature checks out.
    #[must_use]
    pub fn verify(&self, value: &str) -> Option<SessionId> {
        let (id, sig) = value.rsplit_once('.')?;
        let sig = URL_SAFE_NO_PAD.decode(sig).ok()?;
        let mut mac = self.mac.clone();
        mac.update(id.as_bytes());
        mac.verify_slice(&sig).ok()?;
        Some(SessionId::new(id))
    }

    /// Extract and verify the session id from the request's `Cookie` headers.
    #[must_use]
    pub fn read(&self, headers: &HeaderMap) -> Option<SessionId> {
        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == self.name)
            .and_then(|(_, value)| self.verify(value))
    }

    fn attributes(&self, max_age: u64) -> String {
        let mut attrs = format!("Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}");
        if self.secure {
            attrs.push_str("; Secure");
        }
        attrs
    }

    /// `Set-Cookie` value establishing the session.
    #[must_use]
    pub fn set(&self, id: &SessionId) -> HeaderValue {
        let cookie = format!(
            "{}={}; {}",
            self.name,
            self.sign(id),
            self.attributes(self.max_age_secs)
        );
        HeaderValue::from_str(&cookie).unwrap_or_else(|_| HeaderValue::from_static(""))
    }

    /// `Set-Cookie` value expiring the session cookie.
    #[must_use]
    pub fn clear(&self) -> HeaderValue {
        let cookie = format!("{}=; {}", self.name, self.attributes(0));
        HeaderValue::from_str(&cookie).unwrap_or_else(|_| HeaderValue::from_static(""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cookie(secure: bool) -> SessionCookie {
        SessionCookie::new("pokenae.session", &SecretString::from("s3cret"), 3600, secure).unwrap()
    }

    #[test]
    fn test_sign_and_verify() {
        let c = cookie(false);
        let id = SessionId::new("0b7e-uuid");
        let signed = c.sign(&id);
        assert!(signed.starts_with("0b7e-uuid."));
        assert_eq!(c.verify(&signed), Some(id));
    }

    #[test]
    fn test_tampered_value_rejected() {
        let c = cookie(false);
        let signed = c.sign(&SessionId::new("alice"));
        let forged = signed.replacen("alice", "mallory", 1);
        assert!(c.verify(&forged).is_none());
        assert!(c.verify("no-signature").is_none());
    }

    #[test]
    fn test_other_key_rejected() {
        let signed = cookie(false).sign(&SessionId::new("a"));
        let other =
            SessionCookie::new("pokenae.session", &SecretString::from("other"), 3600, false)
                .unwrap();
        assert!(other.verify(&signed).is_none());
    }

    #[test]
    fn test_read_from_cookie_header() {
        let c = cookie(false);
        let id = SessionId::new("abc");
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_str(&format!("theme=dark; pokenae.session={}", c.sign(&id))).unwrap(),
        );
        assert_eq!(c.read(&headers), Some(id));
        assert!(c.read(&HeaderMap::new()).is_none());
    }

    #[test]
    fn test_set_and_clear_attributes() {
        let set = cookie(true).set(&SessionId::new("abc"));
        let set = set.to_str().unwrap();
        assert!(set.starts_with("pokenae.session=abc."));
        assert!(set.contains("HttpOnly"));
        assert!(set.contains("SameSite=Lax"));
        assert!(set.contains("Max-Age=3600"));
        assert!(set.ends_with("; Secure"));

        let clear = cookie(false).clear();
        let clear = clear.to_str().unwrap();
        assert!(clear.contains("Max-Age=0"));
        assert!(!clear.contains("Secure"));
    }
}
