//! Overlay of the well-known deployment environment variables.
//!
//! These names predate the `POKENAE_` prefix and are shared with the rest of
//! the deployment (Docker secrets are expanded into them), so they are read
//! explicitly rather than through figment's prefixed provider.

use crate::Config;

/// Environment lookup function. Production passes [`process_env`]; tests pass
/// a map so the process environment is never mutated.
pub type EnvLookup<'a> = &'a dyn Fn(&str) -> Option<String>;

/// Reads a variable from the process environment.
#[must_use]
pub fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Upper-cased env prefix for a service: `service1` → `SERVICE1`,
/// `collection-api` → `COLLECTION_API`.
#[must_use]
pub fn service_env_key(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// Applies `GOOGLE_CLIENT_ID`, `GOOGLE_CLIENT_SECRET`, `SESSION_SECRET` and the
/// per-service `<SERVICE>_BASE_URL` / `<SERVICE>_API_KEY` variables.
/// Empty values count as unset.
pub fn apply_env(config: &mut Config, lookup: EnvLookup<'_>) {
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(v) = get("GOOGLE_CLIENT_ID") {
        config.oauth.client_id = Some(v);
    }
    if let Some(v) = get("GOOGLE_CLIENT_SECRET") {
        config.oauth.client_secret = Some(v);
    }
    if let Some(v) = get("SESSION_SECRET") {
        config.session.secret = Some(v);
    }

    for (name, svc) in &mut config.services {
        let prefix = service_env_key(name);
        if let Some(url) = get(&format!("{prefix}_BASE_URL")) {
            tracing::debug!(service = %name, "base_url overridden from environment");
            svc.base_url = url;
        }
        if let Some(key) = get(&format!("{prefix}_API_KEY")) {
            svc.api_key = Some(key);
        }
    }
}
