//! Resolution of the secrets the gateway cannot start without.

use crate::{Config, EnvLookup};
use pokenae_types::{GatewayError, error::Result};
use secrecy::SecretString;

/// Value of `POKENAE_PHASE` that marks a static build rather than a real run.
pub const BUILD_PHASE: &str = "build";

/// The resolved OAuth client credentials and cookie signing key.
#[derive(Debug, Clone)]
pub struct Secrets {
    pub google_client_id: String,
    pub google_client_secret: SecretString,
    pub session_secret: SecretString,
}

/// Prefix of the values substituted for missing secrets during the build phase.
pub const PLACEHOLDER_PREFIX: &str = "BUILD_TIME_PLACEHOLDER_";

impl Secrets {
    /// Resolves every required secret from `config` (after the env overlay),
    /// honoring the build phase.
    ///
    /// Outside the build phase a missing secret is fatal. During the build
    /// phase (`POKENAE_PHASE=build`) a `BUILD_TIME_PLACEHOLDER_<KEY>` value is
    /// substituted and a warning logged. Only static tooling such as
    /// `pokenae check` should accept that; servers use [`Self::resolve_runtime`].
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Config`] naming the first missing secret.
    pub fn resolve(config: &Config, lookup: EnvLookup<'_>) -> Result<Self> {
        let build_phase = lookup("POKENAE_PHASE").is_some_and(|p| p == BUILD_PHASE);
        Self::resolve_with(config, build_phase)
    }

    /// Resolves the secrets for a running server: the build phase is ignored
    /// and placeholder values are rejected, even when set explicitly.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Config`] naming the first missing or
    /// placeholder secret.
    pub fn resolve_runtime(config: &Config) -> Result<Self> {
        Self::resolve_with(config, false)
    }

    fn resolve_with(config: &Config, build_phase: bool) -> Result<Self> {
        let require = |key: &str, value: Option<&String>| -> Result<String> {
            match value.filter(|v| !v.is_empty()) {
                Some(v) if !build_phase && v.starts_with(PLACEHOLDER_PREFIX) => {
                    Err(GatewayError::Config(format!(
                        "secret {key} holds a build-time placeholder and cannot be used at runtime"
                    )))
                }
                Some(v) => Ok(v.clone()),
                None if build_phase => {
                    tracing::warn!(key, "secret not set, using build-time placeholder");
                    Ok(format!("{PLACEHOLDER_PREFIX}{key}"))
                }
                None => Err(GatewayError::Config(format!(
                    "required secret {key} is not set; provide it via the environment or the config file"
                ))),
            }
        };

        Ok(Self {
            google_client_id: require("GOOGLE_CLIENT_ID", config.oauth.client_id.as_ref())?,
            google_client_secret: require(
                "GOOGLE_CLIENT_SECRET",
                config.oauth.client_secret.as_ref(),
            )?
            .into(),
            session_secret: require("SESSION_SECRET", config.session.secret.as_ref())?.into(),
        })
    }
}
