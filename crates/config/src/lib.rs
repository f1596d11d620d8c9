//! Configuration loading for the pokenae gateway.
//!
//! Uses figment to merge built-in defaults, an optional YAML file and
//! `POKENAE_`-prefixed environment variables, then overlays the well-known
//! deployment variables (`GOOGLE_CLIENT_ID`, `<SERVICE>_BASE_URL`, …) and
//! resolves the required secrets.

pub mod env;
pub mod schema;
pub mod secrets;

pub use env::{EnvLookup, apply_env, process_env, service_env_key};
pub use schema::{
    Config, Environment, ExchangeMode, LogConfig, LogFormat, OAuthConfig, ServiceConfig,
    SessionConfig,
};
pub use secrets::{BUILD_PHASE, PLACEHOLDER_PREFIX, Secrets};
