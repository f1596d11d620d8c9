use pokenae_types::GatewayError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default per-call timeout for backend services (30 s).
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

fn default_true() -> bool {
    true
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

/// One backend service reachable through `/api/services/{name}/…`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub base_url: String,
    /// Sent as `Authorization: Bearer` when no user token is available.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl ServiceConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

/// Deployment environment, mirroring the front-end's `debug` / `development`
/// / `production` modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Debug,
    #[default]
    Development,
    Production,
}

impl Environment {
    #[must_use]
    pub fn is_production(self) -> bool {
        self == Self::Production
    }
}

/// How an authorization code is turned into tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeMode {
    /// Call Google's token endpoint directly with the client secret.
    #[default]
    Provider,
    /// Delegate the exchange to the backend's authentication callback.
    Backend,
}

fn default_auth_url() -> String {
    "https://accounts.google.com/o/oauth2/v2/auth".to_string()
}
fn default_token_url() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}
fn default_userinfo_url() -> String {
    "https://www.googleapis.com/oauth2/v2/userinfo".to_string()
}
fn default_callback_path() -> String {
    "/api/auth/callback".to_string()
}
fn default_scopes() -> Vec<String> {
    [
        "openid",
        "email",
        "profile",
        "https://www.googleapis.com/auth/spreadsheets",
        "https://www.googleapis.com/auth/drive.file",
    ]
    .map(String::from)
    .to_vec()
}

/// Google OAuth client settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthConfig {
    /// Overridden by `GOOGLE_CLIENT_ID`.
    #[serde(default)]
    pub client_id: Option<String>,
    /// Overridden by `GOOGLE_CLIENT_SECRET`.
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default = "default_auth_url")]
    pub auth_url: String,
    #[serde(default = "default_token_url")]
    pub token_url: String,
    #[serde(default = "default_userinfo_url")]
    pub userinfo_url: String,
    /// Whether to fetch the userinfo profile after the exchange.
    #[serde(default = "default_true")]
    pub fetch_profile: bool,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    /// Path of the local callback route, joined onto `public_url`.
    #[serde(default = "default_callback_path")]
    pub callback_path: String,
    #[serde(default)]
    pub exchange: ExchangeMode,
    /// Full URL of the backend delegate, required when `exchange: backend`.
    #[serde(default)]
    pub backend_callback_url: Option<String>,
    /// Limit for each token, refresh and userinfo call.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl OAuthConfig {
    #[must_use]
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timeout_ms)
    }
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            auth_url: default_auth_url(),
            token_url: default_token_url(),
            userinfo_url: default_userinfo_url(),
            fetch_profile: true,
            scopes: default_scopes(),
            callback_path: default_callback_path(),
            exchange: ExchangeMode::default(),
            backend_callback_url: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

fn default_cookie_name() -> String {
    "pokenae.session".to_string()
}
fn default_max_age() -> u64 {
    30 * 24 * 60 * 60
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Cookie signing key. Overridden by `SESSION_SECRET`.
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    #[serde(default = "default_max_age")]
    pub max_age_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            secret: None,
            cookie_name: default_cookie_name(),
            max_age_secs: default_max_age(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_port() -> u16 {
    3001
}
fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_public_url() -> String {
    "http://localhost:3001".to_string()
}
fn default_services() -> BTreeMap<String, ServiceConfig> {
    (1..=3)
        .map(|n| {
            (
                format!("service{n}"),
                ServiceConfig::new(format!("http://localhost:800{n}")),
            )
        })
        .collect()
}

/// Top-level application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Listen port (defaults to 3001).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Listen address (defaults to `127.0.0.1`).
    #[serde(default = "default_host")]
    pub host: String,
    /// Externally visible origin, used to build the OAuth redirect URI.
    #[serde(default = "default_public_url")]
    pub public_url: String,
    #[serde(default)]
    pub environment: Environment,
    #[serde(default)]
    pub mock_mode: bool,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default = "default_services")]
    pub services: BTreeMap<String, ServiceConfig>,
    #[serde(default)]
    pub oauth: OAuthConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            public_url: default_public_url(),
            environment: Environment::default(),
            mock_mode: false,
            log: LogConfig::default(),
            services: default_services(),
            oauth: OAuthConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

impl Config {
    /// Parses configuration from a YAML string, merged with defaults.
    ///
    /// # Errors
    ///
    /// Returns a [`figment::Error`] if the YAML is invalid or extraction fails.
    #[allow(clippy::result_large_err)]
    pub fn from_yaml(yaml: &str) -> Result<Self, figment::Error> {
        use figment::{
            Figment,
            providers::{Format as _, Serialized, Yaml},
        };
        Figment::from(Serialized::defaults(Config::figment_base()))
            .merge(Yaml::string(yaml))
            .extract()
            .map(Config::with_default_services)
    }

    /// Loads configuration from defaults, an optional YAML file, and
    /// `POKENAE_`-prefixed environment variables (`__` separates nested keys,
    /// e.g. `POKENAE_LOG__LEVEL`).
    ///
    /// # Errors
    ///
    /// Returns a [`figment::Error`] if the file cannot be read or parsed.
    #[allow(clippy::result_large_err)]
    pub fn load(path: Option<&std::path::Path>) -> Result<Self, figment::Error> {
        use figment::{
            Figment,
            providers::{Env, Format as _, Serialized, Yaml},
        };
        let mut figment = Figment::from(Serialized::defaults(Config::figment_base()));
        if let Some(path) = path {
            if !path.is_file() {
                return Err(figment::Error::from(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            figment = figment.merge(Yaml::file(path));
        }
        figment
            .merge(Env::prefixed("POKENAE_").split("__").ignore(&["phase"]))
            .extract()
            .map(Config::with_default_services)
    }

    /// Defaults fed to figment. The service map starts empty so that a
    /// configured `services` table replaces the built-in one instead of being
    /// merged into it.
    fn figment_base() -> Self {
        Self {
            services: BTreeMap::new(),
            ..Self::default()
        }
    }

    fn with_default_services(mut self) -> Self {
        if self.services.is_empty() {
            self.services = default_services();
        }
        self
    }

    /// Absolute OAuth redirect URI registered with the provider.
    #[must_use]
    pub fn redirect_uri(&self) -> String {
        format!(
            "{}{}",
            self.public_url.trim_end_matches('/'),
            self.oauth.callback_path
        )
    }

    /// Checks invariants serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Config`] naming the first offending setting.
    pub fn validate(&self) -> pokenae_types::error::Result<()> {
        for (name, svc) in &self.services {
            if name.is_empty() || name.contains('/') {
                return Err(GatewayError::Config(format!(
                    "invalid service name {name:?}"
                )));
            }
            if !(svc.base_url.starts_with("http://") || svc.base_url.starts_with("https://")) {
                return Err(GatewayError::Config(format!(
                    "service {name}: base_url must be an http(s) URL, got {:?}",
                    svc.base_url
                )));
            }
            if svc.timeout_ms == 0 {
                return Err(GatewayError::Config(format!(
                    "service {name}: timeout_ms must be positive"
                )));
            }
        }
        if !self.oauth.callback_path.starts_with('/') {
            return Err(GatewayError::Config(
                "oauth.callback_path must start with '/'".into(),
            ));
        }
        if self.oauth.timeout_ms == 0 {
            return Err(GatewayError::Config(
                "oauth.timeout_ms must be positive".into(),
            ));
        }
        if self.oauth.exchange == ExchangeMode::Backend && self.oauth.backend_callback_url.is_none()
        {
            return Err(GatewayError::Config(
                "oauth.backend_callback_url is required when oauth.exchange is 'backend'".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_YAML: &str = r#"
port: 9000
host: "0.0.0.0"
public_url: "https://pokenae.example/"
environment: production
services:
  collection:
    base_url: "https://api.example/collection"
    api_key: "k-123"
    timeout_ms: 5000
  records:
    base_url: "http://records.internal"
oauth:
  exchange: backend
  backend_callback_url: "https://api.example/api/authentication/callback"
  fetch_profile: false
  timeout_ms: 8000
"#;

    #[test]
    fn test_default_config() {
        let c = Config::default();
        assert_eq!(c.port, 3001);
        assert_eq!(c.host, "127.0.0.1");
        assert_eq!(c.services.len(), 3);
        assert_eq!(c.services["service2"].base_url, "http://localhost:8002");
        assert_eq!(c.services["service2"].timeout_ms, DEFAULT_TIMEOUT_MS);
        assert_eq!(c.environment, Environment::Development);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_from_yaml_services_replace_defaults() {
        let c = Config::from_yaml(SAMPLE_YAML).unwrap();
        assert_eq!(c.port, 9000);
        assert_eq!(c.environment, Environment::Production);
        let svc = &c.services["collection"];
        assert_eq!(svc.api_key.as_deref(), Some("k-123"));
        assert_eq!(svc.timeout_ms, 5000);
        assert_eq!(c.services["records"].timeout_ms, DEFAULT_TIMEOUT_MS);
        assert_eq!(c.services.len(), 2);
    }

    #[test]
    fn test_from_yaml_oauth_section() {
        let c = Config::from_yaml(SAMPLE_YAML).unwrap();
        assert_eq!(c.oauth.exchange, ExchangeMode::Backend);
        assert!(!c.oauth.fetch_profile);
        assert_eq!(c.oauth.token_url, default_token_url());
        assert_eq!(c.oauth.timeout(), std::time::Duration::from_secs(8));
        assert_eq!(Config::default().oauth.timeout_ms, DEFAULT_TIMEOUT_MS);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_from_yaml_defaults_applied() {
        let c = Config::from_yaml("port: 1234").unwrap();
        assert_eq!(c.port, 1234);
        assert_eq!(c.host, "127.0.0.1");
        assert_eq!(c.session.cookie_name, "pokenae.session");
        assert_eq!(c.services.len(), 3);
    }

    #[test]
    fn test_redirect_uri_trims_trailing_slash() {
        let c = Config::from_yaml(SAMPLE_YAML).unwrap();
        assert_eq!(c.redirect_uri(), "https://pokenae.example/api/auth/callback");
    }

    #[test]
    fn test_validate_rejects_bad_base_url() {
        let mut c = Config::default();
        c.services
            .insert("broken".into(), ServiceConfig::new("localhost:9000"));
        let err = c.validate().unwrap_err();
        assert!(err.to_string().contains("broken"));
    }

    #[test]
    fn test_validate_requires_backend_url() {
        let mut c = Config::default();
        c.oauth.exchange = ExchangeMode::Backend;
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pokenae.yaml");
        std::fs::write(&path, "port: 4321\nmock_mode: true\n").unwrap();
        let c = Config::load(Some(&path)).unwrap();
        assert_eq!(c.port, 4321);
        assert!(c.mock_mode);
    }

    #[test]
    fn test_load_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.yaml");
        assert!(Config::load(Some(&path)).is_err());
    }
}
