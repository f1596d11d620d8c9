//! Immutable name → backend mapping built once at startup.

use pokenae_config::{Config, ServiceConfig};
use pokenae_types::{GatewayError, error::Result};
use secrecy::SecretString;
use std::{collections::BTreeMap, time::Duration};

/// A resolved backend service.
#[derive(Debug, Clone)]
pub struct ServiceEndpoint {
    pub name: String,
    /// Base URL without a trailing `/`.
    pub base_url: String,
    pub api_key: Option<SecretString>,
    pub timeout: Duration,
}

impl ServiceEndpoint {
    pub fn new(name: impl Into<String>, cfg: &ServiceConfig) -> Self {
        Self {
            name: name.into(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key: cfg
                .api_key
                .as_deref()
                .filter(|k| !k.is_empty())
                .map(SecretString::from),
            timeout: Duration::from_millis(cfg.timeout_ms),
        }
    }

    /// `base_url + "/" + path`, with the query string appended verbatim.
    #[must_use]
    pub fn url_for(&self, path: &str, query: Option<&str>) -> String {
        let mut url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        if let Some(q) = query.filter(|q| !q.is_empty()) {
            url.push('?');
            url.push_str(q);
        }
        url
    }

    #[must_use]
    pub fn timeout_ms(&self) -> u64 {
        u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ServiceRegistry {
    services: BTreeMap<String, ServiceEndpoint>,
}

impl ServiceRegistry {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let services = config
            .services
            .iter()
            .map(|(name, cfg)| (name.clone(), ServiceEndpoint::new(name.clone(), cfg)))
            .collect();
        Self { services }
    }

    /// Look up a service by name.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidService`] listing the known names.
    pub fn get(&self, name: &str) -> Result<&ServiceEndpoint> {
        self.services
            .get(name)
            .ok_or_else(|| GatewayError::InvalidService {
                name: name.to_string(),
                available: self.names(),
            })
    }

    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.services.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ServiceEndpoint> {
        self.services.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.services.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry() {
        let r = ServiceRegistry::from_config(&Config::default());
        assert_eq!(r.names(), vec!["service1", "service2", "service3"]);
        assert_eq!(r.get("service2").unwrap().base_url, "http://localhost:8002");
        assert_eq!(r.get("service1").unwrap().timeout_ms(), 30_000);
    }

    #[test]
    fn test_unknown_service_lists_available() {
        let r = ServiceRegistry::from_config(&Config::default());
        let err = r.get("nope").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("nope"));
        assert!(msg.contains("service1, service2, service3"));
    }

    #[test]
    fn test_url_for_strips_slashes_and_appends_query() {
        let ep = ServiceEndpoint::new("s", &ServiceConfig::new("http://backend:8001/"));
        assert_eq!(ep.url_for("users", Some("limit=5")), "http://backend:8001/users?limit=5");
        assert_eq!(ep.url_for("/a%2Fb/c", None), "http://backend:8001/a%2Fb/c");
        assert_eq!(ep.url_for("x", Some("")), "http://backend:8001/x");
    }

    #[test]
    fn test_empty_api_key_ignored() {
        let mut cfg = ServiceConfig::new("http://b");
        cfg.api_key = Some(String::new());
        assert!(ServiceEndpoint::new("s", &cfg).api_key.is_none());
    }
}
