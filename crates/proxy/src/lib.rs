//! HTTP layer: axum router, route handlers, session cookies and the
//! backend service client.
//!
//! Exposes the authenticated service proxy under `/api/services/*` and the
//! Google login routes under `/api/auth/*`.

mod auth_routes;
pub mod client;
pub mod cookie;
mod error;
pub mod registry;
mod services;

pub use auth_routes::SessionStatus;
pub use client::{ForwardRequest, ServiceClient};
pub use cookie::SessionCookie;
pub use error::{ApiError, EnvelopeResponse};
pub use registry::{ServiceEndpoint, ServiceRegistry};

use axum::{
    Router,
    routing::{any, get, post},
};
use pokenae_auth::{AuthManager, BackendExchanger, GoogleExchanger, LoginFlow};
use pokenae_config::{Config, ExchangeMode, Secrets};
use pokenae_store::{InMemoryIdempotencyStore, InMemorySessionStore};
use pokenae_types::{GatewayError, TokenExchanger, error::Result};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

const DEFAULT_CALLBACK_PATH: &str = "/api/auth/callback";
const CALLBACK_ALIAS: &str = "/callback";

/// Shared application state passed to all route handlers.
pub struct AppState {
    /// Backend services, fixed at startup.
    pub registry: Arc<ServiceRegistry>,
    pub client: ServiceClient,
    /// Session store, kept concrete so the binary can sweep expired sessions.
    pub sessions: Arc<InMemorySessionStore>,
    pub auth: Arc<AuthManager>,
    pub login: Arc<LoginFlow>,
    pub cookies: SessionCookie,
    /// Route the OAuth provider redirects back to.
    pub callback_path: String,
}

impl AppState {
    /// Wire every component from a validated config and resolved secrets.
    ///
    /// One `rquest` client is shared by the service client, the token
    /// exchanger and the userinfo lookup.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Config`] if backend exchange is selected without
    /// a backend callback URL, or the session secret is unusable.
    pub fn from_config(config: &Config, secrets: &Secrets) -> Result<Arc<Self>> {
        let http = rquest::Client::new();
        let redirect_uri = config.redirect_uri();

        let exchanger: Arc<dyn TokenExchanger> = match config.oauth.exchange {
            ExchangeMode::Provider => Arc::new(
                GoogleExchanger::new(
                    http.clone(),
                    &config.oauth.token_url,
                    &secrets.google_client_id,
                    secrets.google_client_secret.clone(),
                    &redirect_uri,
                )
                .with_timeout(config.oauth.timeout()),
            ),
            ExchangeMode::Backend => {
                let url = config.oauth.backend_callback_url.as_deref().ok_or_else(|| {
                    GatewayError::Config("oauth.backend_callback_url is required".into())
                })?;
                Arc::new(
                    BackendExchanger::new(http.clone(), url).with_timeout(config.oauth.timeout()),
                )
            }
        };

        let sessions = Arc::new(InMemorySessionStore::new());
        let auth = Arc::new(AuthManager::new(sessions.clone(), exchanger));
        let login = Arc::new(LoginFlow::new(
            Arc::clone(&auth),
            Arc::new(InMemoryIdempotencyStore::new()),
            http.clone(),
            config.oauth.clone(),
            &secrets.google_client_id,
            redirect_uri,
            config.session.max_age_secs,
        ));
        let cookies = SessionCookie::new(
            &config.session.cookie_name,
            &secrets.session_secret,
            config.session.max_age_secs,
            config.environment.is_production(),
        )?;

        Ok(Arc::new(Self {
            registry: Arc::new(ServiceRegistry::from_config(config)),
            client: ServiceClient::new(http),
            sessions,
            auth,
            login,
            cookies,
            callback_path: config.oauth.callback_path.clone(),
        }))
    }
}

/// Build the full axum router.
///
/// Routes:
/// - ANY  /api/services/{service}/{*path}   authenticated backend proxy
/// - GET  /api/auth/login
/// - GET  /api/auth/callback                also `/callback` and a custom `oauth.callback_path`
/// - POST /api/auth/logout
/// - GET  /api/auth/session
pub fn make_router(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        .route("/api/services/{service}/{*path}", any(services::proxy))
        .route("/api/auth/login", get(auth_routes::login))
        .route(DEFAULT_CALLBACK_PATH, get(auth_routes::callback))
        .route(CALLBACK_ALIAS, get(auth_routes::callback))
        .route("/api/auth/logout", post(auth_routes::logout))
        .route("/api/auth/session", get(auth_routes::session));

    let custom = state.callback_path.as_str();
    if custom != DEFAULT_CALLBACK_PATH && custom != CALLBACK_ALIAS {
        router = router.route(custom, get(auth_routes::callback));
    }

    router
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
