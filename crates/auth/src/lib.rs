//! Google OAuth login and token lifecycle for browser sessions.
//!
//! [`google`] holds the provider-specific URL building and response parsing,
//! [`state`] the CSRF `state` parameter, and [`exchange`] the two ways an
//! authorization code becomes a token. [`LoginFlow`] drives a login attempt;
//! [`AuthManager`] keeps the resulting token fresh.

pub mod exchange;
pub mod flow;
pub mod google;
pub mod manager;
pub mod state;

pub use exchange::{BackendExchanger, GoogleExchanger};
pub use flow::{CallbackParams, LoginFlow, LoginOutcome};
pub use manager::AuthManager;
