//! Core types and traits for the pokenae gateway workspace.
//!
//! This crate defines the shared abstractions used across every layer of the
//! gateway: the error type and its wire codes, the response envelope returned
//! by proxied calls, the server-side session and token records, and the async
//! storage traits that the store and auth layers implement.

pub mod envelope;
pub mod error;
pub mod session;
pub mod token;
pub mod traits;

pub use envelope::{Envelope, ErrorCode, Failure};
pub use error::GatewayError;
pub use session::{LoginPhase, Session, SessionId, UserProfile};
pub use token::{REFRESH_ERROR, SessionToken, TokenState};
pub use traits::{IdempotencyStore, SessionStore, TokenExchanger};
