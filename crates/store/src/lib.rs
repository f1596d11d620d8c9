//! Server-side storage backends for sessions and callback idempotency keys.
//!
//! Both stores are process-local. A deployment running several gateway
//! replicas needs sticky sessions or an external implementation of the
//! [`pokenae_types::SessionStore`] and [`pokenae_types::IdempotencyStore`] traits.

pub mod idempotency;
pub mod memory;

pub use idempotency::InMemoryIdempotencyStore;
pub use memory::InMemorySessionStore;
