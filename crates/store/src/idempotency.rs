//! Time-bounded set of processed keys.

use async_trait::async_trait;
use pokenae_types::{IdempotencyStore, error::Result};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// An in-memory [`IdempotencyStore`]. Entries expire `ttl` after they were
/// claimed; expired entries are swept on every claim.
#[derive(Default)]
pub struct InMemoryIdempotencyStore {
    seen: Mutex<HashMap<String, Instant>>,
}

impl InMemoryIdempotencyStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn claim(&self, key: &str, ttl: Duration) -> Result<bool> {
        let now = Instant::now();
        let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        seen.retain(|_, until| *until > now);
        if seen.contains_key(key) {
            tracing::debug!("idempotency key already claimed");
            return Ok(false);
        }
        seen.insert(key.to_string(), now + ttl);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(600);

    #[tokio::test]
    async fn test_second_claim_rejected() {
        let store = InMemoryIdempotencyStore::new();
        assert!(store.claim("k", TTL).await.unwrap());
        assert!(!store.claim("k", TTL).await.unwrap());
        assert!(store.claim("other", TTL).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_claim_expires() {
        let store = InMemoryIdempotencyStore::new();
        assert!(store.claim("k", TTL).await.unwrap());
        tokio::time::advance(TTL + Duration::from_secs(1)).await;
        assert!(store.claim("k", TTL).await.unwrap());
    }
}
