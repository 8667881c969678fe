//! Response Cache
//!
//! Idempotent JSON GETs are cached per `(identity, url)` so that two users
//! sharing a process never see each other's responses. The cache is a
//! collaborator handed to the connector at construction; the connector
//! never reaches for process-wide state.

use async_trait::async_trait;
use lru::LruCache;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

/// Storage for cached GET responses.
#[async_trait]
pub trait ResponseCache: Send + Sync {
    async fn get(&self, identity: &str, url: &str) -> Option<Value>;

    async fn put(&self, identity: &str, url: &str, value: Value);

    /// Drop every entry. Called whenever a token is registered or removed.
    async fn clear(&self);
}

/// Cache that stores nothing. Selected when the configured TTL is zero.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledCache;

#[async_trait]
impl ResponseCache for DisabledCache {
    async fn get(&self, _identity: &str, _url: &str) -> Option<Value> {
        None
    }

    async fn put(&self, _identity: &str, _url: &str, _value: Value) {}

    async fn clear(&self) {}
}

struct CacheEntry {
    value: Value,
    expires_at: Instant,
}

/// Bounded in-memory cache with per-entry expiry.
pub struct LruResponseCache {
    entries: Arc<RwLock<LruCache<String, CacheEntry>>>,
    ttl: Duration,
}

impl LruResponseCache {
    /// A zero `capacity` is raised to one.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Arc::new(RwLock::new(LruCache::new(capacity))),
            ttl,
        }
    }

    /// Build the cache matching a TTL: zero disables caching entirely.
    pub fn for_ttl(capacity: usize, ttl: Duration) -> Arc<dyn ResponseCache> {
        if ttl.is_zero() {
            Arc::new(DisabledCache)
        } else {
            Arc::new(Self::new(capacity, ttl))
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    fn cache_key(identity: &str, url: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(identity.as_bytes());
        hasher.update(b"__");
        hasher.update(url.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

#[async_trait]
impl ResponseCache for LruResponseCache {
    async fn get(&self, identity: &str, url: &str) -> Option<Value> {
        let key = Self::cache_key(identity, url);
        let mut entries = self.entries.write().await;

        match entries.get(&key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                debug!(url = %url, "Response cache hit");
                Some(entry.value.clone())
            }
            Some(_) => {
                entries.pop(&key);
                None
            }
            None => None,
        }
    }

    async fn put(&self, identity: &str, url: &str, value: Value) {
        let key = Self::cache_key(identity, url);
        let entry = CacheEntry {
            value,
            expires_at: Instant::now() + self.ttl,
        };
        self.entries.write().await.put(key, entry);
    }

    async fn clear(&self) {
        self.entries.write().await.clear();
    }
}
