//! Lookup cache for expensive backend calls
//!
//! Extraction, Q&A generation and embedding are memoised through this
//! capability. It is an explicit injected dependency of the processor and
//! indexer rather than ambient state, so tests substitute an in-memory stub
//! and a deployment can back it with whatever shared store it has.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

/// Key-value lookup capability for memoising backend calls
#[async_trait]
pub trait LookupCache: Send + Sync {
    async fn get(&self, key: &str) -> Option<String>;
    async fn set(&self, key: &str, value: String);
}

/// In-memory cache; the default, and the stub used in tests
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[async_trait]
impl LookupCache for MemoryCache {
    async fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().await.get(key).cloned()
    }

    async fn set(&self, key: &str, value: String) {
        self.entries.lock().await.insert(key.to_string(), value);
    }
}

/// Cache that stores nothing; for runs where memoisation is unwanted
#[derive(Debug, Default)]
pub struct NoopCache;

#[async_trait]
impl LookupCache for NoopCache {
    async fn get(&self, _key: &str) -> Option<String> {
        None
    }

    async fn set(&self, _key: &str, _value: String) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_cache_round_trip() {
        let cache = MemoryCache::new();
        assert!(cache.get("k").await.is_none());

        cache.set("k", "v".to_string()).await;
        assert_eq!(cache.get("k").await.as_deref(), Some("v"));
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_noop_cache_stores_nothing() {
        let cache = NoopCache;
        cache.set("k", "v".to_string()).await;
        assert!(cache.get("k").await.is_none());
    }
}
