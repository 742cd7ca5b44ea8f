//! Content-addressed result cache for scraped pages.
//!
//! Pluggable backends: the shared key-value store when one is configured,
//! otherwise an in-process map. Reads are lock-free, writes are
//! last-writer-wins, and TTLs are enforced when an entry is read.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

use vitae_core::KvStore;

/// The cached body of a successful scrape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedPage {
    pub title: Option<String>,
    pub data: BTreeMap<String, serde_json::Value>,
}

/// Best-effort cache: failures log and degrade to a miss.
#[async_trait]
pub trait ScrapeCache: Send + Sync {
    async fn get(&self, key: &str) -> Option<CachedPage>;
    async fn put(&self, key: &str, page: &CachedPage, ttl: Duration);
}

/// In-process cache with wall-clock TTL.
#[derive(Default)]
pub struct MemoryScrapeCache {
    entries: DashMap<String, (CachedPage, Instant)>,
}

impl MemoryScrapeCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ScrapeCache for MemoryScrapeCache {
    async fn get(&self, key: &str) -> Option<CachedPage> {
        let expired = match self.entries.get(key) {
            Some(entry) => Instant::now() >= entry.1,
            None => return None,
        };
        if expired {
            self.entries.remove(key);
            return None;
        }
        self.entries.get(key).map(|e| e.0.clone())
    }

    async fn put(&self, key: &str, page: &CachedPage, ttl: Duration) {
        self.entries
            .insert(key.to_string(), (page.clone(), Instant::now() + ttl));
    }
}

/// Cache over the shared key-value store, for deployments where scrape
/// results should survive the process.
pub struct KvScrapeCache {
    kv: Arc<dyn KvStore>,
}

impl KvScrapeCache {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }
}

#[async_trait]
impl ScrapeCache for KvScrapeCache {
    async fn get(&self, key: &str) -> Option<CachedPage> {
        match self.kv.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(page) => Some(page),
                Err(e) => {
                    warn!(key, error = %e, "cached page failed to decode, treating as miss");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(key, error = %e, "cache read failed, treating as miss");
                None
            }
        }
    }

    async fn put(&self, key: &str, page: &CachedPage, ttl: Duration) {
        let raw = match serde_json::to_string(page) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key, error = %e, "cached page failed to encode, skipping write");
                return;
            }
        };
        if let Err(e) = self.kv.set(key, &raw, Some(ttl)).await {
            warn!(key, error = %e, "cache write failed");
        }
    }
}
