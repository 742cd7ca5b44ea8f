//! Shared key-value store contract.
//!
//! Circuit breaker state, router telemetry, and the scrape cache all live
//! behind this trait so any worker can read and update them. Every consumer
//! treats the store as best-effort: a store failure must never take the
//! request path down with it.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::error::{Result, VitaeError};

/// Async key-value store with TTLs, atomic counters, and bounded lists.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read a string value. Expired keys read as absent.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a string value, optionally with a time-to-live.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;

    /// Atomically increment an integer counter, creating it at 0 if absent.
    /// Returns the post-increment value.
    async fn incr(&self, key: &str) -> Result<i64>;

    /// Set or refresh the TTL on an existing key. No-op if the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<()>;

    /// Remove a key. Idempotent.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Push a value to the front of a list, trimming it to `cap` entries.
    async fn push_bounded(&self, key: &str, value: &str, cap: usize) -> Result<()>;

    /// Read a list front-to-back (most recently pushed first).
    async fn list(&self, key: &str) -> Result<Vec<String>>;
}

#[derive(Debug, Clone)]
enum Value {
    Text(String),
    Counter(i64),
    List(VecDeque<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// In-process [`KvStore`] backed by a concurrent map.
///
/// TTLs are enforced at read time; expired entries are dropped on access.
/// This is the default backing store for breaker state and telemetry when no
/// external store is configured, and the store every test runs against.
#[derive(Debug, Clone, Default)]
pub struct MemoryKv {
    entries: std::sync::Arc<DashMap<String, Entry>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop an entry if its TTL has elapsed. Returns true when the key is live.
    fn sweep(&self, key: &str) -> bool {
        if let Some(entry) = self.entries.get(key) {
            if entry.expired() {
                drop(entry);
                self.entries.remove(key);
                return false;
            }
            return true;
        }
        false
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        if !self.sweep(key) {
            return Ok(None);
        }
        Ok(self.entries.get(key).map(|e| match &e.value {
            Value::Text(s) => s.clone(),
            Value::Counter(n) => n.to_string(),
            Value::List(items) => items.front().cloned().unwrap_or_default(),
        }))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value: Value::Text(value.to_string()),
                expires_at: ttl.map(|d| Instant::now() + d),
            },
        );
        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        self.sweep(key);
        let mut entry = self.entries.entry(key.to_string()).or_insert(Entry {
            value: Value::Counter(0),
            expires_at: None,
        });
        match &mut entry.value {
            Value::Counter(n) => {
                *n += 1;
                Ok(*n)
            }
            Value::Text(s) => {
                let n = s
                    .parse::<i64>()
                    .map_err(|_| VitaeError::KvStore(format!("{key} is not a counter")))?
                    + 1;
                entry.value = Value::Counter(n);
                Ok(n)
            }
            Value::List(_) => Err(VitaeError::KvStore(format!("{key} is not a counter"))),
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.expires_at = Some(Instant::now() + ttl);
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn push_bounded(&self, key: &str, value: &str, cap: usize) -> Result<()> {
        self.sweep(key);
        let mut entry = self.entries.entry(key.to_string()).or_insert(Entry {
            value: Value::List(VecDeque::new()),
            expires_at: None,
        });
        match &mut entry.value {
            Value::List(items) => {
                items.push_front(value.to_string());
                items.truncate(cap);
                Ok(())
            }
            _ => Err(VitaeError::KvStore(format!("{key} is not a list"))),
        }
    }

    async fn list(&self, key: &str) -> Result<Vec<String>> {
        if !self.sweep(key) {
            return Ok(vec![]);
        }
        Ok(self
            .entries
            .get(key)
            .map(|e| match &e.value {
                Value::List(items) => items.iter().cloned().collect(),
                Value::Text(s) => vec![s.clone()],
                Value::Counter(n) => vec![n.to_string()],
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_roundtrip() {
        let kv = MemoryKv::new();
        kv.set("k", "v", None).await.unwrap();
        assert_eq!(kv.get("k").await.unwrap(), Some("v".to_string()));
        assert_eq!(kv.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_ttl_expiry_enforced_at_read() {
        let kv = MemoryKv::new();
        kv.set("k", "v", Some(Duration::from_millis(10)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(25)).await;
        assert_eq!(kv.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_incr_counts_up_from_zero() {
        let kv = MemoryKv::new();
        assert_eq!(kv.incr("c").await.unwrap(), 1);
        assert_eq!(kv.incr("c").await.unwrap(), 2);
        assert_eq!(kv.incr("c").await.unwrap(), 3);
        assert_eq!(kv.get("c").await.unwrap(), Some("3".to_string()));
    }

    #[tokio::test]
    async fn test_expired_counter_restarts() {
        let kv = MemoryKv::new();
        kv.incr("c").await.unwrap();
        kv.expire("c", Duration::from_millis(10)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(25)).await;
        assert_eq!(kv.incr("c").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_push_bounded_keeps_most_recent() {
        let kv = MemoryKv::new();
        for i in 0..5 {
            kv.push_bounded("l", &i.to_string(), 3).await.unwrap();
        }
        assert_eq!(kv.list("l").await.unwrap(), vec!["4", "3", "2"]);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let kv = MemoryKv::new();
        kv.set("k", "v", None).await.unwrap();
        kv.delete("k").await.unwrap();
        kv.delete("k").await.unwrap();
        assert_eq!(kv.get("k").await.unwrap(), None);
    }
}
