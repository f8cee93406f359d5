//! Time-bounded cache for external API responses.
//!
//! Each key moves through `absent → fresh → stale → fresh`. A read while
//! fresh returns the cached value without fetching; a read while stale or
//! absent runs the caller's fetch and overwrites the entry. Staleness is
//! computed lazily at read time (`now - inserted_at >= ttl`) and entries are
//! never evicted proactively.
//!
//! Reads are concurrent. The check-then-fetch sequence is serialized per
//! key, so concurrent misses on the same key result in a single fetch. A
//! key's fetch lock lives only while some lookup on that key is in progress.
//!
//! When a refetch fails and a stale value exists, the stale value is served
//! and the failure is reported as [`Lookup::Stale`]. Without a stale value
//! the failure propagates as [`Error::CacheFetch`].

use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tokio::time::Instant;

use crate::error::{Error, Result};

/// Default staleness window for committee activity data.
pub const DEFAULT_TTL: Duration = Duration::from_secs(30 * 60);

struct Entry<V> {
    value: V,
    inserted_at: Instant,
}

/// How a [`TtlCache::lookup`] was satisfied.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<V> {
    /// Served from a fresh entry; no fetch ran.
    Fresh(V),
    /// Fetched and stored.
    Fetched(V),
    /// The refetch failed; this is the previous (stale) value.
    Stale { value: V, error: String },
}

impl<V> Lookup<V> {
    pub fn value(&self) -> &V {
        match self {
            Lookup::Fresh(v) | Lookup::Fetched(v) => v,
            Lookup::Stale { value, .. } => value,
        }
    }

    pub fn into_value(self) -> V {
        match self {
            Lookup::Fresh(v) | Lookup::Fetched(v) => v,
            Lookup::Stale { value, .. } => value,
        }
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, Lookup::Stale { .. })
    }
}

pub struct TtlCache<V> {
    entries: RwLock<HashMap<String, Entry<V>>>,
    fetch_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl<V> Default for TtlCache<V> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            fetch_locks: Mutex::new(HashMap::new()),
        }
    }
}

impl<V: Clone> TtlCache<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached value for `key` if younger than `ttl`, otherwise
    /// run `fetch` and cache its result.
    pub async fn get_or_fetch<F, Fut, E>(&self, key: &str, ttl: Duration, fetch: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
        E: Display,
    {
        self.lookup(key, ttl, fetch).await.map(Lookup::into_value)
    }

    /// Like [`get_or_fetch`](Self::get_or_fetch), but reports whether the
    /// value was fresh, fetched, or a stale fallback.
    pub async fn lookup<F, Fut, E>(&self, key: &str, ttl: Duration, fetch: F) -> Result<Lookup<V>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
        E: Display,
    {
        if let Some(value) = self.get_fresh(key, ttl) {
            return Ok(Lookup::Fresh(value));
        }

        let lock = self.fetch_lock(key);
        let outcome = {
            let _guard = lock.lock().await;
            self.refresh(key, ttl, fetch).await
        };
        self.release_fetch_lock(key, &lock);
        outcome
    }

    async fn refresh<F, Fut, E>(&self, key: &str, ttl: Duration, fetch: F) -> Result<Lookup<V>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
        E: Display,
    {
        // Another task may have refreshed the entry while we waited.
        if let Some(value) = self.get_fresh(key, ttl) {
            return Ok(Lookup::Fresh(value));
        }

        match fetch().await {
            Ok(value) => {
                self.insert(key, value.clone());
                Ok(Lookup::Fetched(value))
            }
            Err(e) => {
                let message = e.to_string();
                match self.peek(key) {
                    Some(value) => {
                        tracing::warn!(key, error = %message, "refetch failed, serving stale value");
                        Ok(Lookup::Stale {
                            value,
                            error: message,
                        })
                    }
                    None => Err(Error::CacheFetch {
                        key: key.to_string(),
                        message,
                    }),
                }
            }
        }
    }

    /// The cached value if present and younger than `ttl`.
    pub fn get_fresh(&self, key: &str, ttl: Duration) -> Option<V> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries
            .get(key)
            .filter(|entry| entry.inserted_at.elapsed() < ttl)
            .map(|entry| entry.value.clone())
    }

    /// The cached value regardless of age.
    pub fn peek(&self, key: &str) -> Option<V> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(key).map(|entry| entry.value.clone())
    }

    /// Insert or overwrite `key`, stamping it with the current time.
    pub fn insert(&self, key: &str, value: V) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(
            key.to_string(),
            Entry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn fetch_lock(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.fetch_locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(key.to_string()).or_default().clone()
    }

    /// Drop the map's handle once only the map and `lock` hold it.
    fn release_fetch_lock(&self, key: &str, lock: &Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.fetch_locks.lock().unwrap_or_else(|e| e.into_inner());
        if Arc::strong_count(lock) == 2 {
            locks.remove(key);
        }
    }

    #[cfg(test)]
    fn fetch_lock_count(&self) -> usize {
        self.fetch_locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
