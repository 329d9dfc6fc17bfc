//! Expiring key/value map for derived results.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::hash::Hash;
use tokio::sync::Mutex;

/// One cached value
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<V> {
    /// Cached value
    pub payload: V,
    /// When it was computed
    pub computed_at: DateTime<Utc>,
    /// How long it stays valid
    pub ttl: Duration,
}

impl<V> CacheEntry<V> {
    /// Whether the entry is older than its TTL at `now`
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.computed_at > self.ttl
    }
}

/// Map whose entries expire after a fixed TTL.
///
/// Expiry is lazy on read (an expired hit is deleted and reported as a miss)
/// and eager on [`sweep`](Self::sweep).
#[derive(Debug)]
pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: Mutex<HashMap<K, CacheEntry<V>>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Empty cache with the given TTL
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Store `payload` under `key`, computed at `now`
    pub async fn insert(&self, key: K, payload: V, now: DateTime<Utc>) {
        let entry = CacheEntry {
            payload,
            computed_at: now,
            ttl: self.ttl,
        };
        self.entries.lock().await.insert(key, entry);
    }

    /// Fresh value for `key`, deleting it if it has expired
    pub async fn get(&self, key: &K, now: DateTime<Utc>) -> Option<V> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(key);
                None
            }
            Some(entry) => Some(entry.payload.clone()),
            None => None,
        }
    }

    /// Every fresh value, expired entries deleted
    pub async fn values(&self, now: DateTime<Utc>) -> Vec<V> {
        let mut entries = self.entries.lock().await;
        entries.retain(|_, entry| !entry.is_expired(now));
        entries.values().map(|entry| entry.payload.clone()).collect()
    }

    /// Drop one key
    pub async fn remove(&self, key: &K) -> Option<V> {
        self.entries.lock().await.remove(key).map(|entry| entry.payload)
    }

    /// Delete every expired entry; returns how many were removed
    pub async fn sweep(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    /// Entries currently held, expired or not
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Whether nothing is held
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}
