use std::hash::Hash;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::clock::SharedClock;

/// Cached value plus the instant it was written.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub data: T,
    pub timestamp: Instant,
}

impl<T> CacheEntry<T> {
    pub fn is_fresh(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.timestamp) < ttl
    }
}

/// Map whose entries expire a fixed interval after insertion.
///
/// Expiry is checked when an entry is read; nothing sweeps in the background.
#[derive(Debug)]
pub struct TtlCache<K, V>
where
    K: Eq + Hash,
{
    entries: DashMap<K, CacheEntry<V>>,
    ttl: Duration,
    clock: SharedClock,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration, clock: SharedClock) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            clock,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.get_entry(key).map(|e| e.data)
    }

    /// Fresh entry for `key`; an expired one is dropped on the way.
    pub fn get_entry(&self, key: &K) -> Option<CacheEntry<V>> {
        let now = self.clock.now();
        if let Some(entry) = self.entries.get(key) {
            if entry.is_fresh(now, self.ttl) {
                return Some(entry.clone());
            }
        }
        self.entries.remove_if(key, |_, e| !e.is_fresh(now, self.ttl));
        None
    }

    pub fn insert(&self, key: K, data: V) {
        let timestamp = self.clock.now();
        self.entries.insert(key, CacheEntry { data, timestamp });
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.entries.remove(key).map(|(_, e)| e.data)
    }

    pub fn retain(&self, mut keep: impl FnMut(&K, &V) -> bool) {
        self.entries.retain(|k, e| keep(k, &e.data));
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Entries currently held, including expired ones not yet read.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> Vec<K> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }

    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, e| e.is_fresh(now, self.ttl));
        before - self.entries.len()
    }
}
