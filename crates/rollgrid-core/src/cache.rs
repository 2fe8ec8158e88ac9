//! TTL cache with LRU eviction for poller snapshots.
//!
//! Pollers that fetch load-balancer or service-registry state keep their
//! last answers here, keyed by server or instance id. Expiry is computed
//! from an injected [`Clock`](crate::clock::Clock), so tests drive time
//! explicitly. The mapping, planning and parameter code never touches a
//! cache.
//!
//! The cache is **not internally synchronized**; wrap it in a `Mutex`
//! when it is shared between poller tasks.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use tracing::debug;

use crate::clock::SharedClock;

/// Configuration for a [`TtlCache`].
#[derive(Clone, Debug)]
pub struct TtlCacheConfig {
    /// Time-to-live for entries (default: 30 seconds).
    pub ttl: Duration,
    /// Maximum number of entries (default: 1024).
    pub max_entries: usize,
}

impl Default for TtlCacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(30),
            max_entries: 1024,
        }
    }
}

/// Accumulated cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

struct Entry<V> {
    value: V,
    inserted_at: u64,
    /// Logical access tick for LRU ordering.
    last_access: u64,
}

/// Bounded key/value cache with per-entry TTL.
pub struct TtlCache<K, V> {
    entries: HashMap<K, Entry<V>>,
    config: TtlCacheConfig,
    clock: SharedClock,
    tick: u64,
    stats: CacheStats,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
{
    pub fn new(config: TtlCacheConfig, clock: SharedClock) -> Self {
        Self {
            entries: HashMap::new(),
            config,
            clock,
            tick: 0,
            stats: CacheStats::default(),
        }
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn is_expired(&self, inserted_at: u64) -> bool {
        let age = self.clock.now_secs().saturating_sub(inserted_at);
        age >= self.config.ttl.as_secs()
    }

    /// Look up a live entry. Expired entries are removed eagerly and
    /// counted as misses.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let expired = match self.entries.get(key) {
            Some(entry) => self.is_expired(entry.inserted_at),
            None => {
                self.stats.misses += 1;
                debug!(?key, misses = self.stats.misses, "cache miss");
                return None;
            }
        };

        if expired {
            self.entries.remove(key);
            self.stats.misses += 1;
            debug!(?key, misses = self.stats.misses, "cache miss (expired)");
            return None;
        }

        let tick = self.next_tick();
        self.stats.hits += 1;
        let entry = self.entries.get_mut(key)?;
        entry.last_access = tick;
        Some(&entry.value)
    }

    /// Insert or replace an entry. When the cache is full the
    /// least-recently-used entry is evicted first.
    pub fn insert(&mut self, key: K, value: V) {
        let now = self.clock.now_secs();
        let tick = self.next_tick();

        if !self.entries.contains_key(&key) && self.entries.len() >= self.config.max_entries {
            self.evict_lru();
        }

        self.entries.insert(
            key,
            Entry {
                value,
                inserted_at: now,
                last_access: tick,
            },
        );
    }

    /// Drop an entry. Returns its value if one was cached.
    pub fn invalidate(&mut self, key: &K) -> Option<V> {
        self.entries.remove(key).map(|e| e.value)
    }

    /// Remove every expired entry. Returns how many were dropped.
    pub fn purge_expired(&mut self) -> usize {
        let now = self.clock.now_secs();
        let ttl = self.config.ttl.as_secs();
        let before = self.entries.len();
        self.entries
            .retain(|_, e| now.saturating_sub(e.inserted_at) < ttl);
        before - self.entries.len()
    }

    fn evict_lru(&mut self) {
        let lru_key = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_access)
            .map(|(key, _)| key.clone());

        if let Some(key) = lru_key {
            self.entries.remove(&key);
            self.stats.evictions += 1;
            debug!(?key, evictions = self.stats.evictions, "cache eviction (lru)");
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::Arc;

    fn cache(ttl_secs: u64, max: usize) -> (TtlCache<u64, String>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000));
        let cache = TtlCache::new(
            TtlCacheConfig {
                ttl: Duration::from_secs(ttl_secs),
                max_entries: max,
            },
            clock.clone(),
        );
        (cache, clock)
    }

    #[test]
    fn hit_then_expire() {
        let (mut cache, clock) = cache(30, 8);
        cache.insert(1, "srv01".to_string());

        assert_eq!(cache.get(&1).map(String::as_str), Some("srv01"));

        clock.advance(29);
        assert!(cache.get(&1).is_some());

        clock.advance(1);
        assert!(cache.get(&1).is_none());
        assert!(cache.is_empty());

        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn miss_on_unknown_key() {
        let (mut cache, _) = cache(30, 8);
        assert!(cache.get(&42).is_none());
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn evicts_least_recently_used() {
        let (mut cache, _) = cache(300, 2);
        cache.insert(1, "a".to_string());
        cache.insert(2, "b".to_string());

        // Touch 1 so 2 becomes the LRU entry.
        cache.get(&1);
        cache.insert(3, "c".to_string());

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&2).is_none());
        assert!(cache.get(&1).is_some());
        assert!(cache.get(&3).is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn replacing_existing_key_does_not_evict() {
        let (mut cache, _) = cache(300, 2);
        cache.insert(1, "a".to_string());
        cache.insert(2, "b".to_string());
        cache.insert(1, "a2".to_string());

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().evictions, 0);
        assert_eq!(cache.get(&1).map(String::as_str), Some("a2"));
    }

    #[test]
    fn reinsert_resets_ttl() {
        let (mut cache, clock) = cache(10, 8);
        cache.insert(1, "a".to_string());
        clock.advance(8);
        cache.insert(1, "b".to_string());
        clock.advance(8);
        assert_eq!(cache.get(&1).map(String::as_str), Some("b"));
    }

    #[test]
    fn purge_and_invalidate() {
        let (mut cache, clock) = cache(10, 8);
        cache.insert(1, "a".to_string());
        clock.advance(5);
        cache.insert(2, "b".to_string());
        clock.advance(6);

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.invalidate(&2), Some("b".to_string()));
        assert!(cache.is_empty());
    }
}
