//! Cache Store Module
//!
//! Synchronous storage engine: entries with expiration plus the set of
//! protected keys that non-forced deletions must leave alone.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::time::Duration;

use chrono::Utc;

use crate::cache::{CacheEntry, CacheStats, RetrievalResult};

// == Cache Store ==
#[derive(Debug)]
pub struct CacheStore<K, V> {
    /// Key-value storage
    entries: HashMap<K, CacheEntry<V>>,
    /// Keys exempt from non-forced deletion
    protected: HashSet<K>,
    /// Lookup and loader statistics
    stats: CacheStats,
    /// TTL for entries set without explicit TTL
    default_ttl: Duration,
}

impl<K, V> CacheStore<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    // == Constructor ==
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            protected: HashSet::new(),
            stats: CacheStats::new(),
            default_ttl,
        }
    }

    // == Set ==
    /// Unconditionally stores `value`, expiring `ttl` (or the default) from now.
    pub fn set(&mut self, key: K, value: V, ttl: Option<Duration>) {
        let entry = CacheEntry::new(value, ttl.unwrap_or(self.default_ttl));
        self.entries.insert(key, entry);
    }

    // == Get ==
    /// Returns the value if fresh.
    ///
    /// A stale entry is removed when `remove_on_expire` is set, regardless
    /// of protection, and reported as absent either way.
    pub fn get(&mut self, key: &K, remove_on_expire: bool) -> Option<V> {
        let lookup = self.classify(key);
        self.record_lookup(&lookup);
        match lookup {
            RetrievalResult::Hit { value, .. } => Some(value),
            RetrievalResult::Expired { .. } => {
                if remove_on_expire {
                    self.entries.remove(key);
                }
                None
            }
            RetrievalResult::Miss => None,
        }
    }

    // == Classify ==
    /// Hit, expired or miss, without touching storage or statistics.
    pub fn classify(&self, key: &K) -> RetrievalResult<V> {
        let Some(entry) = self.entries.get(key) else {
            return RetrievalResult::Miss;
        };
        if entry.is_expired_at(Utc::now()) {
            RetrievalResult::Expired {
                value: entry.value.clone(),
                expiration_time: entry.expires_at,
            }
        } else {
            RetrievalResult::Hit {
                value: entry.value.clone(),
                expiration_time: entry.expires_at,
            }
        }
    }

    /// Counts a classification in the statistics.
    pub fn record_lookup(&mut self, lookup: &RetrievalResult<V>) {
        match lookup {
            RetrievalResult::Hit { .. } => self.stats.record_hit(),
            RetrievalResult::Expired { .. } => self.stats.record_stale_read(),
            RetrievalResult::Miss => self.stats.record_miss(),
        }
    }

    // == Invalidate ==
    /// Marks a fresh entry as expired while keeping it stored.
    ///
    /// Returns false when the key was missing or already stale.
    pub fn invalidate(&mut self, key: &K) -> bool {
        match self.classify(key) {
            RetrievalResult::Hit { value, .. } => {
                self.set(key.clone(), value, Some(Duration::ZERO));
                true
            }
            _ => false,
        }
    }

    // == Delete ==
    /// Removes an entry unless it is protected and `force` is unset.
    ///
    /// Returns true when an entry was removed.
    pub fn delete(&mut self, key: &K, force: bool) -> bool {
        if !force && self.protected.contains(key) {
            return false;
        }
        self.entries.remove(key).is_some()
    }

    // == Clear ==
    /// Deletes every entry, sparing protected keys unless forced.
    ///
    /// Returns the number of entries removed.
    pub fn clear(&mut self, force: bool) -> usize {
        let before = self.entries.len();
        if force {
            self.entries.clear();
        } else {
            let protected = &self.protected;
            self.entries.retain(|key, _| protected.contains(key));
        }
        before - self.entries.len()
    }

    // == Purge Expired ==
    /// Deletes every stale entry, sparing protected keys unless forced.
    ///
    /// Returns the number of entries removed.
    pub fn purge_expired(&mut self, force: bool) -> usize {
        let now = Utc::now();
        let before = self.entries.len();
        let protected = &self.protected;
        self.entries
            .retain(|key, entry| !entry.is_expired_at(now) || (!force && protected.contains(key)));
        before - self.entries.len()
    }

    // == Protection ==
    pub fn add_protected<I: IntoIterator<Item = K>>(&mut self, keys: I) {
        self.protected.extend(keys);
    }

    pub fn remove_protected<I: IntoIterator<Item = K>>(&mut self, keys: I) {
        for key in keys {
            self.protected.remove(&key);
        }
    }

    pub fn is_protected(&self, key: &K) -> bool {
        self.protected.contains(key)
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.set_total_entries(self.entries.len());
        stats
    }

    pub fn stats_mut(&mut self) -> &mut CacheStats {
        &mut self.stats
    }

    /// Snapshot of every stored key, fresh or stale.
    pub fn keys(&self) -> Vec<K> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
