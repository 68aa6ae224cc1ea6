//! Result caching for repeated reads.
//!
//! Caches query results keyed by a hash of the table, filter and options.
//! Entries expire after the TTL the caller asked for and are dropped as
//! soon as the table they were read from is written to.

use rowmodel_core::Row;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::time::{Duration, Instant};

/// A cached result set.
#[derive(Debug, Clone)]
pub struct CachedRows {
    /// Table the rows were read from.
    pub table: String,
    /// The rows as returned by the read.
    pub rows: Vec<Row>,
    /// When the rows were read.
    pub stored_at: Instant,
    /// How long the rows may be served.
    pub ttl: Duration,
    /// When this entry was last served.
    pub last_used: Instant,
    /// Number of times this entry has been served.
    pub hit_count: u64,
}

impl CachedRows {
    fn is_fresh(&self, now: Instant) -> bool {
        now.duration_since(self.stored_at) < self.ttl
    }
}

/// LRU-style cache of query results.
///
/// When the cache exceeds `max_size`, the least-recently-used entry is
/// evicted.
#[derive(Debug)]
pub struct QueryCache {
    cache: HashMap<u64, CachedRows>,
    max_size: usize,
    hits: u64,
}

impl QueryCache {
    /// Create a new cache with the given maximum number of entries.
    pub fn new(max_size: usize) -> Self {
        Self {
            cache: HashMap::with_capacity(max_size.min(256)),
            max_size,
            hits: 0,
        }
    }

    /// Serve a fresh cached result, dropping it if it has expired.
    pub fn get(&mut self, key: u64) -> Option<Vec<Row>> {
        let now = Instant::now();
        let fresh = self.cache.get(&key).map(|entry| entry.is_fresh(now))?;
        if !fresh {
            self.cache.remove(&key);
            return None;
        }
        let entry = self.cache.get_mut(&key)?;
        entry.last_used = now;
        entry.hit_count += 1;
        self.hits += 1;
        Some(entry.rows.clone())
    }

    /// Cache `rows` for `ttl`. A zero TTL caches nothing.
    pub fn insert(&mut self, key: u64, table: &str, rows: &[Row], ttl: Duration) {
        if ttl.is_zero() || self.max_size == 0 {
            return;
        }
        if !self.cache.contains_key(&key) && self.cache.len() >= self.max_size {
            self.evict_lru();
        }
        let now = Instant::now();
        self.cache.insert(
            key,
            CachedRows {
                table: table.to_string(),
                rows: rows.to_vec(),
                stored_at: now,
                ttl,
                last_used: now,
                hit_count: 0,
            },
        );
    }

    /// Drop every entry read from `table`.
    pub fn invalidate_table(&mut self, table: &str) {
        self.cache.retain(|_, entry| entry.table != table);
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Check if cache is empty.
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Total number of reads served from the cache.
    pub fn hits(&self) -> u64 {
        self.hits
    }

    /// Clear all cached results.
    pub fn clear(&mut self) {
        self.cache.clear();
    }

    /// Evict the least-recently-used entry.
    fn evict_lru(&mut self) {
        if let Some((&lru_key, _)) = self.cache.iter().min_by_key(|(_, entry)| entry.last_used) {
            self.cache.remove(&lru_key);
        }
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(1024)
    }
}

/// Compute a cache key from any hashable value.
pub fn cache_key(value: &impl Hash) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}
