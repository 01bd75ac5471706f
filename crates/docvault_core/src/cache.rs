//! In-memory document cache with TTL expiry and LRU eviction.
//!
//! The cache is a read accelerator only; the files on disk are always the
//! source of truth. Entries are keyed by `(collection, id)`.
//!
//! Expiry is lazy: an expired entry is dropped when a `get` finds it, and
//! that `get` counts as a miss. [`CacheManager::purge_expired`] sweeps
//! eagerly for hosts that want memory back sooner.
//!
//! ## Stale reads
//!
//! A reader that loads a file while a writer replaces it could put the old
//! bytes back into the cache after the writer invalidated them. To prevent
//! that, readers take a [`ReadTicket`] before touching the file and insert
//! with [`CacheManager::put_fresh`], which refuses if any invalidation
//! happened since the ticket was taken.

use crate::config::CacheConfig;
use docvault_codec::Document;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Source of monotonic time for expiry decisions.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Returns the current instant.
    fn now(&self) -> Instant;
}

/// The real monotonic clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    /// Creates a clock frozen at the current instant.
    #[must_use]
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock()
    }
}

/// Proof that a read started at a given invalidation epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadTicket(u64);

/// Cache counters at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Whether the cache is enabled.
    pub enabled: bool,
    /// Live entries (including not-yet-purged expired ones).
    pub entries: usize,
    /// Configured capacity.
    pub max_size: usize,
    /// Lookups served from the cache.
    pub hits: u64,
    /// Lookups that fell through to disk.
    pub misses: u64,
    /// Entries dropped to stay within capacity.
    pub evictions: u64,
}

impl CacheStats {
    /// Fraction of lookups that hit, or 0 with no lookups.
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

type CacheKey = (String, String);

#[derive(Debug)]
struct CacheEntry {
    document: Document,
    inserted_at: Instant,
    tick: u64,
}

#[derive(Debug, Default)]
struct CacheInner {
    entries: HashMap<CacheKey, CacheEntry>,
    /// Recency order: lowest tick is least recently used.
    lru: BTreeMap<u64, CacheKey>,
    next_tick: u64,
    epoch: u64,
}

impl CacheInner {
    fn bump(&mut self) -> u64 {
        let tick = self.next_tick;
        self.next_tick += 1;
        tick
    }

    fn remove(&mut self, key: &CacheKey) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.lru.remove(&entry.tick);
        Some(entry)
    }
}

/// TTL + LRU cache of decoded documents.
#[derive(Debug)]
pub struct CacheManager {
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    inner: Mutex<CacheInner>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl CacheManager {
    /// Creates a cache using the system clock.
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates a cache reading time from `clock`.
    #[must_use]
    pub fn with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            inner: Mutex::new(CacheInner::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Returns true if the cache stores anything at all.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.config.enabled && self.config.max_size > 0
    }

    fn is_expired(&self, entry: &CacheEntry, now: Instant) -> bool {
        !self.config.ttl.is_zero() && now.duration_since(entry.inserted_at) >= self.config.ttl
    }

    /// Looks up a document, counting a hit or a miss.
    pub fn get(&self, collection: &str, id: &str) -> Option<Document> {
        if !self.is_enabled() {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        let key = (collection.to_string(), id.to_string());
        let now = self.clock.now();
        let mut inner = self.inner.lock();

        let expired = match inner.entries.get(&key) {
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            Some(entry) => self.is_expired(entry, now),
        };
        if expired {
            inner.remove(&key);
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        let tick = inner.bump();
        let CacheInner { entries, lru, .. } = &mut *inner;
        let entry = entries.get_mut(&key)?;
        lru.remove(&entry.tick);
        entry.tick = tick;
        lru.insert(tick, key);
        self.hits.fetch_add(1, Ordering::Relaxed);
        Some(entry.document.clone())
    }

    /// Inserts or replaces a document, evicting the least recently used
    /// entries beyond capacity.
    pub fn put(&self, collection: &str, id: &str, document: Document) {
        if !self.is_enabled() {
            return;
        }
        let mut inner = self.inner.lock();
        self.insert_locked(&mut inner, collection, id, document);
    }

    /// Takes a ticket to pass to [`CacheManager::put_fresh`] after reading
    /// from disk.
    #[must_use]
    pub fn read_ticket(&self) -> ReadTicket {
        ReadTicket(self.inner.lock().epoch)
    }

    /// Inserts a document read from disk unless an invalidation happened
    /// after `ticket` was taken. Returns whether the entry was stored.
    pub fn put_fresh(&self, ticket: ReadTicket, collection: &str, id: &str, document: Document) -> bool {
        if !self.is_enabled() {
            return false;
        }
        let mut inner = self.inner.lock();
        if inner.epoch != ticket.0 {
            return false;
        }
        self.insert_locked(&mut inner, collection, id, document);
        true
    }

    fn insert_locked(&self, inner: &mut CacheInner, collection: &str, id: &str, document: Document) {
        let key = (collection.to_string(), id.to_string());
        inner.remove(&key);
        let tick = inner.bump();
        inner.lru.insert(tick, key.clone());
        inner.entries.insert(
            key,
            CacheEntry {
                document,
                inserted_at: self.clock.now(),
                tick,
            },
        );

        while inner.entries.len() > self.config.max_size {
            let Some((_, oldest)) = inner.lru.pop_first() else {
                break;
            };
            inner.entries.remove(&oldest);
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Drops one document.
    pub fn invalidate(&self, collection: &str, id: &str) {
        let mut inner = self.inner.lock();
        inner.epoch += 1;
        inner.remove(&(collection.to_string(), id.to_string()));
    }

    /// Drops every document of a collection.
    pub fn invalidate_collection(&self, collection: &str) {
        let mut inner = self.inner.lock();
        inner.epoch += 1;
        let CacheInner { entries, lru, .. } = &mut *inner;
        entries.retain(|(c, _), entry| {
            let keep = c != collection;
            if !keep {
                lru.remove(&entry.tick);
            }
            keep
        });
    }

    /// Drops everything.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.epoch += 1;
        inner.entries.clear();
        inner.lru.clear();
    }

    /// Removes expired entries now and returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        let expired: Vec<CacheKey> = inner
            .entries
            .iter()
            .filter(|(_, entry)| self.is_expired(entry, now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            inner.remove(key);
        }
        expired.len()
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lookups served from the cache.
    #[must_use]
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Lookups that missed.
    #[must_use]
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Zeroes the hit, miss and eviction counters.
    pub fn reset_counters(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
    }

    /// Returns a snapshot of the counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            enabled: self.is_enabled(),
            entries: self.len(),
            max_size: self.config.max_size,
            hits: self.hits(),
            misses: self.misses(),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str) -> Document {
        Document::new(id).with("title", id)
    }

    fn manual_cache(config: CacheConfig) -> (CacheManager, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        (CacheManager::with_clock(config, clock.clone()), clock)
    }

    #[test]
    fn get_counts_hits_and_misses() {
        let cache = CacheManager::new(CacheConfig::default());
        assert!(cache.get("posts", "p1").is_none());
        cache.put("posts", "p1", doc("p1"));
        assert_eq!(cache.get("posts", "p1"), Some(doc("p1")));
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 1);

        cache.reset_counters();
        assert_eq!(cache.hits(), 0);
        assert_eq!(cache.misses(), 0);
    }

    #[test]
    fn entries_expire_after_ttl() {
        let (cache, clock) = manual_cache(CacheConfig::default().ttl(Duration::from_secs(60)));
        cache.put("posts", "p1", doc("p1"));

        clock.advance(Duration::from_secs(59));
        assert!(cache.get("posts", "p1").is_some());

        clock.advance(Duration::from_secs(1));
        assert!(cache.get("posts", "p1").is_none());
        assert_eq!(cache.misses(), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn zero_ttl_never_expires() {
        let (cache, clock) = manual_cache(CacheConfig::default().ttl(Duration::ZERO));
        cache.put("posts", "p1", doc("p1"));
        clock.advance(Duration::from_secs(24 * 3600));
        assert!(cache.get("posts", "p1").is_some());
    }

    #[test]
    fn purge_expired_sweeps() {
        let (cache, clock) = manual_cache(CacheConfig::default().ttl(Duration::from_secs(10)));
        cache.put("posts", "old", doc("old"));
        clock.advance(Duration::from_secs(6));
        cache.put("posts", "new", doc("new"));
        clock.advance(Duration::from_secs(5));

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get("posts", "new").is_some());
    }

    #[test]
    fn lru_eviction_keeps_recently_used() {
        let cache = CacheManager::new(CacheConfig::default().max_size(2));
        cache.put("c", "a", doc("a"));
        cache.put("c", "b", doc("b"));
        // Touch "a" so "b" becomes least recently used.
        assert!(cache.get("c", "a").is_some());
        cache.put("c", "c", doc("c"));

        assert_eq!(cache.len(), 2);
        assert!(cache.get("c", "a").is_some());
        assert!(cache.get("c", "b").is_none());
        assert!(cache.get("c", "c").is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn replacing_does_not_grow() {
        let cache = CacheManager::new(CacheConfig::default().max_size(2));
        cache.put("c", "a", doc("a"));
        cache.put("c", "a", doc("a").with("v", 2));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("c", "a").unwrap().get("v"), Some(&2.into()));
    }

    #[test]
    fn invalidation_scopes() {
        let cache = CacheManager::new(CacheConfig::default());
        cache.put("posts", "p1", doc("p1"));
        cache.put("posts", "p2", doc("p2"));
        cache.put("users", "u1", doc("u1"));

        cache.invalidate("posts", "p1");
        assert!(cache.get("posts", "p1").is_none());
        assert_eq!(cache.len(), 2);

        cache.invalidate_collection("posts");
        assert_eq!(cache.len(), 1);
        assert!(cache.get("users", "u1").is_some());

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn stale_ticket_is_rejected() {
        let cache = CacheManager::new(CacheConfig::default());
        let ticket = cache.read_ticket();
        cache.invalidate("posts", "p1");
        assert!(!cache.put_fresh(ticket, "posts", "p1", doc("p1")));
        assert!(cache.is_empty());

        let ticket = cache.read_ticket();
        assert!(cache.put_fresh(ticket, "posts", "p1", doc("p1")));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn disabled_cache_is_inert() {
        let cache = CacheManager::new(CacheConfig::disabled());
        cache.put("posts", "p1", doc("p1"));
        assert!(cache.get("posts", "p1").is_none());
        assert!(!cache.put_fresh(cache.read_ticket(), "posts", "p1", doc("p1")));
        assert!(cache.is_empty());
        assert!(cache.get("posts", "p1").is_none());
        assert_eq!(cache.misses(), 2);
        assert!(!cache.stats().enabled);
    }

    #[test]
    fn hit_rate() {
        let stats = CacheStats {
            hits: 3,
            misses: 1,
            ..CacheStats::default()
        };
        assert!((stats.hit_rate() - 0.75).abs() < f64::EPSILON);
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
    }
}
