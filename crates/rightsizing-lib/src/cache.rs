//! Concurrent TTL cache
//!
//! One [`SharedCache`] is built at startup and handed to the job
//! deduplicator (logical key -> job handle) and the cluster summary. The
//! task queue keeps its own `TtlCache` of job records. Entries expire a
//! fixed time after they were written; expired entries are invisible to
//! readers and are dropped on the next read or by `purge_expired`.

use crate::jobs::JobHandle;
use crate::summary::CachedSummary;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    /// `None` for pinned entries
    expires_at: Option<Instant>,
}

impl<V> CacheEntry<V> {
    fn new(value: V, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Some(Instant::now() + ttl),
        }
    }

    fn pinned(value: V) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Thread-safe key/value cache with per-entry expiry.
///
/// Clones share the same underlying map.
#[derive(Debug, Clone)]
pub struct TtlCache<V> {
    entries: Arc<DashMap<String, CacheEntry<V>>>,
    default_ttl: Duration,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            default_ttl,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Live value for `key`, if any
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let expired = match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        }
        None
    }

    /// Store with the default TTL, replacing any previous value
    pub fn set(&self, key: impl Into<String>, value: V) {
        self.set_with_ttl(key, value, self.default_ttl);
    }

    pub fn set_with_ttl(&self, key: impl Into<String>, value: V, ttl: Duration) {
        self.entries.insert(key.into(), CacheEntry::new(value, ttl));
    }

    /// Store without expiry; the entry lives until replaced or removed
    pub fn pin(&self, key: impl Into<String>, value: V) {
        self.entries.insert(key.into(), CacheEntry::pinned(value));
    }

    /// Atomically store `value` for `ttl` unless a live entry exists.
    ///
    /// Returns the live value after the call and whether it was inserted
    /// by this call.
    pub fn insert_if_absent(&self, key: impl Into<String>, value: V, ttl: Duration) -> (V, bool) {
        let now = Instant::now();
        match self.entries.entry(key.into()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired(now) {
                    occupied.insert(CacheEntry::new(value.clone(), ttl));
                    (value, true)
                } else {
                    (occupied.get().value.clone(), false)
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(CacheEntry::new(value.clone(), ttl));
                (value, true)
            }
        }
    }

    /// Restart the expiry of a live entry at `ttl` from now; returns false
    /// if there is none. Pinned entries stay pinned.
    pub fn touch(&self, key: &str, ttl: Duration) -> bool {
        let now = Instant::now();
        match self.entries.get_mut(key) {
            Some(mut entry) if !entry.is_expired(now) => {
                if entry.expires_at.is_some() {
                    entry.expires_at = Some(now + ttl);
                }
                true
            }
            _ => false,
        }
    }

    pub fn remove(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        self.entries
            .remove(key)
            .filter(|(_, entry)| !entry.is_expired(now))
            .map(|(_, entry)| entry.value)
    }

    /// Drop every expired entry and return how many were dropped
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    /// Number of stored entries, expired ones included until purged
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Values held in the server-wide cache
#[derive(Debug, Clone)]
pub enum CacheValue {
    /// Job id cell of a logical forecast key
    Job(JobHandle),
    Summary(Arc<CachedSummary>),
}

/// The cache shared by every component that caches across requests
pub type SharedCache = TtlCache<CacheValue>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn test_set_and_get() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.set("pod:ns-a", "job-1".to_string());

        assert_eq!(cache.get("pod:ns-a").as_deref(), Some("job-1"));
        assert!(cache.get("pod:ns-b").is_none());
    }

    #[test]
    fn test_entries_expire() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.set_with_ttl("summary", 1u32, Duration::from_millis(20));
        sleep(Duration::from_millis(40));

        assert!(cache.get("summary").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_insert_if_absent_keeps_live_value() {
        let cache = TtlCache::new(Duration::from_secs(60));
        let ttl = Duration::from_secs(60);
        assert_eq!(cache.insert_if_absent("k", 1, ttl), (1, true));
        assert_eq!(cache.insert_if_absent("k", 2, ttl), (1, false));
        assert_eq!(cache.get("k"), Some(1));
    }

    #[test]
    fn test_insert_if_absent_replaces_expired() {
        let cache = TtlCache::new(Duration::from_secs(60));
        let ttl = Duration::from_millis(20);
        cache.insert_if_absent("k", 1, ttl);
        sleep(Duration::from_millis(40));

        assert_eq!(cache.insert_if_absent("k", 2, ttl), (2, true));
    }

    #[test]
    fn test_touch_extends_live_entries_only() {
        let ttl = Duration::from_millis(100);
        let cache = TtlCache::new(ttl);
        cache.set("k", 1);
        sleep(Duration::from_millis(60));
        assert!(cache.touch("k", ttl));
        sleep(Duration::from_millis(60));
        assert_eq!(cache.get("k"), Some(1));

        assert!(!cache.touch("missing", ttl));
    }

    #[test]
    fn test_remove_and_purge() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.set("a", 1);
        cache.set_with_ttl("b", 2, Duration::ZERO);

        assert_eq!(cache.remove("a"), Some(1));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.purge_expired(), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_pinned_entries_never_expire() {
        let cache = TtlCache::new(Duration::from_millis(10));
        cache.pin("running", 1);
        cache.set("done", 2);
        sleep(Duration::from_millis(30));

        assert!(cache.touch("running", Duration::ZERO));
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.get("running"), Some(1));

        cache.set("running", 3);
        sleep(Duration::from_millis(30));
        assert!(cache.get("running").is_none());
    }

    #[test]
    fn test_clones_share_entries() {
        let cache = TtlCache::new(Duration::from_secs(60));
        let other = cache.clone();
        other.set("k", 7);
        assert_eq!(cache.get("k"), Some(7));
    }
}
