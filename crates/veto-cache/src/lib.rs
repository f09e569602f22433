//! Policy cache: LRU with per-entry TTL, plus a last-known-good namespace
//! immune to both eviction and expiry (specification §4.8).
#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lru::LruCache;

use veto_bytecode::CompiledPolicy;
use veto_core::ids::now_ms;

/// Default LRU capacity (`maxEntries`).
pub const DEFAULT_MAX_ENTRIES: usize = 100;
/// Default freshness TTL (`ttlMs`).
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
struct CacheEntry {
    policy: Arc<CompiledPolicy>,
    cached_at_ms: u64,
    last_used_ms: u64,
    hit_count: u64,
}

/// Outcome of a staleness-aware lookup (the cloud-policy variant's
/// stale-while-revalidate cutoffs).
#[derive(Debug, Clone)]
pub enum Lookup {
    /// Younger than `staleAt`; safe to serve as-is.
    Fresh(Arc<CompiledPolicy>),
    /// Between `staleAt` and `expiredAt`: served, but the caller should
    /// trigger a background refresh (see [`PolicyCache::try_begin_refresh`]).
    Stale(Arc<CompiledPolicy>),
    /// Absent, or past `expiredAt`.
    Miss,
}

/// Hot LRU+TTL cache plus a last-known-good namespace, for compiled
/// policies keyed by tool name (or any caller-chosen key).
pub struct PolicyCache {
    hot: Mutex<LruCache<String, CacheEntry>>,
    lkg: Mutex<HashMap<String, CacheEntry>>,
    in_flight: Mutex<HashSet<String>>,
    fresh_ttl: Duration,
    max_ttl: Duration,
}

impl PolicyCache {
    /// A plain LRU+TTL cache: entries older than `ttl` are treated as a
    /// miss and purged on access.
    #[must_use]
    pub fn new(max_entries: NonZeroUsize, ttl: Duration) -> Self {
        Self::with_stale_window(max_entries, ttl, ttl)
    }

    /// A cache with a stale-while-revalidate grace window: entries stay
    /// servable (as [`Lookup::Stale`]) between `fresh_ttl` and `max_ttl`.
    #[must_use]
    pub fn with_stale_window(max_entries: NonZeroUsize, fresh_ttl: Duration, max_ttl: Duration) -> Self {
        Self {
            hot: Mutex::new(LruCache::new(max_entries)),
            lkg: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashSet::new()),
            fresh_ttl,
            max_ttl: max_ttl.max(fresh_ttl),
        }
    }

    /// Default-configured cache: 100 entries, 60s TTL.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(
            NonZeroUsize::new(DEFAULT_MAX_ENTRIES).expect("DEFAULT_MAX_ENTRIES is nonzero"),
            DEFAULT_TTL,
        )
    }

    /// Looks up `key`, removing and returning `None` if it has exceeded
    /// the freshness TTL.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Arc<CompiledPolicy>> {
        let now = now_ms();
        let mut hot = self.hot.lock().expect("policy cache mutex poisoned");
        let stale = match hot.peek(key) {
            Some(entry) => now.saturating_sub(entry.cached_at_ms) > self.fresh_ttl.as_millis() as u64,
            None => return None,
        };
        if stale {
            hot.pop(key);
            return None;
        }
        let entry = hot.get_mut(key)?;
        entry.last_used_ms = now;
        entry.hit_count += 1;
        Some(Arc::clone(&entry.policy))
    }

    /// Writes both the hot entry and its last-known-good copy.
    pub fn set(&self, key: impl Into<String>, policy: Arc<CompiledPolicy>) {
        let key = key.into();
        let now = now_ms();
        let entry = CacheEntry { policy, cached_at_ms: now, last_used_ms: now, hit_count: 0 };
        self.hot.lock().expect("policy cache mutex poisoned").put(key.clone(), entry.clone());
        self.lkg.lock().expect("policy cache mutex poisoned").insert(key, entry);
    }

    /// Whether `key` currently has a hot entry, regardless of freshness.
    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.hot.lock().expect("policy cache mutex poisoned").peek(key).is_some()
    }

    /// Removes the hot entry for `key`. Does not touch the LKG copy.
    pub fn delete(&self, key: &str) {
        self.hot.lock().expect("policy cache mutex poisoned").pop(key);
    }

    /// Clears every hot entry. Does not touch the LKG namespace.
    pub fn clear(&self) {
        self.hot.lock().expect("policy cache mutex poisoned").clear();
    }

    /// Returns the last-known-good policy for `key`, if one was ever
    /// successfully compiled. Never evicted by LRU, never expires.
    #[must_use]
    pub fn last_known_good(&self, key: &str) -> Option<Arc<CompiledPolicy>> {
        self.lkg.lock().expect("policy cache mutex poisoned").get(key).map(|e| Arc::clone(&e.policy))
    }

    /// Staleness-aware lookup against the `[staleAt, expiredAt)` window.
    #[must_use]
    pub fn lookup(&self, key: &str) -> Lookup {
        let now = now_ms();
        let hot = self.hot.lock().expect("policy cache mutex poisoned");
        match hot.peek(key) {
            None => Lookup::Miss,
            Some(entry) => {
                let age_ms = now.saturating_sub(entry.cached_at_ms);
                if age_ms <= self.fresh_ttl.as_millis() as u64 {
                    Lookup::Fresh(Arc::clone(&entry.policy))
                } else if age_ms <= self.max_ttl.as_millis() as u64 {
                    Lookup::Stale(Arc::clone(&entry.policy))
                } else {
                    Lookup::Miss
                }
            }
        }
    }

    /// Attempts to claim the single in-flight refresh slot for `key`.
    /// Returns `true` if the caller won the race and should perform the
    /// refresh (releasing the slot with [`Self::end_refresh`] when done),
    /// `false` if a refresh for this key is already underway.
    #[must_use]
    pub fn try_begin_refresh(&self, key: &str) -> bool {
        self.in_flight.lock().expect("policy cache mutex poisoned").insert(key.to_string())
    }

    /// Releases the in-flight refresh slot for `key`.
    pub fn end_refresh(&self, key: &str) {
        self.in_flight.lock().expect("policy cache mutex poisoned").remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veto_bytecode::CompiledPolicy;

    fn empty_policy() -> Arc<CompiledPolicy> {
        Arc::new(CompiledPolicy {
            version: CompiledPolicy::FORMAT_VERSION,
            instructions: vec![],
            constant_pool: vec![],
            arg_keys: vec![],
            rule_ids: vec![],
            compiled_at: 0,
        })
    }

    #[test]
    fn set_then_get_round_trips() {
        let cache = PolicyCache::with_defaults();
        cache.set("read_file", empty_policy());
        assert!(cache.has("read_file"));
        assert!(cache.get("read_file").is_some());
    }

    #[test]
    fn expired_entry_is_purged_on_access() {
        let cache = PolicyCache::new(NonZeroUsize::new(10).unwrap(), Duration::from_millis(0));
        cache.set("read_file", empty_policy());
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("read_file").is_none());
        assert!(!cache.has("read_file"));
    }

    #[test]
    fn lkg_survives_hot_delete() {
        let cache = PolicyCache::with_defaults();
        cache.set("read_file", empty_policy());
        cache.delete("read_file");
        assert!(!cache.has("read_file"));
        assert!(cache.last_known_good("read_file").is_some());
    }

    #[test]
    fn lkg_survives_clear() {
        let cache = PolicyCache::with_defaults();
        cache.set("read_file", empty_policy());
        cache.clear();
        assert!(cache.last_known_good("read_file").is_some());
    }

    #[test]
    fn lru_evicts_oldest_beyond_capacity() {
        let cache = PolicyCache::new(NonZeroUsize::new(1).unwrap(), Duration::from_secs(60));
        cache.set("a", empty_policy());
        cache.set("b", empty_policy());
        assert!(!cache.has("a"));
        assert!(cache.has("b"));
    }

    #[test]
    fn stale_window_serves_stale_then_misses_past_expiry() {
        let cache = PolicyCache::with_stale_window(
            NonZeroUsize::new(10).unwrap(),
            Duration::from_millis(0),
            Duration::from_millis(50),
        );
        cache.set("read_file", empty_policy());
        std::thread::sleep(Duration::from_millis(5));
        assert!(matches!(cache.lookup("read_file"), Lookup::Stale(_)));
        std::thread::sleep(Duration::from_millis(60));
        assert!(matches!(cache.lookup("read_file"), Lookup::Miss));
    }

    #[test]
    fn at_most_one_in_flight_refresh_per_key() {
        let cache = PolicyCache::with_defaults();
        assert!(cache.try_begin_refresh("read_file"));
        assert!(!cache.try_begin_refresh("read_file"));
        cache.end_refresh("read_file");
        assert!(cache.try_begin_refresh("read_file"));
    }
}
