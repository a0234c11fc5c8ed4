//! C11 — Three-tier query-result cache: an in-process LRU (T1, via the `lru`
//! crate), an optional shared tier (T2, a trait so a real deployment can plug in
//! a network KV store), and an on-disk persistent tier (T3, atomic-write JSON
//! files the same way `merkle::persist_atomic` does). A cache entry records the
//! chunk ids it depends on; the Indexer (C5) calls `invalidate` through the
//! `Invalidator` port whenever those ids change, so a cache hit never serves
//! stale content.

use crate::merkle::persist_atomic;
use crate::sha256_hex;
use crate::types::{AssembledContext, CacheEntry};
use dashmap::DashMap;
use lru::LruCache;
use std::collections::BTreeSet;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Mutex;

/// T2 port: a shared cache tier external to this process (e.g. Redis). The
/// in-process baseline is a no-op — every lookup misses, every write is
/// dropped — matching the "thin in-process baseline" posture of the other
/// external interfaces.
pub trait SharedCache: Send + Sync {
    fn get(&self, key: &str) -> Option<CacheEntry>;
    fn put(&self, key: &str, entry: &CacheEntry);
    fn remove(&self, key: &str);
}

pub struct NullSharedCache;
impl SharedCache for NullSharedCache {
    fn get(&self, _key: &str) -> Option<CacheEntry> {
        None
    }
    fn put(&self, _key: &str, _entry: &CacheEntry) {}
    fn remove(&self, _key: &str) {}
}

/// Fingerprint a query for cache-key purposes: a pure function of the inputs
/// that affect the result, so identical requests always hit.
pub fn fingerprint(query_text: &str, k: usize, token_budget: usize) -> String {
    let input = format!("{}|{k}|{token_budget}", query_text.trim().to_lowercase());
    sha256_hex(input.as_bytes())
}

pub struct Cache {
    t1: Mutex<LruCache<String, CacheEntry>>,
    t1_ttl_secs: u64,
    t2: Box<dyn SharedCache>,
    t2_ttl_secs: u64,
    t3_dir: Option<PathBuf>,
    t3_ttl_secs: u64,
    /// chunk_id -> set of cache keys whose dependency_set includes it.
    dependency_index: DashMap<String, BTreeSet<String>>,
}

impl Cache {
    /// Each tier gets its own TTL (spec §4.11: T1 short/~1h, T2 medium/~24h, T3
    /// long/~7d) — `put` writes a separately-TTL'd `CacheEntry` copy into each
    /// tier, so expiry is always judged against the TTL of the tier that's
    /// actually serving the read, not one TTL shared across all three.
    pub fn new(
        t1_capacity: usize,
        t1_ttl_secs: u64,
        t2: Box<dyn SharedCache>,
        t2_ttl_secs: u64,
        t3_dir: Option<PathBuf>,
        t3_ttl_secs: u64,
    ) -> Self {
        let capacity = NonZeroUsize::new(t1_capacity.max(1)).unwrap();
        Self {
            t1: Mutex::new(LruCache::new(capacity)),
            t1_ttl_secs,
            t2,
            t2_ttl_secs,
            t3_dir,
            t3_ttl_secs,
            dependency_index: DashMap::new(),
        }
    }

    fn t3_path(&self, key: &str) -> Option<PathBuf> {
        self.t3_dir.as_ref().map(|dir| dir.join(format!("{key}.json")))
    }

    /// Look up `key`, trying T1 then T2 then T3 in order, promoting a lower-tier
    /// hit back up to T1. Expired entries are treated as misses and purged.
    pub fn get(&self, key: &str, now: u64) -> Option<AssembledContext> {
        {
            let mut t1 = self.t1.lock().expect("t1 cache lock poisoned");
            if let Some(entry) = t1.get(key) {
                if !entry.is_expired(now) {
                    return Some(entry.result.clone());
                }
                t1.pop(key);
            }
        }

        if let Some(entry) = self.t2.get(key) {
            if !entry.is_expired(now) {
                self.promote_to_t1(key, entry.clone(), now);
                return Some(entry.result.clone());
            }
            self.t2.remove(key);
        }

        if let Some(path) = self.t3_path(key) {
            if let Ok(raw) = std::fs::read(&path) {
                if let Ok(entry) = serde_json::from_slice::<CacheEntry>(&raw) {
                    if !entry.is_expired(now) {
                        self.promote_to_t1(key, entry.clone(), now);
                        return Some(entry.result);
                    }
                    let _ = std::fs::remove_file(&path);
                }
            }
        }

        None
    }

    /// A lower-tier hit gets re-stamped with T1's own TTL and insertion time,
    /// so promotion doesn't hand back an entry that's already stale by T1's
    /// shorter clock.
    fn promote_to_t1(&self, key: &str, mut entry: CacheEntry, now: u64) {
        self.register_dependencies(key, &entry.dependency_set);
        entry.ttl_secs = self.t1_ttl_secs;
        entry.inserted_at = now;
        self.t1.lock().expect("t1 cache lock poisoned").put(key.to_string(), entry);
    }

    fn register_dependencies(&self, key: &str, dependency_set: &[String]) {
        for chunk_id in dependency_set {
            self.dependency_index.entry(chunk_id.clone()).or_default().insert(key.to_string());
        }
    }

    /// Insert into every tier: T1 always, T2 via the port (a no-op baseline
    /// simply drops it), T3 if a persistence directory is configured. Each
    /// tier's entry carries that tier's own TTL, so a T1 hit always expires on
    /// the short TTL even though the same query result also lives in T3 under
    /// the long one.
    pub fn put(&self, key: &str, result: AssembledContext, dependency_set: Vec<String>, now: u64) {
        self.register_dependencies(key, &dependency_set);

        let make_entry = |ttl_secs: u64| CacheEntry {
            query_fingerprint: key.to_string(),
            result: result.clone(),
            dependency_set: dependency_set.clone(),
            inserted_at: now,
            ttl_secs,
        };

        self.t1.lock().expect("t1 cache lock poisoned").put(key.to_string(), make_entry(self.t1_ttl_secs));
        self.t2.put(key, &make_entry(self.t2_ttl_secs));
        if let Some(path) = self.t3_path(key) {
            let _ = persist_atomic(&path, &make_entry(self.t3_ttl_secs));
        }
    }

    /// Drop every cache entry whose dependency set includes any of `chunk_ids`,
    /// across all three tiers.
    pub fn invalidate(&self, chunk_ids: &[String]) {
        let mut keys_to_drop: BTreeSet<String> = BTreeSet::new();
        for chunk_id in chunk_ids {
            if let Some((_, keys)) = self.dependency_index.remove(chunk_id) {
                keys_to_drop.extend(keys);
            }
        }
        let mut t1 = self.t1.lock().expect("t1 cache lock poisoned");
        for key in &keys_to_drop {
            t1.pop(key);
            self.t2.remove(key);
            if let Some(path) = self.t3_path(key) {
                let _ = std::fs::remove_file(path);
            }
        }
    }
}

impl crate::indexer::Invalidator for Cache {
    fn invalidate(&self, changed_chunk_ids: &[String]) {
        Cache::invalidate(self, changed_chunk_ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::now_unix;

    fn result(tokens: usize) -> AssembledContext {
        AssembledContext { chunks: vec![], total_tokens: tokens, coherence_score: 1.0, degraded: None }
    }

    #[test]
    fn put_then_get_round_trips_through_t1() {
        let cache = Cache::new(8, 3600, Box::new(NullSharedCache), 24 * 3600, None, 7 * 24 * 3600);
        cache.put("k1", result(100), vec!["chunk1".to_string()], now_unix());
        let hit = cache.get("k1", now_unix());
        assert_eq!(hit.unwrap().total_tokens, 100);
    }

    #[test]
    fn invalidate_drops_entries_depending_on_changed_chunk() {
        let cache = Cache::new(8, 3600, Box::new(NullSharedCache), 24 * 3600, None, 7 * 24 * 3600);
        cache.put("k1", result(100), vec!["chunk1".to_string()], now_unix());
        cache.invalidate(&["chunk1".to_string()]);
        assert!(cache.get("k1", now_unix()).is_none());
    }

    #[test]
    fn expired_entry_is_treated_as_a_miss() {
        let cache = Cache::new(8, 1, Box::new(NullSharedCache), 1, None, 1);
        cache.put("k1", result(50), vec![], 1000);
        assert!(cache.get("k1", 1000 + 100).is_none());
    }

    #[test]
    fn unrelated_invalidation_leaves_entry_intact() {
        let cache = Cache::new(8, 3600, Box::new(NullSharedCache), 24 * 3600, None, 7 * 24 * 3600);
        cache.put("k1", result(50), vec!["chunk1".to_string()], now_unix());
        cache.invalidate(&["chunk2".to_string()]);
        assert!(cache.get("k1", now_unix()).is_some());
    }

    #[test]
    fn t3_persists_across_a_fresh_cache_instance() {
        let dir = tempfile::tempdir().unwrap();
        let cache =
            Cache::new(8, 3600, Box::new(NullSharedCache), 24 * 3600, Some(dir.path().to_path_buf()), 7 * 24 * 3600);
        cache.put("k1", result(77), vec!["chunk1".to_string()], now_unix());

        let fresh =
            Cache::new(8, 3600, Box::new(NullSharedCache), 24 * 3600, Some(dir.path().to_path_buf()), 7 * 24 * 3600);
        let hit = fresh.get("k1", now_unix());
        assert_eq!(hit.unwrap().total_tokens, 77);
    }

    #[test]
    fn fingerprint_is_stable_and_case_insensitive() {
        assert_eq!(fingerprint("Hello World", 10, 1000), fingerprint("hello world", 10, 1000));
        assert_ne!(fingerprint("hello", 10, 1000), fingerprint("hello", 20, 1000));
    }

    #[test]
    fn t1_entry_expires_on_its_own_short_ttl_even_though_t3_ttl_is_long() {
        // T1 TTL of 1s, T3 TTL of a week: a value served from the hot tier
        // must expire on T1's own clock, not silently inherit the long T3 TTL.
        let cache = Cache::new(8, 1, Box::new(NullSharedCache), 24 * 3600, None, 7 * 24 * 3600);
        cache.put("k1", result(10), vec![], 1000);
        assert!(cache.get("k1", 1000 + 50).is_none(), "T1 entry should have expired after its 1s TTL");
    }
}
