//! Bounded, time-aware store of last-known sync state per path.
//!
//! This is the only thing shell callback threads ever read. Every operation
//! is a single bounded critical section over an LRU map: no I/O, no waiting
//! on the query worker. Capacity is enforced by LRU eviction so large
//! directory trees cannot grow memory without bound.

use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use lru::LruCache;
use parking_lot::Mutex;

use crate::status::{normalize_path, PathStatus, SyncState};

/// Counters for diagnostics; surfaced through `emblemctl` and logs.
#[derive(Debug, Default)]
pub struct CacheStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub evictions: AtomicU64,
}

pub struct StatusCache {
    entries: Mutex<LruCache<std::path::PathBuf, PathStatus>>,
    default_ttl: Duration,
    stats: CacheStats,
}

impl StatusCache {
    pub fn new(max_entries: usize, default_ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(
                NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN),
            )),
            default_ttl,
            stats: CacheStats::default(),
        }
    }

    /// Last-known status for `path`, stale or not. Never blocks beyond the
    /// map lock and never performs I/O. Callers decide what staleness means.
    pub fn get(&self, path: &Path) -> Option<PathStatus> {
        let key = normalize_path(path);
        let found = self.entries.lock().get(&key).cloned();
        match &found {
            Some(_) => self.stats.hits.fetch_add(1, Ordering::Relaxed),
            None => self.stats.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    /// Overwrites the entry for `status.path`, evicting the least recently
    /// used entry if the cache is at capacity.
    pub fn put(&self, status: PathStatus) {
        let key = normalize_path(&status.path);
        let mut entries = self.entries.lock();
        if let Some((evicted, _)) = entries.push(key.clone(), status) {
            if evicted != key {
                self.stats.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Records "refresh outstanding" for a path we know nothing about yet.
    /// A path with an existing entry keeps its best-effort value instead.
    pub fn note_pending(&self, path: &Path) {
        let key = normalize_path(path);
        let mut entries = self.entries.lock();
        if entries.contains(&key) {
            return;
        }
        let placeholder = PathStatus::new(key.clone(), SyncState::Queued, 0, self.default_ttl);
        if let Some((evicted, _)) = entries.push(key.clone(), placeholder) {
            if evicted != key {
                self.stats.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn invalidate(&self, path: &Path) {
        let key = normalize_path(path);
        self.entries.lock().pop(&key);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Arc;

    fn status(path: &str, state: SyncState, ttl_ms: u64) -> PathStatus {
        PathStatus::new(
            PathBuf::from(path),
            state,
            0,
            Duration::from_millis(ttl_ms),
        )
    }

    #[test]
    fn put_then_get_roundtrips() {
        let cache = StatusCache::new(16, Duration::from_secs(10));
        cache.put(status("/repo/a.txt", SyncState::Synced, 10_000));

        let entry = cache.get(Path::new("/repo/a.txt")).expect("entry");
        assert_eq!(entry.state, SyncState::Synced);
        assert!(entry.is_fresh());
    }

    #[test]
    fn trailing_slash_hits_same_entry() {
        let cache = StatusCache::new(16, Duration::from_secs(10));
        cache.put(status("/repo/dir", SyncState::Syncing, 10_000));

        assert!(cache.get(Path::new("/repo/dir/")).is_some());
    }

    #[test]
    fn entries_become_stale_after_ttl() {
        let cache = StatusCache::new(16, Duration::from_secs(10));
        cache.put(status("/repo/a.txt", SyncState::Synced, 20));

        std::thread::sleep(Duration::from_millis(40));
        let entry = cache.get(Path::new("/repo/a.txt")).expect("entry");
        assert!(entry.is_stale(), "stale entries stay servable, not fresh");
    }

    #[test]
    fn lru_eviction_bounds_entry_count() {
        let cache = StatusCache::new(3, Duration::from_secs(10));
        for i in 0..5 {
            cache.put(status(&format!("/repo/f{}.txt", i), SyncState::Synced, 10_000));
        }

        assert_eq!(cache.len(), 3);
        assert_eq!(cache.stats().evictions.load(Ordering::Relaxed), 2);
        assert!(cache.get(Path::new("/repo/f0.txt")).is_none());
        assert!(cache.get(Path::new("/repo/f4.txt")).is_some());
    }

    #[test]
    fn note_pending_never_clobbers_known_state() {
        let cache = StatusCache::new(16, Duration::from_secs(10));
        cache.put(status("/repo/a.txt", SyncState::Synced, 10_000));
        cache.note_pending(Path::new("/repo/a.txt"));

        let entry = cache.get(Path::new("/repo/a.txt")).expect("entry");
        assert_eq!(entry.state, SyncState::Synced);

        cache.note_pending(Path::new("/repo/new.txt"));
        let entry = cache.get(Path::new("/repo/new.txt")).expect("placeholder");
        assert_eq!(entry.state, SyncState::Queued);
    }

    #[test]
    fn invalidate_removes_entry() {
        let cache = StatusCache::new(16, Duration::from_secs(10));
        cache.put(status("/repo/a.txt", SyncState::Ignored, 10_000));
        cache.invalidate(Path::new("/repo/a.txt"));
        assert!(cache.get(Path::new("/repo/a.txt")).is_none());
    }

    #[test]
    fn concurrent_readers_and_writer_do_not_lose_updates() {
        let cache = Arc::new(StatusCache::new(1024, Duration::from_secs(10)));
        let writer = {
            let cache = Arc::clone(&cache);
            std::thread::spawn(move || {
                for i in 0..500 {
                    cache.put(status(
                        &format!("/repo/f{}.txt", i % 32),
                        SyncState::Syncing,
                        10_000,
                    ));
                }
            })
        };
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for i in 0..500 {
                        let _ = cache.get(Path::new(&format!("/repo/f{}.txt", i % 32)));
                    }
                })
            })
            .collect();

        writer.join().expect("writer");
        for reader in readers {
            reader.join().expect("reader");
        }
        assert!(cache.get(Path::new("/repo/f0.txt")).is_some());
    }
}
