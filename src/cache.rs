//! Time-bounded cache of parsed archives.
//!
//! Long-running sessions (the REPL, the in-memory backend) keep a parsed
//! archive around instead of re-reading it for every search. Entries are
//! keyed by source and version label so switching either one forces a
//! reload, and they expire after a fixed time-to-live.

use crate::error::Result;
use crate::parser::ArchiveParser;
use crate::storage::Storage;
use crate::store::MemoryStore;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Default time-to-live for cached archives.
pub const DEFAULT_TTL: Duration = Duration::from_secs(15 * 60);

/// Source of monotonic time.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock backed by [`Instant::now`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    source: String,
    version: String,
}

struct Entry {
    store: Arc<MemoryStore>,
    loaded_at: Instant,
}

/// Cache of loaded archives keyed by (source, version).
pub struct ArchiveCache<C: Clock = SystemClock> {
    clock: C,
    ttl: Duration,
    entries: Mutex<HashMap<CacheKey, Entry>>,
}

impl ArchiveCache<SystemClock> {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(SystemClock, ttl)
    }
}

impl Default for ArchiveCache<SystemClock> {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl<C: Clock> ArchiveCache<C> {
    pub fn with_clock(clock: C, ttl: Duration) -> Self {
        Self {
            clock,
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached store for (`source`, `version`), calling `load`
    /// when there is no fresh entry.
    ///
    /// The lock is not held while `load` runs; concurrent misses for the
    /// same key may both load, and the last one wins.
    ///
    /// # Errors
    ///
    /// Propagates the error from `load`; nothing is cached in that case.
    pub fn get_or_load<F>(&self, source: &str, version: &str, load: F) -> Result<Arc<MemoryStore>>
    where
        F: FnOnce() -> Result<MemoryStore>,
    {
        let key = CacheKey {
            source: source.to_string(),
            version: version.to_string(),
        };

        if let Some(store) = self.fresh(&key) {
            debug!(source, version, "archive cache hit");
            return Ok(store);
        }

        debug!(source, version, "archive cache miss");
        let store = Arc::new(load()?);
        self.entries.lock().insert(
            key,
            Entry {
                store: Arc::clone(&store),
                loaded_at: self.clock.now(),
            },
        );
        Ok(store)
    }

    fn fresh(&self, key: &CacheKey) -> Option<Arc<MemoryStore>> {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        let expired = entries
            .get(key)
            .is_some_and(|e| now.saturating_duration_since(e.loaded_at) >= self.ttl);
        if expired {
            entries.remove(key);
            return None;
        }
        entries.get(key).map(|e| Arc::clone(&e.store))
    }

    /// Archive file at `path`, parsed into memory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_archive(&self, path: &Path, version: &str) -> Result<Arc<MemoryStore>> {
        self.get_or_load(&path.display().to_string(), version, || {
            ArchiveParser::read_file(path).map(MemoryStore::new)
        })
    }

    /// Every comment of the `SQLite` store at `db_path`, held in memory.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is missing or cannot be read.
    pub fn load_store(&self, db_path: &Path, version: &str) -> Result<Arc<MemoryStore>> {
        self.get_or_load(&db_path.display().to_string(), version, || {
            Storage::open_existing(db_path)?
                .get_all_comments()
                .map(MemoryStore::new)
        })
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Number of entries, fresh or not.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KasoError;
    use crate::model::Comment;
    use std::cell::Cell;

    #[derive(Clone)]
    struct ManualClock {
        start: Instant,
        offset: Arc<Mutex<Duration>>,
    }

    impl ManualClock {
        fn new() -> Self {
            Self {
                start: Instant::now(),
                offset: Arc::new(Mutex::new(Duration::ZERO)),
            }
        }

        fn advance(&self, by: Duration) {
            *self.offset.lock() += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            self.start + *self.offset.lock()
        }
    }

    fn store(n: i64) -> MemoryStore {
        MemoryStore::new(
            (0..n)
                .map(|i| Comment::original(i, "u", "2024-01-01T00:00:00Z", "c"))
                .collect(),
        )
    }

    #[test]
    fn hit_within_ttl() {
        let clock = ManualClock::new();
        let cache = ArchiveCache::with_clock(clock.clone(), Duration::from_secs(60));
        let loads = Cell::new(0);

        for _ in 0..3 {
            let s = cache
                .get_or_load("src", "v1", || {
                    loads.set(loads.get() + 1);
                    Ok(store(2))
                })
                .unwrap();
            assert_eq!(s.comments().len(), 2);
            clock.advance(Duration::from_secs(10));
        }
        assert_eq!(loads.get(), 1);
    }

    #[test]
    fn reload_after_ttl() {
        let clock = ManualClock::new();
        let cache = ArchiveCache::with_clock(clock.clone(), Duration::from_secs(60));
        cache.get_or_load("src", "v1", || Ok(store(1))).unwrap();
        clock.advance(Duration::from_secs(60));
        let s = cache.get_or_load("src", "v1", || Ok(store(5))).unwrap();
        assert_eq!(s.comments().len(), 5);
    }

    #[test]
    fn version_is_part_of_key() {
        let cache = ArchiveCache::with_clock(ManualClock::new(), Duration::from_secs(60));
        cache.get_or_load("src", "v1", || Ok(store(1))).unwrap();
        let s = cache.get_or_load("src", "v2", || Ok(store(3))).unwrap();
        assert_eq!(s.comments().len(), 3);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn failed_load_is_not_cached() {
        let cache = ArchiveCache::with_clock(ManualClock::new(), Duration::from_secs(60));
        let err = cache
            .get_or_load("src", "v1", || Err(KasoError::invalid_argument("boom")))
            .unwrap_err();
        assert!(matches!(err, KasoError::InvalidArgument { .. }));
        assert!(cache.is_empty());
        cache.get_or_load("src", "v1", || Ok(store(1))).unwrap();
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn archive_file_is_parsed_once() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("archive.json");
        std::fs::write(
            &path,
            r#"{"comments":[{"id":1,"user":"a","datetime":"2024-01-01 00:00:00","content":"猫"}]}"#,
        )
        .unwrap();
        let cache = ArchiveCache::with_clock(ManualClock::new(), Duration::from_secs(60));

        let first = cache.load_archive(&path, "latest").unwrap();
        std::fs::remove_file(&path).unwrap();
        let second = cache.load_archive(&path, "latest").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(cache.load_archive(&path, "next").is_err());
    }

    #[test]
    fn missing_store_is_not_cached() {
        let dir = tempfile::TempDir::new().unwrap();
        let cache = ArchiveCache::with_clock(ManualClock::new(), Duration::from_secs(60));
        let err = cache
            .load_store(&dir.path().join("kaso.db"), "latest")
            .unwrap_err();
        assert!(matches!(err, KasoError::StoreNotFound { .. }));
        assert!(cache.is_empty());
    }
}
