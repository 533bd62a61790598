use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;

struct Entry {
    path: PathBuf,
    size_bytes: u64,
    last_used: Instant,
    refcount: u32,
}

/// Content-addressed store for fetched JARs under `root/<hash>.jar`.
/// Entries in use by a live topology are pinned (`refcount > 0`) and never
/// evicted; eviction only considers unpinned entries, oldest-`last_used`
/// first, once `capacity_bytes` is exceeded.
pub struct JarCache {
    root: PathBuf,
    capacity_bytes: u64,
    entries: Mutex<HashMap<String, Entry>>,
    /// Source fingerprint -> content hash, so a repeat fetch of the same
    /// `JarSource` can be answered from cache without re-downloading even
    /// though the content hash is only known after the bytes are in hand.
    fingerprints: Mutex<HashMap<String, String>>,
}

impl JarCache {
    pub fn new(root: impl Into<PathBuf>, capacity_bytes: u64) -> Self {
        Self {
            root: root.into(),
            capacity_bytes,
            entries: Mutex::new(HashMap::new()),
            fingerprints: Mutex::new(HashMap::new()),
        }
    }

    pub fn path_for(&self, hash: &str) -> PathBuf {
        self.root.join(format!("{hash}.jar"))
    }

    /// Registers a fetched artifact already written to disk at `path`,
    /// pinning it immediately (the caller is about to use it).
    pub fn insert(&self, hash: &str, path: PathBuf, size_bytes: u64) {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(
            hash.to_string(),
            Entry {
                path,
                size_bytes,
                last_used: Instant::now(),
                refcount: 1,
            },
        );
    }

    /// Looks up a cache hit, bumping `last_used` and pinning it for the
    /// caller. Returns `None` on a miss so the caller knows to fetch.
    pub fn get(&self, hash: &str) -> Option<PathBuf> {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries.get_mut(hash)?;
        entry.last_used = Instant::now();
        entry.refcount += 1;
        Some(entry.path.clone())
    }

    /// Looks up a source by its fingerprint rather than its content hash —
    /// a hit means this exact `JarSource` was already fetched, so the
    /// caller can reuse it without a new download. Pins the entry like
    /// [`JarCache::get`]. A stale mapping whose entry has since been
    /// evicted reports a miss.
    pub fn get_by_fingerprint(&self, fingerprint: &str) -> Option<(String, PathBuf)> {
        let hash = {
            let fingerprints = self.fingerprints.lock().unwrap();
            fingerprints.get(fingerprint)?.clone()
        };
        let path = self.get(&hash)?;
        Some((hash, path))
    }

    /// Records that `fingerprint` resolved to content hash `hash`, so a
    /// later fetch of the same source can short-circuit via
    /// [`JarCache::get_by_fingerprint`].
    pub fn record_fingerprint(&self, fingerprint: &str, hash: &str) {
        let mut fingerprints = self.fingerprints.lock().unwrap();
        fingerprints.insert(fingerprint.to_string(), hash.to_string());
    }

    /// Releases the pin a prior `get`/`insert` took. Once unpinned, the
    /// entry becomes eligible for eviction under capacity pressure.
    pub fn release(&self, hash: &str) {
        let mut entries = self.entries.lock().unwrap();
        if let Some(entry) = entries.get_mut(hash) {
            entry.refcount = entry.refcount.saturating_sub(1);
        }
    }

    fn total_bytes(entries: &HashMap<String, Entry>) -> u64 {
        entries.values().map(|e| e.size_bytes).sum()
    }

    /// Evicts unpinned entries oldest-first until total size is back under
    /// capacity. Returns the hashes evicted so the caller can `remove_file`
    /// them; this type does no filesystem I/O itself.
    pub fn evict_to_capacity(&self) -> Vec<PathBuf> {
        let mut entries = self.entries.lock().unwrap();
        let mut evicted = Vec::new();
        if Self::total_bytes(&entries) <= self.capacity_bytes {
            return evicted;
        }
        let mut candidates: Vec<(String, Instant)> = entries
            .iter()
            .filter(|(_, e)| e.refcount == 0)
            .map(|(h, e)| (h.clone(), e.last_used))
            .collect();
        candidates.sort_by_key(|(_, last_used)| *last_used);

        for (hash, _) in candidates {
            if Self::total_bytes(&entries) <= self.capacity_bytes {
                break;
            }
            if let Some(entry) = entries.remove(&hash) {
                evicted.push(entry.path);
            }
        }
        evicted
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pinned_entries_survive_eviction() {
        let cache = JarCache::new("/tmp/does-not-matter", 100);
        cache.insert("a", PathBuf::from("a.jar"), 60);
        cache.insert("b", PathBuf::from("b.jar"), 60);
        // both pinned (refcount 1 from insert); over capacity but nothing evictable
        let evicted = cache.evict_to_capacity();
        assert!(evicted.is_empty());
    }

    #[test]
    fn unpinned_oldest_evicted_first() {
        let cache = JarCache::new("/tmp/does-not-matter", 100);
        cache.insert("a", PathBuf::from("a.jar"), 60);
        cache.release("a");
        std::thread::sleep(std::time::Duration::from_millis(2));
        cache.insert("b", PathBuf::from("b.jar"), 60);
        cache.release("b");
        let evicted = cache.evict_to_capacity();
        assert_eq!(evicted, vec![PathBuf::from("a.jar")]);
    }

    #[test]
    fn get_hit_pins_and_bumps_last_used() {
        let cache = JarCache::new("/tmp/does-not-matter", 100);
        cache.insert("a", PathBuf::from("a.jar"), 10);
        cache.release("a");
        let hit = cache.get("a");
        assert!(hit.is_some());
        // now pinned again, should survive eviction even under pressure
        cache.insert("b", PathBuf::from("b.jar"), 200);
        cache.release("b");
        let evicted = cache.evict_to_capacity();
        assert_eq!(evicted, vec![PathBuf::from("b.jar")]);
    }

    #[test]
    fn fingerprint_hit_resolves_to_cached_path() {
        let cache = JarCache::new("/tmp/does-not-matter", 100);
        cache.insert("abc123", PathBuf::from("abc123.jar"), 10);
        cache.record_fingerprint("url:https://example.com/a.jar", "abc123");

        let hit = cache.get_by_fingerprint("url:https://example.com/a.jar");
        assert_eq!(hit, Some(("abc123".to_string(), PathBuf::from("abc123.jar"))));
    }

    #[test]
    fn fingerprint_miss_when_unrecorded() {
        let cache = JarCache::new("/tmp/does-not-matter", 100);
        assert!(cache.get_by_fingerprint("url:https://example.com/a.jar").is_none());
    }

    #[test]
    fn fingerprint_miss_when_entry_since_evicted() {
        let cache = JarCache::new("/tmp/does-not-matter", 100);
        cache.insert("abc123", PathBuf::from("abc123.jar"), 10);
        cache.record_fingerprint("url:https://example.com/a.jar", "abc123");
        cache.release("abc123");
        {
            let mut entries = cache.entries.lock().unwrap();
            entries.remove("abc123");
        }
        assert!(cache.get_by_fingerprint("url:https://example.com/a.jar").is_none());
    }
}
