//! Byte-bounded LRU cache of decoded chunks.
//!
//! Chunks are stored type-erased (`Arc<dyn Any>`) so a single cache can hold
//! scene, frame and agent chunks side by side. The byte cost of a chunk is the
//! size of its encoded file, which is what the cache budget is expressed in.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use super::records::Table;

pub(crate) type ChunkKey = (Table, usize);
pub(crate) type SharedChunk = Arc<dyn Any + Send + Sync>;

struct CacheEntry {
    chunk: SharedChunk,
    bytes: usize,
    last_used: u64,
}

/// Point-in-time counters for a [`ChunkCache`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub resident_bytes: usize,
    pub capacity_bytes: usize,
    pub chunks: usize,
}

pub(crate) struct ChunkCache {
    capacity_bytes: usize,
    resident_bytes: usize,
    tick: u64,
    hits: u64,
    misses: u64,
    entries: HashMap<ChunkKey, CacheEntry>,
}

impl ChunkCache {
    pub(crate) fn new(capacity_bytes: usize) -> Self {
        Self {
            capacity_bytes,
            resident_bytes: 0,
            tick: 0,
            hits: 0,
            misses: 0,
            entries: HashMap::new(),
        }
    }

    pub(crate) fn get(&mut self, key: &ChunkKey) -> Option<SharedChunk> {
        self.tick += 1;
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.last_used = self.tick;
                self.hits += 1;
                Some(entry.chunk.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Inserts `chunk`, evicting least recently used chunks until it fits.
    /// A chunk larger than the whole budget is not cached.
    pub(crate) fn insert(&mut self, key: ChunkKey, chunk: SharedChunk, bytes: usize) {
        if bytes > self.capacity_bytes {
            return;
        }
        if let Some(old) = self.entries.remove(&key) {
            self.resident_bytes -= old.bytes;
        }

        while self.resident_bytes + bytes > self.capacity_bytes {
            let Some(victim) = self
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(key, _)| *key)
            else {
                break;
            };
            if let Some(evicted) = self.entries.remove(&victim) {
                self.resident_bytes -= evicted.bytes;
                tracing::trace!(table = ?victim.0, chunk = victim.1, "evicted chunk");
            }
        }

        self.tick += 1;
        self.resident_bytes += bytes;
        self.entries.insert(
            key,
            CacheEntry {
                chunk,
                bytes,
                last_used: self.tick,
            },
        );
    }

    pub(crate) fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            resident_bytes: self.resident_bytes,
            capacity_bytes: self.capacity_bytes,
            chunks: self.entries.len(),
        }
    }
}

#[cfg(test)]
mod chunk_cache_tests {
    use super::*;

    fn chunk(values: Vec<u32>) -> SharedChunk {
        Arc::new(values)
    }

    #[test]
    fn test_hit_and_miss_counters() {
        let mut cache = ChunkCache::new(100);
        assert!(cache.get(&(Table::Frames, 0)).is_none());

        cache.insert((Table::Frames, 0), chunk(vec![1, 2]), 10);
        let hit = cache.get(&(Table::Frames, 0)).unwrap();
        assert_eq!(hit.downcast_ref::<Vec<u32>>(), Some(&vec![1, 2]));

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses), (1, 1));
        assert_eq!(stats.resident_bytes, 10);
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let mut cache = ChunkCache::new(30);
        cache.insert((Table::Agents, 0), chunk(vec![0]), 10);
        cache.insert((Table::Agents, 1), chunk(vec![1]), 10);
        cache.insert((Table::Agents, 2), chunk(vec![2]), 10);

        // Touch chunk 0 so chunk 1 becomes the oldest.
        assert!(cache.get(&(Table::Agents, 0)).is_some());
        cache.insert((Table::Agents, 3), chunk(vec![3]), 10);

        assert!(cache.get(&(Table::Agents, 1)).is_none());
        assert!(cache.get(&(Table::Agents, 0)).is_some());
        assert!(cache.get(&(Table::Agents, 3)).is_some());
        assert_eq!(cache.stats().resident_bytes, 30);
    }

    #[test]
    fn test_oversized_chunk_is_not_cached() {
        let mut cache = ChunkCache::new(5);
        cache.insert((Table::Scenes, 0), chunk(vec![0]), 6);
        assert_eq!(cache.stats().chunks, 0);

        let mut disabled = ChunkCache::new(0);
        disabled.insert((Table::Scenes, 0), chunk(vec![0]), 1);
        assert!(disabled.get(&(Table::Scenes, 0)).is_none());
    }

    #[test]
    fn test_reinsert_replaces_entry() {
        let mut cache = ChunkCache::new(50);
        cache.insert((Table::Frames, 4), chunk(vec![1]), 20);
        cache.insert((Table::Frames, 4), chunk(vec![2]), 25);

        let stats = cache.stats();
        assert_eq!(stats.chunks, 1);
        assert_eq!(stats.resident_bytes, 25);
    }
}
