//! Block cache (§4.4) — reduces backend traffic for randomizers (requested
//! repeatedly across files and uploads) and recently retrieved data blocks.
//!
//! Eviction is approximate-LRU. When two-tier partitioning is enabled
//! (`min_personal_cache_bytes > 0`), altruistic entries are always evicted
//! before personal ones, and the personal partition is never evicted below
//! its configured floor unless the personal working set itself exceeds that
//! floor. Within a partition, least-recently-used goes first.
//!
//! The whole cache is guarded by one short-held `Mutex` (the teacher's
//! `io_stream` writer takes the same "one mutable cursor, one lock" stance
//! rather than fine-grained per-entry locking) — recency bookkeeping on
//! every `get` needs mutation anyway, so a reader/writer split would not
//! avoid write-locking in the common path.

use crate::backend::Cid;
use crate::block::Block;
use std::collections::HashMap;
use std::sync::Mutex;

/// Which pool a cached block counts against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Partition {
    /// Blocks this node fetched or produced for its own uploads/downloads.
    Personal,
    /// Blocks retained purely so they can serve as randomizers for other
    /// users' uploads — evicted first under pressure.
    Altruistic,
}

struct Entry {
    block: Block,
    partition: Partition,
    last_access: u64,
}

struct Inner {
    entries: HashMap<Cid, Entry>,
    resident_bytes: u64,
    capacity_bytes: u64,
    min_personal_bytes: u64,
    tick: u64,
    hits: u64,
    misses: u64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub resident_bytes: u64,
    pub capacity_bytes: u64,
}

/// Shared contract so pipelines can be generic over the concrete cache
/// implementation, the way the core is generic over `Backend`.
pub trait Cache: Send + Sync {
    fn get(&self, cid: &Cid) -> Option<Block>;
    fn put(&self, cid: Cid, block: Block, partition: Partition);
    fn evict_to(&self, bytes: u64);
    fn stats(&self) -> CacheStats;
}

/// The concrete approximate-LRU cache described in §4.4.
pub struct BlockCache {
    inner: Mutex<Inner>,
}

impl BlockCache {
    pub fn new(capacity_bytes: u64, min_personal_bytes: u64) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                resident_bytes: 0,
                capacity_bytes,
                min_personal_bytes,
                tick: 0,
                hits: 0,
                misses: 0,
            }),
        }
    }

    fn personal_bytes(inner: &Inner) -> u64 {
        inner
            .entries
            .values()
            .filter(|e| e.partition == Partition::Personal)
            .map(|e| e.block.size() as u64)
            .sum()
    }

    /// Evict entries until resident bytes are at or below `target`,
    /// honoring the partition policy.
    fn evict_to_locked(inner: &mut Inner, target: u64) {
        if inner.resident_bytes <= target {
            return;
        }

        let personal_floor = inner.min_personal_bytes.min(Self::personal_bytes(inner));

        loop {
            if inner.resident_bytes <= target {
                break;
            }

            // Candidates: altruistic entries first (any recency), then
            // personal entries only once personal bytes exceed the floor.
            let personal_now = Self::personal_bytes(inner);
            let victim = inner
                .entries
                .iter()
                .filter(|(_, e)| {
                    e.partition == Partition::Altruistic || personal_now > personal_floor
                })
                .min_by_key(|(_, e)| (e.partition != Partition::Altruistic, e.last_access))
                .map(|(cid, _)| cid.clone());

            match victim {
                Some(cid) => {
                    if let Some(e) = inner.entries.remove(&cid) {
                        inner.resident_bytes -= e.block.size() as u64;
                        tracing::trace!(%cid, partition = ?e.partition, "evicted cache entry");
                    }
                }
                None => break, // nothing left evictable without breaching the floor
            }
        }
    }
}

impl Cache for BlockCache {
    fn get(&self, cid: &Cid) -> Option<Block> {
        let mut inner = self.inner.lock().unwrap();
        inner.tick += 1;
        let tick = inner.tick;
        if let Some(entry) = inner.entries.get_mut(cid) {
            entry.last_access = tick;
            let block = entry.block.clone();
            inner.hits += 1;
            Some(block)
        } else {
            inner.misses += 1;
            None
        }
    }

    fn put(&self, cid: Cid, block: Block, partition: Partition) {
        let mut inner = self.inner.lock().unwrap();
        let size = block.size() as u64;

        if let Some(old) = inner.entries.remove(&cid) {
            inner.resident_bytes -= old.block.size() as u64;
        }

        inner.tick += 1;
        let tick = inner.tick;
        inner.entries.insert(
            cid,
            Entry {
                block,
                partition,
                last_access: tick,
            },
        );
        inner.resident_bytes += size;

        let capacity = inner.capacity_bytes;
        Self::evict_to_locked(&mut inner, capacity);
    }

    fn evict_to(&self, bytes: u64) {
        let mut inner = self.inner.lock().unwrap();
        Self::evict_to_locked(&mut inner, bytes);
    }

    fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().unwrap();
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            resident_bytes: inner.resident_bytes,
            capacity_bytes: inner.capacity_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cid(n: u8) -> Cid {
        Cid::new(format!("cid-{n}"))
    }

    #[test]
    fn get_put_roundtrip_and_stats() {
        let cache = BlockCache::new(1024, 0);
        assert!(cache.get(&cid(1)).is_none());
        cache.put(cid(1), Block::new(vec![1u8; 16]), Partition::Personal);
        assert_eq!(cache.get(&cid(1)).unwrap().size(), 16);
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.resident_bytes, 16);
    }

    #[test]
    fn resident_bytes_never_exceed_capacity() {
        let cache = BlockCache::new(32, 0);
        for i in 0..8u8 {
            cache.put(cid(i), Block::new(vec![0u8; 16]), Partition::Personal);
            assert!(cache.stats().resident_bytes <= 32);
        }
    }

    #[test]
    fn altruistic_evicted_before_personal() {
        let cache = BlockCache::new(32, 16);
        cache.put(cid(1), Block::new(vec![0u8; 16]), Partition::Personal);
        cache.put(cid(2), Block::new(vec![0u8; 16]), Partition::Altruistic);
        // Pushing resident bytes over capacity should evict the altruistic
        // entry, not the personal one, even though altruistic was accessed
        // more recently.
        cache.put(cid(3), Block::new(vec![0u8; 16]), Partition::Altruistic);
        assert!(cache.get(&cid(1)).is_some(), "personal entry must survive");
        assert_eq!(cache.stats().resident_bytes, 32);
    }

    #[test]
    fn personal_floor_honored_unless_working_set_exceeds_it() {
        let cache = BlockCache::new(16, 16);
        cache.put(cid(1), Block::new(vec![0u8; 16]), Partition::Personal);
        // No altruistic entries to evict and personal is at the floor —
        // a further put must still keep resident bytes at capacity by
        // evicting the old personal entry, since there is nothing else.
        cache.put(cid(2), Block::new(vec![0u8; 16]), Partition::Personal);
        assert_eq!(cache.stats().resident_bytes, 16);
    }
}
