//! A single hash-shard: a ring of chunks, an append cursor, a generation
//! counter, and a key-hash → descriptor index.
//!
//! Writes append into the ring; once the cursor would run past the last
//! chunk slot it wraps back to slot 0 and the generation counter
//! advances. A descriptor written in an earlier generation is considered
//! live only until the cursor catches back up to its offset — at that
//! point the bytes it pointed to have been overwritten and the entry is
//! evicted, in O(1) amortized time, with no explicit LRU bookkeeping.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::constants::{MAX_GEN, OFFSET_BITS};
use crate::log_trace;
use crate::structures::chunk_pool::{Chunk, ChunkPool};

/// Pack a `(generation, offset)` pair into the single integer stored in
/// a bucket's index.
#[inline]
fn pack(gen: u64, offset: u64) -> u64 {
    debug_assert!(gen <= MAX_GEN);
    debug_assert!(offset < (1u64 << OFFSET_BITS));
    (gen << OFFSET_BITS) | offset
}

/// Unpack a descriptor into its `(generation, offset)` pair.
#[inline]
fn unpack(descriptor: u64) -> (u64, u64) {
    let gen = descriptor >> OFFSET_BITS;
    let offset = descriptor & ((1u64 << OFFSET_BITS) - 1);
    (gen, offset)
}

/// Advance a generation counter, skipping the reserved value 0 on wrap.
#[inline]
fn next_gen(gen: u64) -> u64 {
    let g = gen + 1;
    if g > MAX_GEN {
        1
    } else {
        g
    }
}

/// Invariant A: is a descriptor `(g, o)` still live against the bucket's
/// current `(gen, idx)`?
#[inline]
fn is_live(g: u64, o: u64, cur_gen: u64, cur_idx: u64) -> bool {
    if g == cur_gen {
        o < cur_idx
    } else if g + 1 == cur_gen || (g == MAX_GEN && cur_gen == 1) {
        // `g + 1 == cur_gen` never fires across the wrap (MAX_GEN + 1 is
        // never a valid generation), so the wrap case needs its own arm.
        o >= cur_idx
    } else {
        false
    }
}

/// A bucket's guarded state. Public only within the crate so the cache
/// façade can hold several buckets' write guards at once (in ascending
/// bucket-index order) to make a multi-fragment write atomic across
/// shards without risking lock-order deadlock.
pub(crate) struct BucketInner {
    chunks: Vec<Option<Chunk>>,
    /// Append cursor, in bytes, over the whole `M * chunk_size` ring.
    idx: u64,
    /// Current generation; monotonic, never 0.
    gen: u64,
    /// key-hash -> packed (generation, offset) descriptor.
    index: HashMap<u64, u64, ahash::RandomState>,
}

/// One hash-shard of the cache. Owns its own ring of chunks and its own
/// key-hash index, guarded by a single shared/exclusive lock.
pub struct Bucket {
    inner: RwLock<BucketInner>,
    pool: Arc<ChunkPool>,
    /// Number of chunk slots in the ring (`ceil(max_bucket_bytes / chunk_size)`).
    m: usize,
    chunk_size: usize,
    /// Invoked once per descriptor a generation sweep drops, so the
    /// façade can clean up the counter overlay and big-value side-index.
    on_evict: Arc<dyn Fn(u64) + Send + Sync>,
}

impl Bucket {
    /// Create a new, empty bucket with `m` chunk slots of `chunk_size`
    /// bytes each, sourcing chunks from `pool`.
    pub fn new(pool: Arc<ChunkPool>, m: usize, chunk_size: usize, on_evict: Arc<dyn Fn(u64) + Send + Sync>) -> Self {
        assert!(m >= 1, "a bucket needs at least one chunk slot");
        Self {
            inner: RwLock::new(BucketInner {
                chunks: (0..m).map(|_| None).collect(),
                idx: 0,
                gen: 1,
                index: HashMap::default(),
            }),
            pool,
            m,
            chunk_size,
            on_evict,
        }
    }

    /// Append `(key, value)` under `hash`. Silently drops the write if
    /// the key, the value, or the full record would not fit in a single
    /// chunk.
    pub fn set(&self, key: &[u8], value: &[u8], hash: u64) {
        let mut inner = self.inner.write();
        let evicted = self.append_locked(&mut inner, key, value, hash);
        drop(inner);
        for h in evicted {
            (self.on_evict)(h);
        }
    }

    /// Take this bucket's write lock for the caller to hold across
    /// several `append_locked` calls (or alongside other buckets' write
    /// guards). The façade uses this to make a multi-fragment write
    /// atomic across shards; callers must always acquire guards for
    /// several buckets in ascending bucket-index order to avoid deadlock.
    pub(crate) fn write_guard(&self) -> parking_lot::RwLockWriteGuard<'_, BucketInner> {
        self.inner.write()
    }

    /// Append `(key, value)` under `hash` against an already-held write
    /// guard (this bucket's own, from `write_guard` or `set`). Silently
    /// drops the write if the key, the value, or the full record would
    /// not fit in a single chunk. Returns the hashes of any descriptors a
    /// generation rollover swept, for the caller to report to `on_evict`
    /// once the guard (and any guards on other buckets held alongside it)
    /// has been released.
    pub(crate) fn append_locked(&self, inner: &mut BucketInner, key: &[u8], value: &[u8], hash: u64) -> Vec<u64> {
        if key.len() >= 1 << 16 || value.len() >= 1 << 16 {
            return Vec::new();
        }
        let record_len = 4 + key.len() + value.len();
        if record_len >= self.chunk_size {
            return Vec::new();
        }
        let record_len = record_len as u64;

        let mut chunk = (inner.idx / self.chunk_size as u64) as usize;
        let mut new_idx = inner.idx + record_len;
        let new_chunk = (new_idx / self.chunk_size as u64) as usize;
        let mut need_sweep = false;

        if new_chunk > chunk {
            if new_chunk >= self.m {
                inner.idx = 0;
                new_idx = record_len;
                chunk = 0;
                inner.gen = next_gen(inner.gen);
                need_sweep = true;
            } else {
                inner.idx = (new_chunk * self.chunk_size) as u64;
                new_idx = inner.idx + record_len;
                chunk = new_chunk;
            }
        }

        if inner.chunks[chunk].is_none() {
            inner.chunks[chunk] = Some(self.pool.acquire());
        }

        let local = (inner.idx % self.chunk_size as u64) as usize;
        let buf = inner.chunks[chunk].as_mut().unwrap().as_mut_slice();
        buf[local..local + 2].copy_from_slice(&(key.len() as u16).to_be_bytes());
        buf[local + 2..local + 4].copy_from_slice(&(value.len() as u16).to_be_bytes());
        buf[local + 4..local + 4 + key.len()].copy_from_slice(key);
        buf[local + 4 + key.len()..local + 4 + key.len() + value.len()].copy_from_slice(value);

        let descriptor = pack(inner.gen, inner.idx);
        inner.index.insert(hash, descriptor);
        inner.idx = new_idx;

        if !need_sweep {
            return Vec::new();
        }

        let cur_gen = inner.gen;
        let cur_idx = inner.idx;
        let before = inner.index.len();
        let evicted: Vec<u64> = inner
            .index
            .iter()
            .filter(|(_, &d)| {
                let (g, o) = unpack(d);
                !is_live(g, o, cur_gen, cur_idx)
            })
            .map(|(&h, _)| h)
            .collect();
        for h in &evicted {
            inner.index.remove(h);
        }
        log_trace!(
            "bucket rollover to gen {cur_gen}: swept {} of {before} descriptors",
            evicted.len()
        );
        evicted
    }

    /// Look up `hash`, verifying the stored key matches `key`. If
    /// `return_value` is set and the entry is found, its value bytes are
    /// appended to `dst`. Returns whether the entry was found.
    pub fn get(&self, dst: &mut Vec<u8>, key: &[u8], hash: u64, return_value: bool) -> bool {
        let inner = self.inner.read();
        let Some(&descriptor) = inner.index.get(&hash) else {
            return false;
        };
        let (g, o) = unpack(descriptor);
        if !is_live(g, o, inner.gen, inner.idx) {
            return false;
        }

        let chunk_idx = (o / self.chunk_size as u64) as usize;
        let local = (o % self.chunk_size as u64) as usize;
        let Some(Some(chunk)) = inner.chunks.get(chunk_idx) else {
            return false;
        };
        let buf = chunk.as_slice();
        if local + 4 > self.chunk_size {
            return false;
        }
        let key_len = u16::from_be_bytes([buf[local], buf[local + 1]]) as usize;
        let val_len = u16::from_be_bytes([buf[local + 2], buf[local + 3]]) as usize;
        if local + 4 + key_len + val_len > self.chunk_size {
            return false;
        }

        let key_start = local + 4;
        if &buf[key_start..key_start + key_len] != key {
            return false;
        }

        if return_value {
            let val_start = key_start + key_len;
            dst.extend_from_slice(&buf[val_start..val_start + val_len]);
        }
        true
    }

    /// Evict the descriptor for `hash`, if any. Idempotent. Does not
    /// reclaim the bytes it pointed to.
    pub fn remove(&self, hash: u64) {
        self.inner.write().index.remove(&hash);
    }

    /// Return every owned chunk to the pool, clear the index, and reset
    /// the ring to generation 1 at cursor 0.
    pub fn reset(&self) {
        let mut inner = self.inner.write();
        for slot in inner.chunks.iter_mut() {
            if let Some(chunk) = slot.take() {
                self.pool.release(chunk);
            }
        }
        inner.index.clear();
        inner.gen = 1;
        inner.idx = 0;
    }

    /// Number of live-or-stale descriptors currently tracked (diagnostic;
    /// includes entries not yet swept by a rollover).
    pub fn index_len(&self) -> usize {
        self.inner.read().index.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn bucket(m: usize, chunk_size: usize) -> (Bucket, Arc<AtomicUsize>) {
        let pool = ChunkPool::new(chunk_size, 4);
        let evicted = Arc::new(AtomicUsize::new(0));
        let counter = evicted.clone();
        let b = Bucket::new(pool, m, chunk_size, Arc::new(move |_h| {
            counter.fetch_add(1, Ordering::Relaxed);
        }));
        (b, evicted)
    }

    #[test]
    fn round_trip_small_value() {
        let (b, _) = bucket(4, 1024);
        b.set(b"a", b"a", 1);
        let mut out = Vec::new();
        assert!(b.get(&mut out, b"a", 1, true));
        assert_eq!(out, b"a");
    }

    #[test]
    fn miss_for_unknown_key() {
        let (b, _) = bucket(4, 1024);
        let mut out = Vec::new();
        assert!(!b.get(&mut out, b"missing", 42, true));
    }

    #[test]
    fn remove_is_idempotent() {
        let (b, _) = bucket(4, 1024);
        b.set(b"k", b"v", 1);
        b.remove(1);
        b.remove(1);
        let mut out = Vec::new();
        assert!(!b.get(&mut out, b"k", 1, true));
    }

    #[test]
    fn rollover_evicts_oldest_and_invokes_callback() {
        // 2 chunk slots of 64 bytes: small records force several rollovers.
        let (b, evicted) = bucket(2, 64);
        for i in 0u64..40 {
            let key = i.to_be_bytes();
            b.set(&key, &key, i);
        }
        let mut out = Vec::new();
        // Earliest key should have been evicted by now.
        assert!(!b.get(&mut out, &0u64.to_be_bytes(), 0, false));
        // Most recent key should still be live.
        assert!(b.get(&mut out, &39u64.to_be_bytes(), 39, false));
        assert!(evicted.load(Ordering::Relaxed) > 0);
    }

    #[test]
    fn oversized_record_is_silently_dropped() {
        let (b, _) = bucket(2, 64);
        let huge = vec![0u8; 128];
        b.set(b"k", &huge, 1);
        let mut out = Vec::new();
        assert!(!b.get(&mut out, b"k", 1, true));
    }

    #[test]
    fn hash_collision_is_rejected_by_key_mismatch() {
        let (b, _) = bucket(4, 1024);
        b.set(b"k1", b"v1", 7);
        b.set(b"k2", b"v2", 7); // same hash, distinct key
        let mut out = Vec::new();
        assert!(!b.get(&mut out, b"k1", 7, true));
        out.clear();
        assert!(b.get(&mut out, b"k2", 7, true));
        assert_eq!(out, b"v2");
    }

    #[test]
    fn reset_releases_chunks_and_clears_index() {
        let (b, _) = bucket(4, 1024);
        b.set(b"k", b"v", 1);
        b.reset();
        assert_eq!(b.index_len(), 0);
        let mut out = Vec::new();
        assert!(!b.get(&mut out, b"k", 1, true));
    }

    #[test]
    fn generation_wraps_past_zero() {
        assert_eq!(next_gen(MAX_GEN), 1);
        assert_eq!(next_gen(1), 2);
    }

    #[test]
    fn packing_round_trips() {
        let d = pack(5, 12345);
        assert_eq!(unpack(d), (5, 12345));
    }
}
