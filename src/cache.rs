//! The cache façade: hash-shards keys across buckets, orchestrates
//! big-value fragmentation, and hosts the counter overlay and big-value
//! side-index that ride alongside the bucket ring.

use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;

use crate::core::{CacheError, Config, Result};
use crate::structures::bucket::BucketInner;
use crate::structures::chunk_pool::ChunkPool;
use crate::structures::envelope::{decode_envelope, encode_fragments, fragment_key, Fragment};
use crate::structures::{Bucket, CounterOverlay, DenseKeySet};
use crate::{log_trace, log_warn};

/// A caller-supplied (or default `ahash`) byte-hashing function.
pub type HashFn = Arc<dyn Fn(&[u8]) -> u64 + Send + Sync>;

/// Default hash function: `ahash` over the key bytes, matching the
/// teacher's fused-hash usage throughout its index structures.
fn default_hash(bytes: &[u8]) -> u64 {
    let mut hasher = ahash::AHasher::default();
    bytes.hash(&mut hasher);
    hasher.finish()
}

/// Fold a hash of `0` to `1` so it can never collide with the dense
/// key-set's empty-slot sentinel.
#[inline]
fn nonzero(h: u64) -> u64 {
    if h == 0 {
        1
    } else {
        h
    }
}

fn now_nanos() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos() as u64
}

/// In-process, fixed-budget, byte-oriented cache engine.
///
/// Routes `Set`/`Get`/`Incr`/`Decr`/`Expire`/`Remove`/`Contains` across a
/// fixed array of hash-sharded [`Bucket`]s, each backed by the
/// process-wide [`ChunkPool`]. Big values are split into envelopes
/// addressed by synthetic sub-keys (see
/// [`crate::structures::envelope`]); counter-valued keys bypass the
/// bucket ring entirely via the [`CounterOverlay`].
pub struct Cache {
    buckets: Vec<Bucket>,
    bucket_count: usize,
    chunk_size: usize,
    max_item_bytes: u64,
    counters: Arc<CounterOverlay>,
    big_value_keys: Arc<RwLock<DenseKeySet>>,
    counter_keys: Arc<RwLock<DenseKeySet>>,
    hash_fn: HashFn,
    _pool: Arc<ChunkPool>,
}

impl Cache {
    /// Build a cache from `config`, using `ahash` as the key-hashing
    /// function.
    pub fn new(config: Config) -> Self {
        Self::with_hasher(config, Arc::new(default_hash))
    }

    /// Build a cache from `config` with a caller-supplied hash function.
    /// Exposed so tests can force deliberate hash collisions (see the
    /// hash-collision scenario in the engine's test suite).
    pub fn with_hasher(config: Config, hash_fn: HashFn) -> Self {
        let pool = ChunkPool::new(config.chunk_size, config.chunks_per_batch);
        let counters = Arc::new(CounterOverlay::new());
        let big_value_keys = Arc::new(RwLock::new(DenseKeySet::new()));
        let counter_keys = Arc::new(RwLock::new(DenseKeySet::new()));

        let m = config.max_bucket_bytes().div_ceil(config.chunk_size as u64).max(1) as usize;

        let buckets = (0..config.bucket_count)
            .map(|_| {
                let counters = counters.clone();
                let big_value_keys = big_value_keys.clone();
                let counter_keys = counter_keys.clone();
                let on_evict: Arc<dyn Fn(u64) + Send + Sync> = Arc::new(move |h| {
                    counters.remove(h);
                    big_value_keys.write().remove(h);
                    counter_keys.write().remove(h);
                });
                Bucket::new(pool.clone(), m, config.chunk_size, on_evict)
            })
            .collect();

        Self {
            buckets,
            bucket_count: config.bucket_count,
            chunk_size: config.chunk_size,
            max_item_bytes: config.max_item_bytes(),
            counters,
            big_value_keys,
            counter_keys,
            hash_fn,
            _pool: pool,
        }
    }

    #[inline]
    fn hash(&self, bytes: &[u8]) -> u64 {
        (self.hash_fn)(bytes)
    }

    #[inline]
    fn bucket_index(&self, hash: u64) -> usize {
        (hash as usize) % self.bucket_count
    }

    fn check_key(&self, key: &[u8]) -> Result<()> {
        if key.is_empty() {
            log_warn!("rejected write: empty key");
            return Err(CacheError::InvalidKey);
        }
        Ok(())
    }

    /// Store `value` under `key` with no expiry. Equivalent to
    /// `set_with_ttl(key, value, None)`.
    pub fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.set_with_ttl(key, value, None)
    }

    /// Store `value` under `key`, expiring after `ttl` if given.
    pub fn set_with_ttl(&self, key: &[u8], value: &[u8], ttl: Option<Duration>) -> Result<()> {
        self.check_key(key)?;

        let total_len = 4 + key.len() + 10 + value.len();
        if total_len as u64 >= self.max_item_bytes {
            log_warn!("rejected write: {total_len} bytes exceeds the {}-byte item limit", self.max_item_bytes);
            return Err(CacheError::TooBigKey { len: total_len, limit: self.max_item_bytes as usize });
        }

        let deadline = ttl.map(|d| now_nanos().saturating_add(d.as_nanos() as u64)).unwrap_or(0);
        let fragments = encode_fragments(key, value, deadline, self.chunk_size).map_err(|e| {
            log_warn!("rejected write: {e}");
            e
        })?;

        let key_hash = self.hash(key);
        let targets: Vec<(usize, u64, Fragment)> = fragments
            .into_iter()
            .map(|f| {
                let h = self.hash(&f.sub_key);
                (self.bucket_index(h), h, f)
            })
            .collect();

        self.write_fragments(&targets);

        if targets.len() > 1 {
            self.big_value_keys.write().insert(nonzero(key_hash));
        }
        Ok(())
    }

    /// Write every fragment in `targets` atomically across the buckets it
    /// touches: every distinct bucket's write lock is acquired up front,
    /// in ascending bucket-index order, so a concurrent reader never
    /// observes fragment 1 without its siblings and two concurrent
    /// multi-fragment writes can never deadlock against each other.
    fn write_fragments(&self, targets: &[(usize, u64, Fragment)]) {
        let mut distinct: Vec<usize> = targets.iter().map(|(b, _, _)| *b).collect();
        distinct.sort_unstable();
        distinct.dedup();

        let mut guards: Vec<parking_lot::RwLockWriteGuard<'_, BucketInner>> =
            distinct.iter().map(|&b| self.buckets[b].write_guard()).collect();

        let mut all_evicted: Vec<u64> = Vec::new();
        for (bucket_idx, hash, frag) in targets {
            let slot = distinct.binary_search(bucket_idx).unwrap();
            let evicted = self.buckets[*bucket_idx].append_locked(&mut guards[slot], &frag.sub_key, &frag.envelope, *hash);
            all_evicted.extend(evicted);
        }
        drop(guards);

        for h in all_evicted {
            self.counters.remove(h);
            self.big_value_keys.write().remove(h);
            self.counter_keys.write().remove(h);
        }
    }

    /// Fetch the value stored under `key`, if present and unexpired.
    /// Returns `(None, false)` on a miss, an expired entry, a torn
    /// fragment sequence, or a hash collision against a different key.
    pub fn get(&self, key: &[u8]) -> (Option<Vec<u8>>, bool) {
        let hash = self.hash(key);
        let bucket = &self.buckets[self.bucket_index(hash)];

        let mut raw = Vec::new();
        if !bucket.get(&mut raw, key, hash, true) {
            return (None, false);
        }

        let Some(decoded) = decode_envelope(&raw) else {
            return (None, false);
        };
        if decoded.position != 1 {
            return (None, false);
        }

        let now = now_nanos() as i64;
        if decoded.deadline_nanos != 0 && (decoded.deadline_nanos as i64) < now {
            bucket.remove(hash);
            self.counters.remove(hash);
            self.big_value_keys.write().remove(nonzero(hash));
            return (None, false);
        }

        if decoded.fragment_count == 1 {
            return (Some(decoded.payload.to_vec()), true);
        }

        let mut value = decoded.payload.to_vec();
        for position in 2..=decoded.fragment_count {
            let sub_key = fragment_key(key, position);
            let sub_hash = self.hash(&sub_key);
            let sub_bucket = &self.buckets[self.bucket_index(sub_hash)];

            let mut frag_raw = Vec::new();
            if !sub_bucket.get(&mut frag_raw, &sub_key, sub_hash, true) {
                return (None, false);
            }
            let Some(frag_decoded) = decode_envelope(&frag_raw) else {
                return (None, false);
            };
            value.extend_from_slice(frag_decoded.payload);
        }
        (Some(value), true)
    }

    /// Whether `key` has a live, unexpired entry, without materializing
    /// its value. Recognizes both bucket-ring entries and counter-valued
    /// keys (consulting the counter-keys side-index first so a
    /// counter-only key never needs a bucket probe).
    pub fn contains(&self, key: &[u8]) -> bool {
        let hash = self.hash(key);

        if self.counter_keys.read().contains(nonzero(hash)) {
            return self.counters.get(hash, now_nanos() as i64).is_some();
        }

        let bucket = &self.buckets[self.bucket_index(hash)];
        let mut raw = Vec::new();
        if !bucket.get(&mut raw, key, hash, true) {
            return false;
        }
        let Some(decoded) = decode_envelope(&raw) else {
            return false;
        };
        if decoded.position != 1 {
            return false;
        }
        let now = now_nanos() as i64;
        decoded.deadline_nanos == 0 || (decoded.deadline_nanos as i64) >= now
    }

    /// Delete `key`'s entry. Idempotent. Stale fragments (for a
    /// previously big-valued key) become unreachable and age out via
    /// ordinary generation rollover rather than being reclaimed eagerly.
    pub fn remove(&self, key: &[u8]) {
        let hash = self.hash(key);
        self.buckets[self.bucket_index(hash)].remove(hash);
        self.counters.remove(hash);
        self.big_value_keys.write().remove(nonzero(hash));
        self.counter_keys.write().remove(nonzero(hash));
    }

    /// Rewrite `key`'s TTL deadline in place. A no-op if the key is
    /// absent or addresses a fragment rather than a fragment-1 entry.
    pub fn expire(&self, key: &[u8], ttl: Option<Duration>) {
        let hash = self.hash(key);
        let bucket = &self.buckets[self.bucket_index(hash)];

        let mut raw = Vec::new();
        if !bucket.get(&mut raw, key, hash, true) {
            if self.counters.get(hash, now_nanos() as i64).is_some() {
                let deadline = ttl.map(|d| now_nanos().saturating_add(d.as_nanos() as u64)).unwrap_or(0) as i64;
                self.counters.expire(hash, deadline);
            }
            return;
        }
        let Some(decoded) = decode_envelope(&raw) else {
            return;
        };
        if decoded.position != 1 {
            return;
        }

        let deadline = ttl.map(|d| now_nanos().saturating_add(d.as_nanos() as u64)).unwrap_or(0);
        let mut rewritten = raw;
        rewritten[2..10].copy_from_slice(&deadline.to_be_bytes());
        bucket.set(key, &rewritten, hash);
        log_trace!("expire: rewrote deadline for one key to {deadline}");
    }

    /// Add `delta` to the counter for `key`, creating it at 0 first if
    /// absent. Returns the post-update value.
    pub fn incr(&self, key: &[u8], delta: i64) -> Result<i64> {
        self.apply_delta(key, delta)
    }

    /// Subtract `delta` from the counter for `key`, creating it at 0
    /// first if absent. Returns the post-update value.
    pub fn decr(&self, key: &[u8], delta: i64) -> Result<i64> {
        self.apply_delta(key, -delta)
    }

    fn apply_delta(&self, key: &[u8], delta: i64) -> Result<i64> {
        self.check_key(key)?;
        let hash = self.hash(key);
        let value = self.counters.apply(hash, delta, now_nanos() as i64);
        self.counter_keys.write().insert(nonzero(hash));
        Ok(value)
    }

    /// Number of hash-sharded buckets backing this cache.
    pub fn bucket_count(&self) -> usize {
        self.bucket_count
    }

    /// Cheap administrative check: whether `key` currently addresses a
    /// fragmented ("big") value, consulting the side-index instead of
    /// touching the bucket ring. May return a stale `true` for a key whose
    /// fragment 1 has since rolled over; callers that need a definitive
    /// answer should use [`Cache::contains`] instead.
    pub fn is_big_value(&self, key: &[u8]) -> bool {
        let hash = self.hash(key);
        self.big_value_keys.read().contains(nonzero(hash))
    }
}
