//! Process-wide free list of fixed-size byte blocks backed by large
//! anonymous memory mappings.
//!
//! Chunks are sourced in batches: whenever the free list runs dry, a
//! fresh `chunk_size * chunks_per_batch` anonymous mapping is carved into
//! individual chunks and pushed onto the list. Mappings are never
//! unmapped; they are retained for the life of the pool so that handing
//! a chunk back out never needs to touch the kernel again.

use std::slice;
use std::sync::Arc;

use crossbeam::queue::SegQueue;
use memmap2::MmapMut;
use parking_lot::Mutex;

use crate::{log_debug, log_error};

/// A fixed-size, exclusively-owned byte block sourced from the pool.
///
/// `Chunk` intentionally does not implement `Clone` or `Copy`: the pool's
/// only invariant is that it never hands the same chunk to two owners at
/// once, which a duplicable handle would violate.
pub struct Chunk {
    ptr: *mut u8,
    len: usize,
}

// SAFETY: a `Chunk` points into a mapping that outlives the pool, and the
// pool's free-list discipline guarantees at most one owner holds a given
// `Chunk` at a time, so it is sound to move (and thus send) between threads.
unsafe impl Send for Chunk {}

// SAFETY: every access to a `Chunk`'s bytes happens through a `Bucket`'s
// `RwLock<BucketInner>`, which already serializes mutation against
// concurrent reads; `Chunk` itself adds no interior mutability of its own,
// so sharing `&Chunk` across threads is sound.
unsafe impl Sync for Chunk {}

impl Chunk {
    /// Borrow the chunk's bytes immutably.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(self.ptr, self.len) }
    }

    /// Borrow the chunk's bytes mutably.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { slice::from_raw_parts_mut(self.ptr, self.len) }
    }

    /// Number of bytes in this chunk.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether this chunk has zero length. Chunks are always sized
    /// `ChunkSize` bytes (non-zero in practice), but provided alongside
    /// `len` per the standard container convention.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Free list of chunks, plus the anonymous mappings that back them.
pub struct ChunkPool {
    free: SegQueue<Chunk>,
    mappings: Mutex<Vec<MmapMut>>,
    growing: Mutex<()>,
    chunk_size: usize,
    chunks_per_batch: usize,
}

impl ChunkPool {
    /// Create a new pool with the given chunk geometry. No memory is
    /// mapped until the first `acquire`.
    pub fn new(chunk_size: usize, chunks_per_batch: usize) -> Arc<Self> {
        Arc::new(Self {
            free: SegQueue::new(),
            mappings: Mutex::new(Vec::new()),
            growing: Mutex::new(()),
            chunk_size,
            chunks_per_batch,
        })
    }

    /// The fixed size of every chunk this pool hands out.
    #[inline]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Return a `chunk_size`-byte block, growing the pool if the free
    /// list is empty.
    ///
    /// Fatal on mmap failure: the pool cannot honor its memory contract,
    /// so this logs at error level and aborts rather than returning an
    /// error a caller could plausibly recover from.
    pub fn acquire(&self) -> Chunk {
        loop {
            if let Some(chunk) = self.free.pop() {
                return chunk;
            }
            self.grow();
        }
    }

    /// Return a chunk to the free list. `chunk` must have been obtained
    /// from this pool and must no longer be referenced by any bucket.
    pub fn release(&self, chunk: Chunk) {
        self.free.push(chunk);
    }

    /// Number of chunks currently sitting idle in the free list.
    pub fn free_len(&self) -> usize {
        self.free.len()
    }

    fn grow(&self) {
        // Serialize growth so two racing callers don't both map a batch;
        // re-check the free list once we hold the lock in case another
        // thread already grew the pool while we were waiting.
        let _guard = self.growing.lock();
        if !self.free.is_empty() {
            return;
        }

        let batch_bytes = self.chunk_size * self.chunks_per_batch;
        let mut mapping = match MmapMut::map_anon(batch_bytes) {
            Ok(m) => m,
            Err(e) => {
                log_error!("chunk pool mmap of {batch_bytes} bytes failed: {e}");
                panic!("chunk pool exhausted host memory: {e}");
            }
        };

        let base = mapping.as_mut_ptr();
        for i in 0..self.chunks_per_batch {
            let ptr = unsafe { base.add(i * self.chunk_size) };
            self.free.push(Chunk { ptr, len: self.chunk_size });
        }

        log_debug!(
            "chunk pool grew by {} chunks ({batch_bytes} bytes), free list now {}",
            self.chunks_per_batch,
            self.free.len()
        );
        self.mappings.lock().push(mapping);
    }
}
