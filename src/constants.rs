//! Global constants used throughout the cache engine.
//!
//! This module contains compile-time defaults that are shared across
//! multiple modules to ensure consistency and avoid magic numbers.

/// Size of each chunk in bytes (64KB), the unit the chunk pool hands out
/// and the unit a bucket's ring is divided into.
///
/// Large enough to amortize mmap overhead across many records, small
/// enough that a single-chunk record cap still admits reasonably sized
/// small values.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Number of chunks mapped together in a single anonymous region.
///
/// The pool maps `CHUNK_SIZE * CHUNKS_PER_BATCH` bytes at a time and
/// slices the mapping into individual chunks, so growth is batched
/// rather than one mmap call per chunk.
pub const CHUNKS_PER_BATCH: usize = 1024;

/// Fixed number of hash-sharded buckets the cache façade routes through.
pub const BUCKET_COUNT: usize = 512;

/// Default total byte budget for the cache (64MiB).
pub const DEFAULT_MAX_BYTES: u64 = 64 * 1024 * 1024;

/// Number of bits of a packed descriptor given to the generation counter.
///
/// The remaining `64 - GEN_BITS` bits hold the offset within a bucket's
/// ring. Recommended split: 24 bits of generation, 40 bits of offset.
pub const GEN_BITS: u32 = 24;

/// Number of bits of a packed descriptor given to the in-bucket offset.
pub const OFFSET_BITS: u32 = 64 - GEN_BITS;

/// Largest representable generation value before wraparound (`2^GEN_BITS - 1`).
pub const MAX_GEN: u64 = (1u64 << GEN_BITS) - 1;

/// Largest representable offset value (`2^OFFSET_BITS - 1`).
pub const MAX_OFFSET: u64 = (1u64 << OFFSET_BITS) - 1;

/// Default minimum load factor the dense key-set shrinks down to (30%).
pub const DENSE_SET_MIN_LOAD_FACTOR: f64 = 0.30;
