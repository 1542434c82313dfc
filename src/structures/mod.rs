//! Core reusable data structures behind the cache façade.

/// Process-wide free list of mmap-backed fixed-size chunks.
pub mod chunk_pool;

/// Hash-sharded ring-of-chunks storage with generation-based eviction.
pub mod bucket;

/// Value envelope encoding/decoding and big-value fragmentation.
pub mod envelope;

/// Dense, open-addressed-by-identity integer set.
pub mod dense_key_set;

/// Atomic counter overlay backing `Incr`/`Decr`.
pub mod counters;

pub use bucket::Bucket;
pub use chunk_pool::{Chunk, ChunkPool};
pub use counters::CounterOverlay;
pub use dense_key_set::DenseKeySet;
