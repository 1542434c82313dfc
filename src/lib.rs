//! ring-cache: an in-process, fixed-budget, byte-oriented cache engine.
//!
//! Values live in a fixed pool of mmap-backed chunks, arranged as
//! hash-sharded rings that evict their oldest entries in O(1) amortized
//! time via a generation counter, with no explicit LRU bookkeeping.
//! Values larger than one chunk are split into envelopes addressed by
//! synthetic sub-keys; integer-valued keys can instead be routed
//! straight through an atomic counter overlay, bypassing the ring.
#![warn(missing_docs)]

// Configure global allocator for everything outside the chunk pool; the
// pool itself sources memory directly from anonymous mmap regions.
#[global_allocator]
static GLOBAL: jemallocator::Jemalloc = jemallocator::Jemalloc;

/// Cache engine constants: chunk geometry, descriptor bit widths, and
/// the dense key-set's load-factor floor.
pub mod constants;

/// Ambient engineering: configuration, error taxonomy, logging macros.
pub mod core;

/// Core reusable data structures: chunk pool, bucket, envelope codec,
/// dense key-set, counter overlay.
pub mod structures;

mod cache;

pub use cache::{Cache, HashFn};
pub use core::{CacheError, Config, Result};

/// Crate version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");

static GLOBAL_CACHE: once_cell::sync::OnceCell<Cache> = once_cell::sync::OnceCell::new();

/// The process-wide default cache, built from [`Config::default()`] on
/// first access and shared by every subsequent caller.
///
/// A convenience for callers that don't need per-instance configuration;
/// anyone who does should build their own [`Cache`] via [`Cache::new`]
/// instead.
pub fn global() -> &'static Cache {
    GLOBAL_CACHE.get_or_init(|| Cache::new(Config::default()))
}

/// Initialize process-wide tracing for binaries/tests embedding this
/// crate. Libraries that already configure a subscriber should not call
/// this; it is a convenience for standalone tests and benchmarks.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_cache_is_shared_across_calls() {
        global().set(b"global-key", b"v").unwrap();
        let (value, found) = global().get(b"global-key");
        assert!(found);
        assert_eq!(value.unwrap(), b"v");
    }
}
