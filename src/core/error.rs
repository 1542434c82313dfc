//! Error types for the cache engine.
//!
//! Only the two synchronous write errors are part of the public taxonomy.
//! Structural misses (torn records, missing fragments) are never surfaced —
//! they collapse to a plain miss on the read path — and pool exhaustion is
//! fatal and aborts the process rather than returning a `Result`.

use thiserror::Error;

/// Errors returned synchronously from a fallible write operation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CacheError {
    /// A write was attempted with an empty key.
    #[error("key must not be empty")]
    InvalidKey,

    /// The encoded entry (key + envelope overhead + value) exceeds the
    /// configured per-item limit, or a single fragment would exceed the
    /// 16-bit key/value length fields.
    #[error("encoded entry of {len} bytes exceeds the {limit}-byte item limit")]
    TooBigKey {
        /// Size of the entry that was rejected, in bytes.
        len: usize,
        /// The limit that was exceeded.
        limit: usize,
    },
}

/// Result alias used by every fallible public operation in this crate.
pub type Result<T> = std::result::Result<T, CacheError>;
