//! Configuration for the cache engine.
//!
//! Mirrors the teacher's `Config` / `Default` / `load_or_default` pattern:
//! a struct with sane defaults, optional overriding from a TOML file, and
//! a logged fallback when no file is given or loading fails.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::{BUCKET_COUNT, CHUNKS_PER_BATCH, CHUNK_SIZE, DEFAULT_MAX_BYTES, MAX_OFFSET};
use crate::{log_info, log_warn};

/// Upper bound on `max_bytes`: one gibibyte short of the largest offset a
/// packed descriptor can address, so every byte of the budget stays
/// representable within a bucket's ring.
const MAX_MAX_BYTES: u64 = MAX_OFFSET - (1 << 30);

/// Cache engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    /// Total byte budget across all buckets.
    pub max_bytes: u64,

    /// Number of hash-sharded buckets. Fixed at 512 in production; made
    /// configurable so tests can force small, deterministic bucket budgets.
    pub bucket_count: usize,

    /// Size in bytes of a single chunk handed out by the chunk pool.
    pub chunk_size: usize,

    /// Number of chunks mapped together in one anonymous mmap region.
    pub chunks_per_batch: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_BYTES,
            bucket_count: BUCKET_COUNT,
            chunk_size: CHUNK_SIZE,
            chunks_per_batch: CHUNKS_PER_BATCH,
        }
    }
}

impl Config {
    /// `max_bytes`, clamped to `[1, 2^OffsetBits - 2^30)` so the budget
    /// never exceeds what a packed bucket descriptor can address.
    pub fn clamped_max_bytes(&self) -> u64 {
        self.max_bytes.clamp(1, MAX_MAX_BYTES - 1)
    }

    /// Per-bucket byte budget, derived from `max_bytes` and `bucket_count`.
    pub fn max_bucket_bytes(&self) -> u64 {
        self.clamped_max_bytes().div_ceil(self.bucket_count as u64)
    }

    /// Upper bound on a single user value after envelope overhead.
    pub fn max_item_bytes(&self) -> u64 {
        self.clamped_max_bytes() / 2
    }

    /// Load configuration from a TOML file at `path`.
    pub fn load_from(path: &Path) -> anyhow::Result<Config> {
        let raw = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&raw)?;
        Ok(config)
    }

    /// Load configuration from an optional TOML file, falling back to
    /// defaults if no path is given or loading fails.
    pub fn load_or_default(path: Option<&Path>) -> Config {
        match path {
            Some(path) => match Self::load_from(path) {
                Ok(config) => {
                    log_info!("loaded cache configuration from {}", path.display());
                    config
                }
                Err(e) => {
                    log_warn!("failed to load config from {}: {e}. using defaults", path.display());
                    Config::default()
                }
            },
            None => {
                log_info!("no config file specified, using default cache configuration");
                Config::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_derives_expected_budgets() {
        let cfg = Config::default();
        assert_eq!(cfg.bucket_count, BUCKET_COUNT);
        assert_eq!(cfg.max_bucket_bytes(), DEFAULT_MAX_BYTES.div_ceil(BUCKET_COUNT as u64));
        assert_eq!(cfg.max_item_bytes(), DEFAULT_MAX_BYTES / 2);
    }

    #[test]
    fn max_bytes_is_clamped_to_a_positive_minimum() {
        let cfg = Config { max_bytes: 0, ..Config::default() };
        assert_eq!(cfg.clamped_max_bytes(), 1);
    }

    #[test]
    fn max_bytes_is_clamped_below_the_offset_ceiling() {
        let cfg = Config { max_bytes: u64::MAX, ..Config::default() };
        assert!(cfg.clamped_max_bytes() < MAX_OFFSET);
    }

    #[test]
    fn load_or_default_falls_back_without_path() {
        let cfg = Config::load_or_default(None);
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn round_trips_through_toml() {
        let cfg = Config { max_bytes: 4 * 1024 * 1024, bucket_count: 4, chunk_size: 8192, chunks_per_batch: 8 };
        let text = toml::to_string(&cfg).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(cfg, parsed);
    }
}
