//! Core ambient machinery: configuration, errors, logging.

/// Configuration loading and defaults.
pub mod config;

/// Crate error taxonomy.
pub mod error;

/// Logging macros.
#[macro_use]
pub mod logging;

pub use config::Config;
pub use error::{CacheError, Result};
