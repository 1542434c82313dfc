//! Logging macros used throughout the cache engine.
//!
//! Thin wrappers over `tracing` so call sites read as plain log statements
//! while staying consistent with the rest of the crate's instrumentation
//! (pool growth, generation rollover, fatal pool exhaustion).

/// Debug-level logging - pool growth, sweep bookkeeping.
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        tracing::debug!($($arg)*);
    };
}

/// Info-level logging - config resolution, one-time setup.
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        tracing::info!($($arg)*);
    };
}

/// Warn-level logging - caller errors (`InvalidKey`, `TooBigKey`).
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        tracing::warn!($($arg)*);
    };
}

/// Error-level logging - conditions immediately preceding a fatal abort.
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        tracing::error!($($arg)*);
    };
}

/// Trace-level logging - per-generation rollover detail.
#[macro_export]
macro_rules! log_trace {
    ($($arg:tt)*) => {
        tracing::trace!($($arg)*);
    };
}
