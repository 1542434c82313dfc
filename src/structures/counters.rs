//! Counter overlay: atomic `(value, deadline)` cells keyed by hash,
//! backing `Incr`/`Decr` without routing through the bucket ring.
//!
//! Counter workloads churn values that would otherwise bloat chunk
//! usage and generate eviction pressure on every increment; storing them
//! as atomic cells in a concurrent map sidesteps the ring entirely.

use std::sync::atomic::{AtomicI64, Ordering};

use dashmap::DashMap;

/// One counter's state: a signed value and an absolute TTL deadline in
/// nanoseconds (`0` = no TTL).
struct CounterCell {
    value: AtomicI64,
    deadline_nanos: AtomicI64,
}

/// Concurrent map from key-hash to counter cell.
#[derive(Default)]
pub struct CounterOverlay {
    cells: DashMap<u64, CounterCell, ahash::RandomState>,
}

impl CounterOverlay {
    /// Create an empty overlay.
    pub fn new() -> Self {
        Self { cells: DashMap::default() }
    }

    /// Add `delta` to the counter for `hash`, creating it at 0 first if
    /// absent, or resetting it to 0 first if its TTL has passed. Returns
    /// the post-update value.
    pub fn apply(&self, hash: u64, delta: i64, now_nanos: i64) -> i64 {
        // `entry` holds the shard's write guard for as long as it's alive,
        // so the expiry check and the add below are atomic with respect
        // to other callers touching this same key.
        let entry = self
            .cells
            .entry(hash)
            .or_insert_with(|| CounterCell { value: AtomicI64::new(0), deadline_nanos: AtomicI64::new(0) });

        let deadline = entry.deadline_nanos.load(Ordering::Relaxed);
        if deadline != 0 && deadline < now_nanos {
            entry.value.store(0, Ordering::Relaxed);
            entry.deadline_nanos.store(0, Ordering::Relaxed);
        }
        entry.value.fetch_add(delta, Ordering::Relaxed) + delta
    }

    /// Read the current value of the counter for `hash`, if present and
    /// unexpired.
    pub fn get(&self, hash: u64, now_nanos: i64) -> Option<i64> {
        let cell = self.cells.get(&hash)?;
        let deadline = cell.deadline_nanos.load(Ordering::Relaxed);
        if deadline != 0 && deadline < now_nanos {
            return None;
        }
        Some(cell.value.load(Ordering::Relaxed))
    }

    /// Set the TTL deadline for an existing counter. A no-op if absent.
    pub fn expire(&self, hash: u64, deadline_nanos: i64) {
        if let Some(cell) = self.cells.get(&hash) {
            cell.deadline_nanos.store(deadline_nanos, Ordering::Relaxed);
        }
    }

    /// Remove the counter for `hash`, if present.
    pub fn remove(&self, hash: u64) {
        self.cells.remove(&hash);
    }

    /// Number of counters currently tracked (expired or not).
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether no counters are tracked.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn sequential_incr_then_decr() {
        let overlay = CounterOverlay::new();
        for i in 1..=10 {
            assert_eq!(overlay.apply(1, 1, 0), i);
        }
        overlay.remove(1);
        for i in 1..=10 {
            assert_eq!(overlay.apply(1, -1, 0), -i);
        }
    }

    #[test]
    fn expiry_resets_to_zero_on_next_apply() {
        let overlay = CounterOverlay::new();
        overlay.apply(1, 5, 0);
        overlay.expire(1, 100);
        assert_eq!(overlay.apply(1, 1, 200), 1); // expired, reset then +1
    }

    #[test]
    fn concurrent_incr_is_monotone() {
        let overlay = Arc::new(CounterOverlay::new());
        let n = 50usize;
        let handles: Vec<_> = (0..n)
            .map(|_| {
                let overlay = overlay.clone();
                thread::spawn(move || {
                    overlay.apply(1, 1, 0);
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(overlay.get(1, 0), Some(n as i64));
    }
}
