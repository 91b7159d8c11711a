//! Block manager statistics tracking.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters tracked by the block manager.
///
/// All fields are atomic so guards can update them from `Drop` without
/// taking a lock. `Ordering::Relaxed` is enough: counters are independent.
///
/// # Example
/// ```
/// use thinmeta::block::BlockManagerStats;
/// use std::sync::atomic::Ordering;
///
/// let stats = BlockManagerStats::new();
/// stats.read_locks.fetch_add(1, Ordering::Relaxed);
/// assert_eq!(stats.snapshot().read_locks, 1);
/// ```
#[derive(Debug)]
pub struct BlockManagerStats {
    /// Shared locks granted.
    pub read_locks: AtomicU64,

    /// Exclusive locks granted on existing contents.
    pub write_locks: AtomicU64,

    /// Exclusive locks granted on freshly zeroed blocks.
    pub zeroed_blocks: AtomicU64,

    /// Lock attempts refused because of a conflicting holder.
    pub lock_conflicts: AtomicU64,

    /// Blocks that failed their validator's check.
    pub validation_failures: AtomicU64,
}

impl BlockManagerStats {
    /// Create a new stats tracker with all counters at zero.
    pub fn new() -> Self {
        Self {
            read_locks: AtomicU64::new(0),
            write_locks: AtomicU64::new(0),
            zeroed_blocks: AtomicU64::new(0),
            lock_conflicts: AtomicU64::new(0),
            validation_failures: AtomicU64::new(0),
        }
    }

    /// Take a point-in-time copy of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            read_locks: self.read_locks.load(Ordering::Relaxed),
            write_locks: self.write_locks.load(Ordering::Relaxed),
            zeroed_blocks: self.zeroed_blocks.load(Ordering::Relaxed),
            lock_conflicts: self.lock_conflicts.load(Ordering::Relaxed),
            validation_failures: self.validation_failures.load(Ordering::Relaxed),
        }
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        self.read_locks.store(0, Ordering::Relaxed);
        self.write_locks.store(0, Ordering::Relaxed);
        self.zeroed_blocks.store(0, Ordering::Relaxed);
        self.lock_conflicts.store(0, Ordering::Relaxed);
        self.validation_failures.store(0, Ordering::Relaxed);
    }
}

impl Default for BlockManagerStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Plain copy of [`BlockManagerStats`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub read_locks: u64,
    pub write_locks: u64,
    pub zeroed_blocks: u64,
    pub lock_conflicts: u64,
    pub validation_failures: u64,
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "read_locks={} write_locks={} zeroed={} conflicts={} validation_failures={}",
            self.read_locks,
            self.write_locks,
            self.zeroed_blocks,
            self.lock_conflicts,
            self.validation_failures
        )
    }
}
