//! Block Manager - in-memory block store with per-block locks.
//!
//! The [`BlockManager`] provides:
//! - Shared and exclusive locking of blocks through RAII guards
//! - Zeroed blocks for freshly allocated nodes
//! - Validation on lock, stamping on write release
//! - Lock accounting so callers can assert nothing leaked

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use super::block::Block;
use super::guard::{BlockReadGuard, BlockWriteGuard};
use super::stats::BlockManagerStats;
use super::validator::Validator;
use crate::common::{BlockId, Error, Result};

/// Holds every metadata block in memory.
///
/// # Architecture
/// ```text
/// ┌──────────────────────────────────────────────────────────┐
/// │                      BlockManager                        │
/// │  ┌────────────────────────────────────────────────────┐  │
/// │  │   blocks: RwLock<Vec<Arc<RwLock<Block>>>>          │  │
/// │  │   [Block0] [Block1] [Block2] ...                   │  │
/// │  └────────────────────────────────────────────────────┘  │
/// │  ┌──────────────┐  ┌──────────────────────────────────┐  │
/// │  │ held_locks   │  │ stats: atomic counters           │  │
/// │  └──────────────┘  └──────────────────────────────────┘  │
/// └──────────────────────────────────────────────────────────┘
/// ```
///
/// # Locking
/// Locks never block. A request that conflicts with an existing holder
/// fails with [`Error::Locked`]: a single writer that waited on itself
/// would deadlock, and a concurrent writer is a caller bug.
///
/// Guards own an `Arc` to their block, so the table can grow through
/// [`extend`](Self::extend) while guards are outstanding.
///
/// # Usage
/// ```
/// use thinmeta::block::{BlockManager, NoopValidator};
/// use thinmeta::BlockId;
///
/// let bm = BlockManager::new(4);
/// {
///     let mut guard = bm.write_lock_zero(BlockId::new(0), &NoopValidator).unwrap();
///     guard.as_mut_slice()[0] = 0xAB;
/// }
/// let guard = bm.read_lock(BlockId::new(0), &NoopValidator).unwrap();
/// assert_eq!(guard.as_slice()[0], 0xAB);
/// drop(guard);
/// assert_eq!(bm.held_locks(), 0);
/// ```
pub struct BlockManager {
    /// One lockable slot per block address.
    blocks: RwLock<Vec<Arc<RwLock<Block>>>>,

    /// Number of guards currently alive.
    held_locks: AtomicUsize,

    /// Lock and validation counters.
    stats: BlockManagerStats,
}

impl BlockManager {
    /// Create a block manager holding `nr_blocks` zeroed blocks.
    pub fn new(nr_blocks: u64) -> Self {
        let blocks = (0..nr_blocks)
            .map(|_| Arc::new(RwLock::new(Block::new())))
            .collect();

        Self {
            blocks: RwLock::new(blocks),
            held_locks: AtomicUsize::new(0),
            stats: BlockManagerStats::new(),
        }
    }

    // ========================================================================
    // Public API: Locking
    // ========================================================================

    /// Lock a block for reading (shared access).
    ///
    /// # Errors
    /// - `Error::OutOfRange` if the block does not exist
    /// - `Error::Locked` if the block is write-locked
    /// - Whatever the validator's `check` reports
    pub fn read_lock<'a>(
        &'a self,
        block: BlockId,
        validator: &'a dyn Validator,
    ) -> Result<BlockReadGuard<'a>> {
        let slot = self.slot(block)?;
        let lock = match slot.try_read_arc() {
            Some(lock) => lock,
            None => return Err(self.conflict(block)),
        };

        self.held_locks.fetch_add(1, Ordering::Relaxed);
        self.stats.read_locks.fetch_add(1, Ordering::Relaxed);
        let guard = BlockReadGuard::new(self, block, lock);

        // Guard drops (and releases) if the check fails
        self.validate(validator, block, guard.as_slice())?;
        Ok(guard)
    }

    /// Lock an existing block for writing (exclusive access).
    ///
    /// # Errors
    /// - `Error::OutOfRange` if the block does not exist
    /// - `Error::Locked` if any other guard holds the block
    /// - Whatever the validator's `check` reports
    pub fn write_lock<'a>(
        &'a self,
        block: BlockId,
        validator: &'a dyn Validator,
    ) -> Result<BlockWriteGuard<'a>> {
        let slot = self.slot(block)?;
        let lock = match slot.try_write_arc() {
            Some(lock) => lock,
            None => return Err(self.conflict(block)),
        };

        self.held_locks.fetch_add(1, Ordering::Relaxed);
        self.stats.write_locks.fetch_add(1, Ordering::Relaxed);

        if let Err(e) = self.validate(validator, block, lock.as_slice()) {
            // Release without stamping: the contents were never accepted
            drop(lock);
            self.release_lock();
            return Err(e);
        }

        Ok(BlockWriteGuard::new(self, block, validator, lock))
    }

    /// Lock a block for writing and zero its contents.
    ///
    /// No check runs; the previous contents are discarded.
    pub fn write_lock_zero<'a>(
        &'a self,
        block: BlockId,
        validator: &'a dyn Validator,
    ) -> Result<BlockWriteGuard<'a>> {
        let slot = self.slot(block)?;
        let mut lock = match slot.try_write_arc() {
            Some(lock) => lock,
            None => return Err(self.conflict(block)),
        };

        lock.reset();
        self.held_locks.fetch_add(1, Ordering::Relaxed);
        self.stats.zeroed_blocks.fetch_add(1, Ordering::Relaxed);

        Ok(BlockWriteGuard::new(self, block, validator, lock))
    }

    // ========================================================================
    // Public API: Sizing and info
    // ========================================================================

    /// Number of addressable blocks.
    pub fn block_count(&self) -> u64 {
        self.blocks.read().len() as u64
    }

    /// Append `extra` zeroed blocks.
    pub fn extend(&self, extra: u64) {
        let mut blocks = self.blocks.write();
        blocks.extend((0..extra).map(|_| Arc::new(RwLock::new(Block::new()))));
        debug!(extra, block_count = blocks.len(), "extended block manager");
    }

    /// Number of guards currently alive.
    ///
    /// Zero whenever no operation is in flight; anything else is a leak.
    pub fn held_locks(&self) -> usize {
        self.held_locks.load(Ordering::Relaxed)
    }

    /// Get lock statistics.
    pub fn stats(&self) -> &BlockManagerStats {
        &self.stats
    }

    // ========================================================================
    // Internal: Called by guards on drop
    // ========================================================================

    pub(crate) fn release_lock(&self) {
        let old = self.held_locks.fetch_sub(1, Ordering::Relaxed);
        assert!(old > 0, "block lock count underflow");
    }

    // ========================================================================
    // Internal helpers
    // ========================================================================

    fn slot(&self, block: BlockId) -> Result<Arc<RwLock<Block>>> {
        let blocks = self.blocks.read();
        blocks.get(block.index()).cloned().ok_or(Error::OutOfRange {
            block,
            count: blocks.len() as u64,
        })
    }

    fn conflict(&self, block: BlockId) -> Error {
        self.stats.lock_conflicts.fetch_add(1, Ordering::Relaxed);
        Error::Locked(block)
    }

    fn validate(&self, validator: &dyn Validator, block: BlockId, data: &[u8]) -> Result<()> {
        validator.check(block, data).inspect_err(|e| {
            self.stats.validation_failures.fetch_add(1, Ordering::Relaxed);
            debug!(%block, validator = validator.name(), error = %e, "block failed validation");
        })
    }
}
