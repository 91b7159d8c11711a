//! Transaction Manager - reference counts plus block locks.

use parking_lot::{Mutex, MutexGuard};
use tracing::debug;

use super::journal::{Journal, UndoEntry};
use crate::block::{Block, BlockManager, BlockReadGuard, BlockWriteGuard, NoopValidator, Validator};
use crate::common::{BlockId, Result};
use crate::space_map::{CoreSpaceMap, SpaceMap};

/// Owns the blocks and their reference counts for one metadata device.
///
/// One mutation is in flight at a time; the space map sits behind a mutex
/// only so the manager can be shared by reference with value-type
/// callbacks that adjust counts of their own. The mutex is never held
/// across a call out of this type.
///
/// # Example
/// ```
/// use thinmeta::block::NoopValidator;
/// use thinmeta::TransactionManager;
///
/// let tm = TransactionManager::in_memory(8);
/// let b = tm.new_block(&NoopValidator).unwrap().block_id();
/// assert_eq!(tm.ref_count(b).unwrap(), 1);
///
/// // Share it, then shadow: the writer gets a private copy.
/// tm.inc(b).unwrap();
/// let (copy, copied) = tm.shadow_block(b, &NoopValidator).unwrap();
/// assert!(copied);
/// assert_ne!(copy.block_id(), b);
/// assert_eq!(tm.ref_count(b).unwrap(), 1);
/// ```
pub struct TransactionManager {
    bm: BlockManager,
    sm: Mutex<Box<dyn SpaceMap>>,
    /// Undo record of the open journal, if any.
    journal: Mutex<Option<Vec<UndoEntry>>>,
}

impl TransactionManager {
    /// Create a transaction manager over an existing block store and map.
    ///
    /// # Panics
    /// Panics if the two disagree on the number of blocks.
    pub fn new(bm: BlockManager, sm: Box<dyn SpaceMap>) -> Self {
        assert_eq!(
            bm.block_count(),
            sm.block_count(),
            "block manager and space map sizes differ"
        );
        Self {
            bm,
            sm: Mutex::new(sm),
            journal: Mutex::new(None),
        }
    }

    /// In-memory block store and core space map of `nr_blocks` blocks.
    pub fn in_memory(nr_blocks: u64) -> Self {
        Self::new(
            BlockManager::new(nr_blocks),
            Box::new(CoreSpaceMap::new(nr_blocks)),
        )
    }

    // ========================================================================
    // Public API: Blocks
    // ========================================================================

    /// Allocate a block and lock it, zeroed, for writing.
    ///
    /// # Errors
    /// - `Error::OutOfSpace` if no block is free
    pub fn new_block<'a>(&'a self, validator: &'a dyn Validator) -> Result<BlockWriteGuard<'a>> {
        let block = self.sm.lock().new_block()?;
        match self.bm.write_lock_zero(block, validator) {
            Ok(guard) => {
                self.record(UndoEntry::Allocated(block));
                Ok(guard)
            }
            Err(e) => {
                self.sm.lock().dec(block)?;
                Err(e)
            }
        }
    }

    /// Make `orig` safe to mutate and lock it for writing.
    ///
    /// If `orig` is referenced more than once, a new block is allocated,
    /// `orig`'s contents are copied into it, and this path's reference to
    /// `orig` is dropped. Returns the write guard and whether a copy was
    /// made. A copy holds new references to everything `orig` points at;
    /// the caller must account for those.
    ///
    /// The allocation happens before any count changes, so running out of
    /// space leaves every count untouched. With a journal open, a block
    /// locked in place has its current contents recorded first.
    pub fn shadow_block<'a>(
        &'a self,
        orig: BlockId,
        validator: &'a dyn Validator,
    ) -> Result<(BlockWriteGuard<'a>, bool)> {
        let shared = self.sm.lock().is_shared(orig)?;
        if !shared {
            let guard = self.bm.write_lock(orig, validator)?;
            if self.journaling() {
                let mut image = Box::new(Block::new());
                image.copy_from(&guard);
                self.record(UndoEntry::Image(orig, image));
            }
            return Ok((guard, false));
        }

        let mut copy = self.new_block(validator)?;
        {
            let src = self.bm.read_lock(orig, validator)?;
            copy.copy_from(&src);
        }
        self.sm.lock().dec(orig)?;
        self.record(UndoEntry::Dec(orig));

        debug!(from = %orig, to = %copy.block_id(), "shadowed shared block");
        Ok((copy, true))
    }

    /// Lock a block for reading.
    pub fn read_lock<'a>(
        &'a self,
        block: BlockId,
        validator: &'a dyn Validator,
    ) -> Result<BlockReadGuard<'a>> {
        self.bm.read_lock(block, validator)
    }

    // ========================================================================
    // Public API: Reference counts
    // ========================================================================

    /// Add a reference to a block (e.g. when taking a snapshot of a root).
    pub fn inc(&self, block: BlockId) -> Result<()> {
        self.sm.lock().inc(block)?;
        self.record(UndoEntry::Inc(block));
        Ok(())
    }

    /// Drop a reference to a block.
    pub fn dec(&self, block: BlockId) -> Result<()> {
        self.sm.lock().dec(block)?;
        self.record(UndoEntry::Dec(block));
        Ok(())
    }

    /// Current reference count of a block.
    pub fn ref_count(&self, block: BlockId) -> Result<u32> {
        self.sm.lock().count(block)
    }

    /// Whether a block is referenced more than once.
    pub fn is_shared(&self, block: BlockId) -> Result<bool> {
        self.sm.lock().is_shared(block)
    }

    /// Number of blocks with no references.
    pub fn free_count(&self) -> u64 {
        self.sm.lock().free_count()
    }

    // ========================================================================
    // Public API: Device
    // ========================================================================

    /// Grow the device by `extra` free blocks.
    pub fn extend(&self, extra: u64) -> Result<()> {
        self.sm.lock().extend(extra)?;
        self.bm.extend(extra);
        Ok(())
    }

    /// Flush the space map.
    pub fn commit(&self) -> Result<()> {
        self.sm.lock().commit()
    }

    /// The underlying block store.
    pub fn block_manager(&self) -> &BlockManager {
        &self.bm
    }

    /// Direct access to the space map.
    ///
    /// Do not hold the returned guard across calls back into this manager.
    /// Changes made through it are not journaled.
    pub fn space_map(&self) -> MutexGuard<'_, Box<dyn SpaceMap>> {
        self.sm.lock()
    }

    // ========================================================================
    // Public API: Journal
    // ========================================================================

    /// Start recording changes so they can be undone as a unit.
    ///
    /// # Panics
    /// Panics if a journal is already open.
    pub fn journal(&self) -> Journal<'_> {
        let mut journal = self.journal.lock();
        assert!(journal.is_none(), "journal already open");
        *journal = Some(Vec::new());
        Journal::new(self)
    }

    fn journaling(&self) -> bool {
        self.journal.lock().is_some()
    }

    fn record(&self, entry: UndoEntry) {
        if let Some(entries) = self.journal.lock().as_mut() {
            entries.push(entry);
        }
    }

    pub(super) fn close_journal(&self) -> Vec<UndoEntry> {
        self.journal.lock().take().unwrap_or_default()
    }

    /// Reverse `entries`, newest first.
    pub(super) fn undo(&self, entries: Vec<UndoEntry>) -> Result<()> {
        let count = entries.len();
        for entry in entries.into_iter().rev() {
            match entry {
                UndoEntry::Allocated(block) | UndoEntry::Inc(block) => self.sm.lock().dec(block)?,
                UndoEntry::Dec(block) => self.sm.lock().inc(block)?,
                UndoEntry::Image(block, image) => {
                    // The image already carries its checksum
                    let mut guard = self.bm.write_lock(block, &NoopValidator)?;
                    guard.copy_from(&image);
                }
            }
        }
        debug!(entries = count, "rolled back journal");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::NoopValidator;
    use crate::common::Error;

    #[test]
    fn test_new_block_is_zeroed_and_counted() {
        let tm = TransactionManager::in_memory(2);
        let guard = tm.new_block(&NoopValidator).unwrap();
        assert!(guard.as_slice().iter().all(|&b| b == 0));
        assert_eq!(tm.ref_count(guard.block_id()).unwrap(), 1);
        assert_eq!(tm.free_count(), 1);
    }

    #[test]
    fn test_new_block_out_of_space() {
        let tm = TransactionManager::in_memory(1);
        let _a = tm.new_block(&NoopValidator).unwrap();
        assert!(matches!(tm.new_block(&NoopValidator), Err(Error::OutOfSpace)));
    }

    #[test]
    fn test_shadow_unshared_reuses_block() {
        let tm = TransactionManager::in_memory(4);
        let b = tm.new_block(&NoopValidator).unwrap().block_id();

        let (guard, copied) = tm.shadow_block(b, &NoopValidator).unwrap();
        assert!(!copied);
        assert_eq!(guard.block_id(), b);
        assert_eq!(tm.free_count(), 3);
    }

    #[test]
    fn test_shadow_shared_copies_contents() {
        let tm = TransactionManager::in_memory(4);
        let b = {
            let mut guard = tm.new_block(&NoopValidator).unwrap();
            guard.as_mut_slice()[10] = 0x5A;
            guard.block_id()
        };
        tm.inc(b).unwrap();

        let (copy, copied) = tm.shadow_block(b, &NoopValidator).unwrap();
        assert!(copied);
        assert_eq!(copy.as_slice()[10], 0x5A);
        assert_eq!(tm.ref_count(b).unwrap(), 1);
        assert_eq!(tm.ref_count(copy.block_id()).unwrap(), 1);
    }

    #[test]
    fn test_shadow_out_of_space_leaves_counts() {
        let tm = TransactionManager::in_memory(1);
        let b = tm.new_block(&NoopValidator).unwrap().block_id();
        tm.inc(b).unwrap();

        assert!(matches!(
            tm.shadow_block(b, &NoopValidator),
            Err(Error::OutOfSpace)
        ));
        assert_eq!(tm.ref_count(b).unwrap(), 2);
        assert_eq!(tm.block_manager().held_locks(), 0);
    }

    #[test]
    fn test_journal_rollback_restores_counts_and_contents() {
        let tm = TransactionManager::in_memory(4);
        let shared = tm.new_block(&NoopValidator).unwrap().block_id();
        let owned = {
            let mut guard = tm.new_block(&NoopValidator).unwrap();
            guard.as_mut_slice()[0] = 1;
            guard.block_id()
        };
        tm.inc(shared).unwrap();

        let journal = tm.journal();
        let (copy, copied) = tm.shadow_block(shared, &NoopValidator).unwrap();
        assert!(copied);
        drop(copy);
        let (mut guard, copied) = tm.shadow_block(owned, &NoopValidator).unwrap();
        assert!(!copied);
        guard.as_mut_slice()[0] = 2;
        drop(guard);
        tm.dec(owned).unwrap();
        assert_eq!(tm.free_count(), 2);

        journal.rollback().unwrap();

        assert_eq!(tm.ref_count(shared).unwrap(), 2);
        assert_eq!(tm.ref_count(owned).unwrap(), 1);
        assert_eq!(tm.free_count(), 2);
        assert_eq!(tm.read_lock(owned, &NoopValidator).unwrap().as_slice()[0], 1);
        assert_eq!(tm.block_manager().held_locks(), 0);
    }

    #[test]
    fn test_journal_commit_keeps_changes() {
        let tm = TransactionManager::in_memory(2);
        let b = tm.new_block(&NoopValidator).unwrap().block_id();

        let journal = tm.journal();
        tm.inc(b).unwrap();
        journal.commit();

        assert_eq!(tm.ref_count(b).unwrap(), 2);
        // closed journals record nothing
        tm.dec(b).unwrap();
        drop(tm.journal());
        assert_eq!(tm.ref_count(b).unwrap(), 1);
    }

    #[test]
    fn test_dropped_journal_rolls_back() {
        let tm = TransactionManager::in_memory(2);
        {
            let _journal = tm.journal();
            let _ = tm.new_block(&NoopValidator).unwrap();
        }
        assert_eq!(tm.free_count(), 2);
    }

    #[test]
    fn test_extend_grows_both_halves() {
        let tm = TransactionManager::in_memory(1);
        let _a = tm.new_block(&NoopValidator).unwrap();
        tm.extend(2).unwrap();

        assert_eq!(tm.block_manager().block_count(), 3);
        assert_eq!(tm.space_map().block_count(), 3);
        assert!(tm.new_block(&NoopValidator).is_ok());
    }
}
