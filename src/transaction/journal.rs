//! Undo journal - makes one tree mutation all-or-nothing.
//!
//! While a [`Journal`] is open the transaction manager records every count
//! change it makes and the prior contents of every block it hands out for
//! in-place writing. Rolling back replays the record newest first.

use tracing::{trace, warn};

use super::TransactionManager;
use crate::block::Block;
use crate::common::{BlockId, Result};

/// One recorded change and how to reverse it.
pub(crate) enum UndoEntry {
    /// A block allocated with count 1. Undone with `dec`.
    Allocated(BlockId),
    Inc(BlockId),
    Dec(BlockId),
    /// Contents of a block before it was locked for writing in place.
    Image(BlockId, Box<Block>),
}

/// An open undo journal on a [`TransactionManager`].
///
/// Dropping a journal that was neither committed nor rolled back rolls it
/// back, so a panic or an early `?` cannot leave half a mutation behind.
/// No block locks may be held when the journal rolls back.
///
/// # Example
/// ```
/// use thinmeta::block::NoopValidator;
/// use thinmeta::TransactionManager;
///
/// let tm = TransactionManager::in_memory(4);
/// let b = tm.new_block(&NoopValidator).unwrap().block_id();
///
/// let journal = tm.journal();
/// tm.inc(b).unwrap();
/// let _copy = tm.new_block(&NoopValidator).unwrap().block_id();
/// journal.rollback().unwrap();
///
/// assert_eq!(tm.ref_count(b).unwrap(), 1);
/// assert_eq!(tm.free_count(), 3);
/// ```
#[must_use = "dropping a journal rolls it back"]
pub struct Journal<'a> {
    tm: &'a TransactionManager,
    open: bool,
}

impl<'a> Journal<'a> {
    pub(super) fn new(tm: &'a TransactionManager) -> Self {
        Self { tm, open: true }
    }

    /// Keep every change made since the journal was opened.
    pub fn commit(mut self) {
        self.open = false;
        let entries = self.tm.close_journal();
        trace!(entries = entries.len(), "journal committed");
    }

    /// Undo every change made since the journal was opened.
    ///
    /// # Errors
    /// Returns the first error hit while undoing, typically
    /// `Error::Locked` if a block is still locked by the caller.
    pub fn rollback(mut self) -> Result<()> {
        self.open = false;
        let entries = self.tm.close_journal();
        self.tm.undo(entries)
    }
}

impl Drop for Journal<'_> {
    fn drop(&mut self) {
        if self.open {
            let entries = self.tm.close_journal();
            if let Err(e) = self.tm.undo(entries) {
                warn!(error = %e, "journal rollback failed");
            }
        }
    }
}
