//! Reference-counted block allocation.
//!
//! A space map records, for every block, how many structural references
//! exist to it across all tree roots. Counts drive two decisions:
//! - a block with count > 1 is shared and must be shadowed before mutation
//! - a block whose count drops to 0 is free and may be handed out again
//!
//! # Components
//! - [`SpaceMap`] - The allocator interface
//! - [`CoreSpaceMap`] - In-memory implementation
//! - [`Threshold`] - Low free-space notification

mod core_map;
mod threshold;

pub use core_map::CoreSpaceMap;
pub use threshold::{Threshold, ThresholdCallback};

use crate::common::{BlockId, Result};

/// Reference-counted block allocator.
///
/// Every operation taking a block fails with `Error::OutOfRange` when the
/// block is at or beyond [`block_count`](Self::block_count).
pub trait SpaceMap: Send {
    /// Total number of blocks tracked.
    fn block_count(&self) -> u64;

    /// Number of blocks whose reference count is zero.
    fn free_count(&self) -> u64;

    /// Reference count of a block.
    fn count(&self, block: BlockId) -> Result<u32>;

    /// Whether more than one reference to the block exists.
    fn is_shared(&self, block: BlockId) -> Result<bool> {
        Ok(self.count(block)? > 1)
    }

    /// Overwrite a block's reference count.
    fn set_count(&mut self, block: BlockId, count: u32) -> Result<()>;

    /// Add one reference.
    fn inc(&mut self, block: BlockId) -> Result<()>;

    /// Drop one reference.
    ///
    /// # Errors
    /// `Error::Underflow` if the count is already zero.
    fn dec(&mut self, block: BlockId) -> Result<()>;

    /// Claim a free block, setting its count to 1.
    ///
    /// # Errors
    /// `Error::OutOfSpace` if every block is in use.
    fn new_block(&mut self) -> Result<BlockId>;

    /// Append `extra` blocks, all free.
    fn extend(&mut self, extra: u64) -> Result<()>;

    /// Flush pending state.
    fn commit(&mut self) -> Result<()>;

    /// Bytes needed by [`copy_root`](Self::copy_root).
    fn root_size(&self) -> usize;

    /// Serialize the map's root into `out` for a persisted superblock.
    fn copy_root(&self, out: &mut [u8]) -> Result<()>;

    /// Ask to be told when the free count drops to `level` or below.
    fn register_threshold_callback(
        &mut self,
        level: u64,
        callback: ThresholdCallback,
    ) -> Result<()>;
}
