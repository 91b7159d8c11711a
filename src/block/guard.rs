//! RAII guards for block access.
//!
//! These guards provide scoped access to blocks held by the block manager:
//! - [`BlockReadGuard`] - Shared read access (multiple allowed)
//! - [`BlockWriteGuard`] - Exclusive write access (validator stamps on drop)
//!
//! Both guards release their lock when dropped, on every exit path.

use std::ops::{Deref, DerefMut};

use parking_lot::lock_api::{ArcRwLockReadGuard, ArcRwLockWriteGuard};
use parking_lot::RawRwLock;

use super::block::Block;
use super::block_manager::BlockManager;
use super::validator::Validator;
use crate::common::BlockId;

/// Guard for read-only block access.
///
/// Multiple `BlockReadGuard`s can exist for the same block simultaneously.
pub struct BlockReadGuard<'a> {
    /// Reference back to the block manager for lock accounting.
    bm: &'a BlockManager,
    /// Address of the locked block.
    block: BlockId,
    /// Lock guard providing access to block data.
    lock: ArcRwLockReadGuard<RawRwLock, Block>,
}

impl<'a> BlockReadGuard<'a> {
    pub(crate) fn new(
        bm: &'a BlockManager,
        block: BlockId,
        lock: ArcRwLockReadGuard<RawRwLock, Block>,
    ) -> Self {
        Self { bm, block, lock }
    }

    /// Address of the locked block.
    #[inline]
    pub fn block_id(&self) -> BlockId {
        self.block
    }
}

impl Deref for BlockReadGuard<'_> {
    type Target = Block;

    #[inline]
    fn deref(&self) -> &Block {
        &self.lock
    }
}

impl Drop for BlockReadGuard<'_> {
    fn drop(&mut self) {
        self.bm.release_lock();
    }
}

/// Guard for exclusive write access to a block.
///
/// Only one `BlockWriteGuard` can exist for a block at a time. When the
/// guard drops, the validator's `prepare_for_write` runs before the lock
/// is released.
pub struct BlockWriteGuard<'a> {
    bm: &'a BlockManager,
    block: BlockId,
    validator: &'a dyn Validator,
    lock: ArcRwLockWriteGuard<RawRwLock, Block>,
}

impl<'a> BlockWriteGuard<'a> {
    pub(crate) fn new(
        bm: &'a BlockManager,
        block: BlockId,
        validator: &'a dyn Validator,
        lock: ArcRwLockWriteGuard<RawRwLock, Block>,
    ) -> Self {
        Self {
            bm,
            block,
            validator,
            lock,
        }
    }

    /// Address of the locked block.
    #[inline]
    pub fn block_id(&self) -> BlockId {
        self.block
    }
}

impl Deref for BlockWriteGuard<'_> {
    type Target = Block;

    #[inline]
    fn deref(&self) -> &Block {
        &self.lock
    }
}

impl DerefMut for BlockWriteGuard<'_> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Block {
        &mut self.lock
    }
}

impl Drop for BlockWriteGuard<'_> {
    fn drop(&mut self) {
        self.validator
            .prepare_for_write(self.block, self.lock.as_mut_slice());
        self.bm.release_lock();
    }
}
