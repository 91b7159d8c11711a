//! Block validators.
//!
//! A [`Validator`] stamps a block just before its write lock is released
//! and checks it whenever the block is locked again. The B-tree supplies
//! its own node validator; [`NoopValidator`] is for raw blocks.

use crate::common::{BlockId, Result};

/// Hooks run by the block manager around lock acquisition and release.
pub trait Validator: Send + Sync {
    /// Short name used in log output.
    fn name(&self) -> &'static str;

    /// Called with exclusive access just before a write lock is released.
    fn prepare_for_write(&self, block: BlockId, data: &mut [u8]);

    /// Called after a read or write lock on existing contents is acquired.
    fn check(&self, block: BlockId, data: &[u8]) -> Result<()>;
}

/// Validator that accepts everything and writes nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopValidator;

impl Validator for NoopValidator {
    fn name(&self) -> &'static str {
        "noop"
    }

    fn prepare_for_write(&self, _block: BlockId, _data: &mut [u8]) {}

    fn check(&self, _block: BlockId, _data: &[u8]) -> Result<()> {
        Ok(())
    }
}
