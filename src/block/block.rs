//! Metadata block buffer.

use crate::common::config::BLOCK_SIZE;

/// Contents of one metadata block.
///
/// Holds exactly one B-tree node: a header followed by packed keys and
/// values. Blocks are only reachable through the block manager's guards;
/// copies are made on purpose, when a shared node is shadowed or when a
/// journal keeps a block's prior contents, via [`Block::copy_from`].
///
/// # Example
/// ```
/// use thinmeta::block::Block;
///
/// let mut orig = Block::new();
/// orig.as_mut_slice()[0] = 0xFF;
///
/// let mut shadow = Block::new();
/// shadow.copy_from(&orig);
/// assert_eq!(shadow.as_slice(), orig.as_slice());
/// ```
#[repr(align(4096))]
pub struct Block {
    data: [u8; BLOCK_SIZE],
}

impl Block {
    #[inline]
    pub fn new() -> Self {
        Self {
            data: [0u8; BLOCK_SIZE],
        }
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Zero the block, as a freshly allocated one must be.
    pub fn reset(&mut self) {
        self.data.fill(0);
    }

    /// Overwrite this block with the contents of `other`.
    pub fn copy_from(&mut self, other: &Block) {
        self.data.copy_from_slice(&other.data);
    }
}

impl Default for Block {
    fn default() -> Self {
        Self::new()
    }
}

impl AsRef<[u8]> for Block {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl AsMut<[u8]> for Block {
    #[inline]
    fn as_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}
