//! Block address type.

use std::fmt;

/// Identifies one block of metadata storage.
///
/// A B-tree node occupies exactly one block. Internal nodes store child
/// addresses as little-endian `u64`s, so the address is a `u64` as well.
///
/// # Example
/// ```
/// use thinmeta::BlockId;
///
/// let b = BlockId::new(42);
/// assert_eq!(b.0, 42);
/// assert_eq!(BlockId::from_le_bytes(b.to_le_bytes()), b);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u64);

impl BlockId {
    /// Width of an encoded address.
    pub const SIZE: usize = 8;

    /// Create a new BlockId.
    #[inline]
    pub fn new(id: u64) -> Self {
        BlockId(id)
    }

    /// Encode as stored inside internal nodes and block-reference values.
    #[inline]
    pub fn to_le_bytes(self) -> [u8; 8] {
        self.0.to_le_bytes()
    }

    /// Decode from the on-block representation.
    #[inline]
    pub fn from_le_bytes(bytes: [u8; 8]) -> Self {
        BlockId(u64::from_le_bytes(bytes))
    }

    /// Decode from the first 8 bytes of a value slot.
    ///
    /// # Panics
    /// Panics if `bytes` is shorter than 8 bytes.
    #[inline]
    pub fn from_slice(bytes: &[u8]) -> Self {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&bytes[..8]);
        Self::from_le_bytes(raw)
    }

    /// Index form, for addressing in-memory tables.
    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Block({})", self.0)
    }
}
