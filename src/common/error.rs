//! Error types for thinmeta.

use thiserror::Error;

use super::BlockId;

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// All recoverable errors in thinmeta.
///
/// Contract violations (bad node indexes, shifting more entries than a node
/// holds, a corrupt free count) are not represented here: they panic.
#[derive(Debug, Error)]
pub enum Error {
    /// Block address is beyond the end of the space map or block manager.
    #[error("{block} out of range (block count {count})")]
    OutOfRange { block: BlockId, count: u64 },

    /// Attempted to decrement a reference count that is already zero.
    #[error("reference count underflow on {0}")]
    Underflow(BlockId),

    /// No block with a zero reference count is available.
    #[error("no free blocks available")]
    OutOfSpace,

    /// An argument or on-block value is not acceptable.
    #[error("invalid: {0}")]
    Invalid(String),

    /// The block is already locked in a conflicting mode.
    ///
    /// Locks never block; the core is single-threaded per transaction, so a
    /// conflict is always a caller bug or a concurrent writer.
    #[error("{0} is already locked")]
    Locked(BlockId),

    /// Checksum stored in the block does not match its contents.
    #[error("checksum mismatch on {0}")]
    Checksum(BlockId),

    /// Block failed validation for a reason other than its checksum.
    #[error("{block} is corrupt: {reason}")]
    Corrupt { block: BlockId, reason: String },

    /// Key to remove is not present in the tree.
    #[error("key {0} not found")]
    KeyNotFound(u64),
}
