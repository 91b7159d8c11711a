//! Configuration constants for thinmeta.

/// Size of a metadata block in bytes (4KB).
///
/// Every B-tree node occupies exactly one block, so this bounds node
/// capacity together with [`KEY_SIZE`] and the tree's value size.
pub const BLOCK_SIZE: usize = 4096;

/// Width of a B-tree key in bytes (keys are `u64`).
pub const KEY_SIZE: usize = 8;

/// Size of the on-block node header in bytes.
///
/// See [`NodeHeader`](crate::btree::NodeHeader) for the layout.
pub const NODE_HEADER_SIZE: usize = 32;

/// Maximum number of entries a node with the given value size can hold.
///
/// The raw fit is rounded down to a multiple of 3 so that a node split
/// three ways, or two nodes at the low-water mark, always line up evenly.
///
/// # Panics
/// Panics if a single entry does not fit in a block.
pub const fn calc_capacity(value_size: usize) -> usize {
    let elt_size = KEY_SIZE + value_size;
    let total = (BLOCK_SIZE - NODE_HEADER_SIZE) / elt_size;
    assert!(total >= 3, "value size too large for block");
    3 * (total / 3)
}

/// Low-water mark: a non-root node holding fewer entries has underflowed.
///
/// Two underflowed nodes always merge without exceeding `capacity`
/// because `2 * (capacity / 3) <= capacity`.
#[inline]
pub const fn min_entries(capacity: usize) -> usize {
    capacity / 3
}
