//! B-tree node layout and primitive mutators.
//!
//! A node fills exactly one block:
//! ```text
//! ┌────────────┬──────────────────────────┬──────────────────────────────┐
//! │ NodeHeader │ keys: [u64; capacity]    │ values: [value_size; capacity]│
//! │ (32 bytes) │ (little-endian)          │ (fixed stride)               │
//! └────────────┴──────────────────────────┴──────────────────────────────┘
//! ```
//! Only the first `entry_count` slots of each array are meaningful. Internal
//! nodes store child block addresses as 8-byte values; key `i` of an
//! internal node is the lowest key reachable through child `i`.
//!
//! [`delete_at`](Node::delete_at) and [`shift`] are the only ways entries
//! leave a node during removal. Both move keys and values in lock-step.

use std::ops::Range;

use crate::block::Validator;
use crate::common::config::{calc_capacity, BLOCK_SIZE, KEY_SIZE, NODE_HEADER_SIZE};
use crate::common::{BlockId, Error, Result};

/// Kind of node stored in a block.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Values are child block addresses.
    Internal = 1,
    /// Values are opaque, described by the tree's value type.
    Leaf = 2,
}

impl NodeKind {
    /// Convert from the on-block flags word.
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            1 => Some(NodeKind::Internal),
            2 => Some(NodeKind::Leaf),
            _ => None,
        }
    }
}

/// Metadata stored at the beginning of every node block.
///
/// # Layout (32 bytes, little-endian)
/// ```text
/// Offset  Size  Field
/// ------  ----  -----
/// 0       4     checksum (CRC32 of bytes 4..BLOCK_SIZE)
/// 4       4     flags (NodeKind)
/// 8       8     blocknr (address the node was written to)
/// 16      4     nr_entries
/// 20      4     max_entries (capacity)
/// 24      4     value_size
/// 28      4     padding
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeHeader {
    pub checksum: u32,
    pub flags: u32,
    pub blocknr: u64,
    pub nr_entries: u32,
    pub max_entries: u32,
    pub value_size: u32,
}

impl NodeHeader {
    pub const SIZE: usize = NODE_HEADER_SIZE;

    pub const OFFSET_CHECKSUM: usize = 0;
    pub const OFFSET_FLAGS: usize = 4;
    pub const OFFSET_BLOCKNR: usize = 8;
    pub const OFFSET_NR_ENTRIES: usize = 16;
    pub const OFFSET_MAX_ENTRIES: usize = 20;
    pub const OFFSET_VALUE_SIZE: usize = 24;

    /// Read a header from the beginning of a byte slice.
    ///
    /// # Panics
    /// Panics if `data.len() < NodeHeader::SIZE`.
    pub fn from_bytes(data: &[u8]) -> Self {
        assert!(data.len() >= Self::SIZE, "buffer too small for NodeHeader");

        Self {
            checksum: read_u32(data, Self::OFFSET_CHECKSUM),
            flags: read_u32(data, Self::OFFSET_FLAGS),
            blocknr: read_u64(data, Self::OFFSET_BLOCKNR),
            nr_entries: read_u32(data, Self::OFFSET_NR_ENTRIES),
            max_entries: read_u32(data, Self::OFFSET_MAX_ENTRIES),
            value_size: read_u32(data, Self::OFFSET_VALUE_SIZE),
        }
    }

    /// Write this header to the beginning of a byte slice.
    ///
    /// # Panics
    /// Panics if `data.len() < NodeHeader::SIZE`.
    pub fn write_to(&self, data: &mut [u8]) {
        assert!(data.len() >= Self::SIZE, "buffer too small for NodeHeader");

        write_u32(data, Self::OFFSET_CHECKSUM, self.checksum);
        write_u32(data, Self::OFFSET_FLAGS, self.flags);
        write_u64(data, Self::OFFSET_BLOCKNR, self.blocknr);
        write_u32(data, Self::OFFSET_NR_ENTRIES, self.nr_entries);
        write_u32(data, Self::OFFSET_MAX_ENTRIES, self.max_entries);
        write_u32(data, Self::OFFSET_VALUE_SIZE, self.value_size);
        data[28..Self::SIZE].fill(0);
    }

    /// CRC32 of everything after the checksum field.
    pub fn compute_checksum(block_data: &[u8]) -> u32 {
        crc32fast::hash(&block_data[Self::OFFSET_CHECKSUM + 4..])
    }
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&data[offset..offset + 4]);
    u32::from_le_bytes(raw)
}

fn read_u64(data: &[u8], offset: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&data[offset..offset + 8]);
    u64::from_le_bytes(raw)
}

fn write_u32(data: &mut [u8], offset: usize, value: u32) {
    data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn write_u64(data: &mut [u8], offset: usize, value: u64) {
    data[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

/// Stamps and checks node blocks.
///
/// On write release it records the block's own address and a CRC32 over
/// the node. On lock it rejects blocks whose address, checksum or header
/// geometry is wrong.
#[derive(Debug, Default, Clone, Copy)]
pub struct NodeValidator;

/// Shared instance passed to every lock on a node block.
pub static NODE_VALIDATOR: NodeValidator = NodeValidator;

impl Validator for NodeValidator {
    fn name(&self) -> &'static str {
        "btree_node"
    }

    fn prepare_for_write(&self, block: BlockId, data: &mut [u8]) {
        write_u64(data, NodeHeader::OFFSET_BLOCKNR, block.0);
        let checksum = NodeHeader::compute_checksum(data);
        write_u32(data, NodeHeader::OFFSET_CHECKSUM, checksum);
    }

    fn check(&self, block: BlockId, data: &[u8]) -> Result<()> {
        let header = NodeHeader::from_bytes(data);

        if header.blocknr != block.0 {
            return Err(Error::Corrupt {
                block,
                reason: format!("node claims to live at block {}", header.blocknr),
            });
        }
        if header.checksum != NodeHeader::compute_checksum(data) {
            return Err(Error::Checksum(block));
        }
        if NodeKind::from_u32(header.flags).is_none() {
            return Err(Error::Corrupt {
                block,
                reason: format!("unknown node flags {:#x}", header.flags),
            });
        }

        let elt_size = KEY_SIZE + header.value_size as usize;
        let max = header.max_entries as usize;
        if header.value_size == 0 || NODE_HEADER_SIZE + max * elt_size > BLOCK_SIZE {
            return Err(Error::Corrupt {
                block,
                reason: format!(
                    "{} entries of value size {} do not fit",
                    max, header.value_size
                ),
            });
        }
        if header.nr_entries > header.max_entries {
            return Err(Error::Corrupt {
                block,
                reason: format!("{} entries exceeds capacity {}", header.nr_entries, max),
            });
        }
        Ok(())
    }
}

/// Typed view over the bytes of one node.
///
/// `D` is anything that derefs to the block's bytes: `&Block`,
/// `&mut Block`, or a plain byte buffer in tests. Read accessors need
/// `AsRef<[u8]>`; mutators additionally need `AsMut<[u8]>`.
///
/// Index arguments must be below `entry_count`; out-of-range indexes
/// are contract violations and panic.
pub struct Node<D> {
    data: D,
}

impl<D: AsRef<[u8]>> Node<D> {
    /// View existing node bytes. No validation is performed.
    pub fn new(data: D) -> Self {
        Self { data }
    }

    /// Give back the underlying buffer.
    pub fn into_inner(self) -> D {
        self.data
    }

    #[inline]
    fn bytes(&self) -> &[u8] {
        self.data.as_ref()
    }

    /// Read the full header.
    pub fn header(&self) -> NodeHeader {
        NodeHeader::from_bytes(self.bytes())
    }

    /// Kind of node, or `None` for an uninitialized block.
    pub fn kind(&self) -> Option<NodeKind> {
        NodeKind::from_u32(read_u32(self.bytes(), NodeHeader::OFFSET_FLAGS))
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.kind() == Some(NodeKind::Leaf)
    }

    #[inline]
    pub fn is_internal(&self) -> bool {
        self.kind() == Some(NodeKind::Internal)
    }

    #[inline]
    pub fn entry_count(&self) -> usize {
        read_u32(self.bytes(), NodeHeader::OFFSET_NR_ENTRIES) as usize
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        read_u32(self.bytes(), NodeHeader::OFFSET_MAX_ENTRIES) as usize
    }

    #[inline]
    pub fn value_size(&self) -> usize {
        read_u32(self.bytes(), NodeHeader::OFFSET_VALUE_SIZE) as usize
    }

    #[inline]
    fn key_offset(&self, index: usize) -> usize {
        NODE_HEADER_SIZE + index * KEY_SIZE
    }

    #[inline]
    fn value_offset(&self, index: usize) -> usize {
        NODE_HEADER_SIZE + self.capacity() * KEY_SIZE + index * self.value_size()
    }

    fn key_range(&self, entries: Range<usize>) -> Range<usize> {
        self.key_offset(entries.start)..self.key_offset(entries.end)
    }

    fn value_range(&self, entries: Range<usize>) -> Range<usize> {
        self.value_offset(entries.start)..self.value_offset(entries.end)
    }

    fn check_index(&self, index: usize) {
        let n = self.entry_count();
        assert!(index < n, "node index {} out of range ({} entries)", index, n);
    }

    /// Key at `index`.
    pub fn key(&self, index: usize) -> u64 {
        self.check_index(index);
        read_u64(self.bytes(), self.key_offset(index))
    }

    /// Value bytes at `index`.
    pub fn value(&self, index: usize) -> &[u8] {
        self.check_index(index);
        let range = self.value_range(index..index + 1);
        &self.bytes()[range]
    }

    /// Child address at `index` of an internal node.
    pub fn child(&self, index: usize) -> BlockId {
        BlockId::from_slice(self.value(index))
    }

    /// All live keys, in order.
    pub fn keys(&self) -> impl Iterator<Item = u64> + '_ {
        (0..self.entry_count()).map(move |i| self.key(i))
    }

    /// Index of the last key `<= key`, or `None` if every key is larger.
    ///
    /// This is the routing rule for internal nodes.
    pub fn lower_bound(&self, key: u64) -> Option<usize> {
        let n = self.entry_count();
        let (mut lo, mut hi) = (0usize, n);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.key(mid) <= key {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo.checked_sub(1)
    }

    /// Exact search: `Ok(index)` if present, `Err(insertion point)` if not.
    pub fn find(&self, key: u64) -> std::result::Result<usize, usize> {
        match self.lower_bound(key) {
            Some(i) if self.key(i) == key => Ok(i),
            Some(i) => Err(i + 1),
            None => Err(0),
        }
    }
}

impl<D: AsRef<[u8]> + AsMut<[u8]>> Node<D> {
    /// Format `data` as an empty node of the given kind.
    ///
    /// Capacity is derived from the value size, so every node of a tree
    /// shares it.
    pub fn init(mut data: D, kind: NodeKind, value_size: usize) -> Self {
        let header = NodeHeader {
            checksum: 0,
            flags: kind as u32,
            blocknr: 0,
            nr_entries: 0,
            max_entries: calc_capacity(value_size) as u32,
            value_size: value_size as u32,
        };
        header.write_to(data.as_mut());
        Self { data }
    }

    #[inline]
    fn bytes_mut(&mut self) -> &mut [u8] {
        self.data.as_mut()
    }

    pub fn set_entry_count(&mut self, count: usize) {
        assert!(
            count <= self.capacity(),
            "entry count {} exceeds capacity {}",
            count,
            self.capacity()
        );
        write_u32(self.bytes_mut(), NodeHeader::OFFSET_NR_ENTRIES, count as u32);
    }

    pub fn set_key(&mut self, index: usize, key: u64) {
        self.check_index(index);
        let offset = self.key_offset(index);
        write_u64(self.bytes_mut(), offset, key);
    }

    /// Overwrite the value at `index`.
    ///
    /// # Panics
    /// Panics if `value` is not exactly `value_size` bytes.
    pub fn set_value(&mut self, index: usize, value: &[u8]) {
        self.check_index(index);
        assert_eq!(value.len(), self.value_size(), "value size mismatch");
        let range = self.value_range(index..index + 1);
        self.bytes_mut()[range].copy_from_slice(value);
    }

    /// Point child `index` of an internal node at `block`.
    pub fn set_child(&mut self, index: usize, block: BlockId) {
        self.set_value(index, &block.to_le_bytes());
    }

    /// Move entries `src` to start at `dest` within this node.
    fn move_entries(&mut self, src: Range<usize>, dest: usize) {
        let keys = self.key_range(src.clone());
        let key_dest = self.key_offset(dest);
        let values = self.value_range(src);
        let value_dest = self.value_offset(dest);

        let bytes = self.bytes_mut();
        bytes.copy_within(keys, key_dest);
        bytes.copy_within(values, value_dest);
    }

    /// Copy entries `src` of `other` into this node starting at `dest`.
    fn copy_entries_from<S: AsRef<[u8]>>(&mut self, dest: usize, other: &Node<S>, src: Range<usize>) {
        let len = src.len();
        let key_dest = self.key_range(dest..dest + len);
        let value_dest = self.value_range(dest..dest + len);
        let key_src = other.key_range(src.clone());
        let value_src = other.value_range(src);

        let bytes = self.bytes_mut();
        bytes[key_dest].copy_from_slice(&other.bytes()[key_src]);
        bytes[value_dest].copy_from_slice(&other.bytes()[value_src]);
    }

    /// Insert a key/value pair at `index`, shifting later entries up.
    ///
    /// The caller keeps keys ascending.
    ///
    /// # Panics
    /// Panics if the node is full or `index > entry_count`.
    pub fn insert_at(&mut self, index: usize, key: u64, value: &[u8]) {
        let n = self.entry_count();
        assert!(n < self.capacity(), "insert into full node");
        assert!(index <= n, "insert index {} out of range ({} entries)", index, n);

        self.move_entries(index..n, index + 1);
        self.set_entry_count(n + 1);
        self.set_key(index, key);
        self.set_value(index, value);
    }

    /// Remove the entry at `index`, shifting later entries down.
    ///
    /// # Panics
    /// Panics if the node is empty or `index >= entry_count`.
    pub fn delete_at(&mut self, index: usize) {
        let n = self.entry_count();
        assert!(index < n, "delete index {} out of range ({} entries)", index, n);

        self.move_entries(index + 1..n, index);
        self.set_entry_count(n - 1);
    }
}

/// Move the split point between two adjacent siblings by `count` entries.
///
/// Treating `[left entries, right entries]` as one sorted run:
/// - `count > 0` moves the last `count` entries of `left` to the front
///   of `right`
/// - `count < 0` moves the first `|count|` entries of `right` to the end
///   of `left`
///
/// Entries are relocated, never duplicated or dropped, so value ownership
/// moves with them.
///
/// # Panics
/// Panics if the source side holds fewer than `|count|` entries, if the
/// destination would exceed its capacity, or if the nodes' value sizes
/// differ.
pub fn shift<L, R>(left: &mut Node<L>, right: &mut Node<R>, count: isize)
where
    L: AsRef<[u8]> + AsMut<[u8]>,
    R: AsRef<[u8]> + AsMut<[u8]>,
{
    assert_eq!(
        left.value_size(),
        right.value_size(),
        "shift between nodes of different value size"
    );

    let left_n = left.entry_count();
    let right_n = right.entry_count();
    let moved = count.unsigned_abs();

    if count > 0 {
        assert!(moved <= left_n, "shift of {} from left with {} entries", moved, left_n);
        assert!(right_n + moved <= right.capacity(), "shift overflows right node");

        right.move_entries(0..right_n, moved);
        right.set_entry_count(right_n + moved);
        right.copy_entries_from(0, left, left_n - moved..left_n);
        left.set_entry_count(left_n - moved);
    } else if count < 0 {
        assert!(moved <= right_n, "shift of {} from right with {} entries", moved, right_n);
        assert!(left_n + moved <= left.capacity(), "shift overflows left node");

        left.set_entry_count(left_n + moved);
        left.copy_entries_from(left_n, right, 0..moved);
        right.move_entries(moved..right_n, 0);
        right.set_entry_count(right_n - moved);
    }
}
