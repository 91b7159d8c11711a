//! Bulk loader: sorted entries to a valid tree, bottom-up.
//!
//! Entries are spread evenly over as few nodes as the fill allows, one
//! level at a time, until a single root remains.

use tracing::debug;

use super::node::{Node, NodeKind, NODE_VALIDATOR};
use super::tree::BTree;
use crate::common::config::calc_capacity;
use crate::common::{BlockId, Error, Result};

/// Builds a tree from strictly ascending `(key, value)` pairs.
///
/// # Example
/// ```
/// use thinmeta::btree::{BTree, TreeBuilder, U64Value};
/// use thinmeta::TransactionManager;
///
/// let tm = TransactionManager::in_memory(16);
/// let tree = BTree::new(&tm, &U64Value);
/// let entries: Vec<(u64, [u8; 8])> = (0..100u64).map(|k| (k, k.to_le_bytes())).collect();
///
/// let root = TreeBuilder::new(&tree).with_fill(20, 8).build(&entries).unwrap();
/// assert!(tree.contains(root, 42).unwrap());
/// ```
pub struct TreeBuilder<'t, 'a> {
    tree: &'t BTree<'a>,
    leaf_fill: usize,
    internal_fill: usize,
}

impl<'t, 'a> TreeBuilder<'t, 'a> {
    /// Builder producing full nodes.
    pub fn new(tree: &'t BTree<'a>) -> Self {
        Self {
            tree,
            leaf_fill: calc_capacity(tree.value_type().size()),
            internal_fill: calc_capacity(BlockId::SIZE),
        }
    }

    /// Maximum entries per leaf and per internal node.
    ///
    /// # Panics
    /// Panics unless `1 <= leaf` and `2 <= internal`, both within node
    /// capacity.
    pub fn with_fill(mut self, leaf: usize, internal: usize) -> Self {
        let leaf_capacity = calc_capacity(self.tree.value_type().size());
        let internal_capacity = calc_capacity(BlockId::SIZE);
        assert!(
            (1..=leaf_capacity).contains(&leaf),
            "leaf fill {} outside 1..={}",
            leaf,
            leaf_capacity
        );
        assert!(
            (2..=internal_capacity).contains(&internal),
            "internal fill {} outside 2..={}",
            internal,
            internal_capacity
        );
        self.leaf_fill = leaf;
        self.internal_fill = internal;
        self
    }

    /// Write the tree and return its root.
    ///
    /// An empty input gives an empty leaf root.
    ///
    /// # Errors
    /// - `Error::Invalid` if keys are not strictly ascending or a value has
    ///   the wrong width
    /// - `Error::OutOfSpace` if the device fills up; blocks already written
    ///   stay allocated
    pub fn build<V: AsRef<[u8]>>(&self, entries: &[(u64, V)]) -> Result<BlockId> {
        let value_size = self.tree.value_type().size();
        if let Some(w) = entries.windows(2).find(|w| w[0].0 >= w[1].0) {
            return Err(Error::Invalid(format!(
                "keys not strictly ascending: {} then {}",
                w[0].0, w[1].0
            )));
        }
        if let Some((k, v)) = entries.iter().find(|(_, v)| v.as_ref().len() != value_size) {
            return Err(Error::Invalid(format!(
                "value for key {} is {} bytes, expected {}",
                k,
                v.as_ref().len(),
                value_size
            )));
        }

        if entries.is_empty() {
            return self.tree.empty();
        }

        let mut level = self.write_level(NodeKind::Leaf, value_size, self.leaf_fill, entries)?;
        let mut depth = 1;
        while level.len() > 1 {
            let children: Vec<(u64, [u8; BlockId::SIZE])> =
                level.iter().map(|&(k, b)| (k, b.to_le_bytes())).collect();
            level = self.write_level(NodeKind::Internal, BlockId::SIZE, self.internal_fill, &children)?;
            depth += 1;
        }

        let (_, root) = level[0];
        debug!(root = %root, entries = entries.len(), depth, "built tree");
        Ok(root)
    }

    /// Write one level, returning each node's first key and address.
    fn write_level<V: AsRef<[u8]>>(
        &self,
        kind: NodeKind,
        value_size: usize,
        fill: usize,
        entries: &[(u64, V)],
    ) -> Result<Vec<(u64, BlockId)>> {
        let tm = self.tree.tm();
        let nr_nodes = entries.len().div_ceil(fill);
        let (base, extra) = (entries.len() / nr_nodes, entries.len() % nr_nodes);

        let mut out = Vec::with_capacity(nr_nodes);
        let mut rest = entries;
        for i in 0..nr_nodes {
            let (chunk, tail) = rest.split_at(base + usize::from(i < extra));
            rest = tail;

            let mut guard = tm.new_block(&NODE_VALIDATOR)?;
            let mut node = Node::init(&mut *guard, kind, value_size);
            for (j, (k, v)) in chunk.iter().enumerate() {
                node.insert_at(j, *k, v.as_ref());
            }
            out.push((chunk[0].0, guard.block_id()));
        }
        Ok(out)
    }
}
