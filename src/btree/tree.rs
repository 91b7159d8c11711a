//! B-tree handle - a transaction manager plus the tree's value type.
//!
//! A `BTree` owns no blocks itself. Every operation takes a root and, for
//! mutations, returns the new root; callers keep track of which roots they
//! hold references to.

use tracing::debug;

use super::node::{Node, NodeKind, NODE_VALIDATOR};
use super::value_type::ValueType;
use crate::common::{BlockId, Result};
use crate::transaction::TransactionManager;

/// Copy-on-write B-tree operations over one transaction manager.
pub struct BTree<'a> {
    pub(super) tm: &'a TransactionManager,
    pub(super) value_type: &'a dyn ValueType,
}

impl<'a> BTree<'a> {
    pub fn new(tm: &'a TransactionManager, value_type: &'a dyn ValueType) -> Self {
        Self { tm, value_type }
    }

    pub fn tm(&self) -> &'a TransactionManager {
        self.tm
    }

    pub fn value_type(&self) -> &'a dyn ValueType {
        self.value_type
    }

    /// Allocate an empty leaf and return it as a new root.
    pub fn empty(&self) -> Result<BlockId> {
        let mut guard = self.tm.new_block(&NODE_VALIDATOR)?;
        Node::init(&mut *guard, NodeKind::Leaf, self.value_type.size());
        Ok(guard.block_id())
    }

    /// Value stored under `key`, if any.
    ///
    /// Read-only: only one block is locked at a time and nothing is
    /// shadowed.
    pub fn lookup(&self, root: BlockId, key: u64) -> Result<Option<Vec<u8>>> {
        let mut block = root;
        loop {
            let guard = self.tm.read_lock(block, &NODE_VALIDATOR)?;
            let node = Node::new(&*guard);

            if node.is_leaf() {
                return Ok(node.find(key).ok().map(|i| node.value(i).to_vec()));
            }
            match node.lower_bound(key) {
                Some(i) => block = node.child(i),
                None => return Ok(None),
            }
        }
    }

    /// Whether `key` is present under `root`.
    pub fn contains(&self, root: BlockId, key: u64) -> Result<bool> {
        Ok(self.lookup(root, key)?.is_some())
    }

    /// Drop this caller's reference to the tree at `root`.
    ///
    /// Blocks still referenced elsewhere (by a snapshot) are only
    /// decremented. A block whose last reference goes has its children
    /// visited in turn, or its leaf values released.
    pub fn delete_tree(&self, root: BlockId) -> Result<()> {
        let mut stack = vec![root];
        let mut freed = 0u64;

        while let Some(block) = stack.pop() {
            if self.tm.is_shared(block)? {
                self.tm.dec(block)?;
                continue;
            }

            {
                let guard = self.tm.read_lock(block, &NODE_VALIDATOR)?;
                let node = Node::new(&*guard);
                for i in 0..node.entry_count() {
                    if node.is_internal() {
                        stack.push(node.child(i));
                    } else {
                        self.value_type.release(node.value(i))?;
                    }
                }
            }
            self.tm.dec(block)?;
            freed += 1;
        }

        debug!(root = %root, freed, "deleted tree");
        Ok(())
    }
}
