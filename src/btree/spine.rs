//! Shadow spine - the write-locked path from root to the current node.
//!
//! Mutating a tree whose subtrees may be shared with other roots
//! (snapshots) is only safe on blocks this path owns outright. The spine
//! walks down from the root, shadowing each node as it goes:
//! - an unshared block is locked for writing in place
//! - a shared block is copied to a fresh block; the copy takes new
//!   references to everything the original points at, and the parent
//!   (already owned, since shadowing proceeds root first) is rewritten to
//!   point at the copy
//!
//! Every level stays write-locked until it is popped or the spine is
//! dropped. Dropping releases whatever is still held, so an early return
//! through `?` can never leak a lock.

use tracing::trace;

use super::node::{Node, NODE_VALIDATOR};
use super::value_type::ValueType;
use crate::block::{Block, BlockWriteGuard};
use crate::common::{BlockId, Result};
use crate::transaction::TransactionManager;

/// Root-to-node path of shadowed, write-locked nodes.
pub struct ShadowSpine<'a> {
    tm: &'a TransactionManager,
    value_type: &'a dyn ValueType,
    /// Locked nodes, root first.
    nodes: Vec<BlockWriteGuard<'a>>,
    /// `path[i]` is the index of `nodes[i + 1]` within `nodes[i]`.
    path: Vec<usize>,
}

impl<'a> ShadowSpine<'a> {
    pub fn new(tm: &'a TransactionManager, value_type: &'a dyn ValueType) -> Self {
        Self {
            tm,
            value_type,
            nodes: Vec::new(),
            path: Vec::new(),
        }
    }

    /// Shadow the root. Must be the first step.
    ///
    /// # Panics
    /// Panics if the spine already holds nodes.
    pub fn step_root(&mut self, root: BlockId) -> Result<()> {
        assert!(self.nodes.is_empty(), "spine already has a root");
        let guard = shadow(self.tm, self.value_type, root)?;
        self.nodes.push(guard);
        Ok(())
    }

    /// Descend into child `index` of the current node, shadowing it.
    ///
    /// If the child had to be copied, the current node's pointer is
    /// rewritten to the copy before the child is pushed.
    ///
    /// # Panics
    /// Panics if the spine is empty or the current node is a leaf.
    pub fn step(&mut self, index: usize) -> Result<()> {
        let (tm, value_type) = (self.tm, self.value_type);
        let child = {
            let mut parent = self.current_mut();
            assert!(parent.is_internal(), "cannot step below a leaf");
            shadow_child(tm, value_type, &mut parent, index)?
        };
        self.nodes.push(child);
        self.path.push(index);
        Ok(())
    }

    /// Number of levels held.
    pub fn depth(&self) -> usize {
        self.nodes.len()
    }

    /// Address of the (shadowed) root.
    ///
    /// # Panics
    /// Panics if the spine is empty.
    pub fn root(&self) -> BlockId {
        self.nodes.first().expect("empty spine").block_id()
    }

    /// Address of the deepest node held.
    ///
    /// # Panics
    /// Panics if the spine is empty.
    pub fn current_block(&self) -> BlockId {
        self.nodes.last().expect("empty spine").block_id()
    }

    /// Read view of the deepest node held.
    ///
    /// # Panics
    /// Panics if the spine is empty.
    pub fn current(&self) -> Node<&Block> {
        Node::new(&**self.nodes.last().expect("empty spine"))
    }

    /// Write view of the deepest node held.
    ///
    /// # Panics
    /// Panics if the spine is empty.
    pub fn current_mut(&mut self) -> Node<&mut Block> {
        Node::new(&mut **self.nodes.last_mut().expect("empty spine"))
    }

    /// Release the deepest node, returning its guard and its index in the
    /// parent (`None` for the root).
    pub fn pop(&mut self) -> Option<(BlockWriteGuard<'a>, Option<usize>)> {
        let guard = self.nodes.pop()?;
        let index = if self.nodes.is_empty() {
            None
        } else {
            self.path.pop()
        };
        Some((guard, index))
    }
}

/// Shadow child `index` of `parent`, repointing `parent` at the result.
///
/// `parent` must already be exclusively owned.
pub(crate) fn shadow_child<'a>(
    tm: &'a TransactionManager,
    value_type: &'a dyn ValueType,
    parent: &mut Node<&mut Block>,
    index: usize,
) -> Result<BlockWriteGuard<'a>> {
    let orig = parent.child(index);
    let guard = shadow(tm, value_type, orig)?;
    if guard.block_id() != orig {
        parent.set_child(index, guard.block_id());
    }
    Ok(guard)
}

/// Shadow one block, taking references on behalf of a fresh copy.
fn shadow<'a>(
    tm: &'a TransactionManager,
    value_type: &'a dyn ValueType,
    block: BlockId,
) -> Result<BlockWriteGuard<'a>> {
    let (guard, copied) = tm.shadow_block(block, &NODE_VALIDATOR)?;
    if copied {
        inc_children(tm, value_type, &Node::new(&*guard))?;
        trace!(from = %block, to = %guard.block_id(), "copied shared node");
    }
    Ok(guard)
}

/// Account for a node copy now holding everything the node points at.
pub(crate) fn inc_children(
    tm: &TransactionManager,
    value_type: &dyn ValueType,
    node: &Node<&Block>,
) -> Result<()> {
    for i in 0..node.entry_count() {
        if node.is_internal() {
            tm.inc(node.child(i))?;
        } else {
            value_type.duplicate(node.value(i))?;
        }
    }
    Ok(())
}
