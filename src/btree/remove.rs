//! Single-key removal.
//!
//! 1. Lookup: a read-only search rejects a missing key before anything is
//!    shadowed.
//! 2. Descend: shadow root to leaf along the key's path.
//! 3. Delete: `delete_at` the entry, keeping a copy of its value.
//! 4. Unwind: pop the spine bottom-up, rebalancing each underflowed node
//!    against a sibling inside its (already shadowed) parent.
//! 5. Collapse: while the root is an internal node with one child, the
//!    child becomes the root and the old root block is freed.
//! 6. Release the removed value.
//!
//! Steps 2 to 6 run under a journal. If any of them fails, everything they
//! changed is undone before the error is returned.

use tracing::{trace, warn};

use super::node::{Node, NODE_VALIDATOR};
use super::rebalance::RebalanceEngine;
use super::spine::ShadowSpine;
use super::tree::BTree;
use super::value_type::{ValueJournal, ValueType};
use crate::common::{BlockId, Error, Result};

impl<'a> BTree<'a> {
    /// Remove `key` from the tree at `root`, returning the new root.
    ///
    /// The old root stays valid for anyone else holding a reference to it.
    /// On error nothing is changed.
    ///
    /// # Errors
    /// - `Error::KeyNotFound` if `key` is absent
    /// - `Error::OutOfSpace` if a shared node could not be shadowed
    /// - block manager errors (`Locked`, `Checksum`, `Corrupt`) verbatim
    ///
    /// # Panics
    /// Panics if a journal is already open on the transaction manager.
    pub fn remove(&self, root: BlockId, key: u64) -> Result<BlockId> {
        if !self.contains(root, key)? {
            return Err(Error::KeyNotFound(key));
        }

        let journal = self.tm.journal();
        let values = ValueJournal::new(self.value_type);
        match self.remove_journaled(root, key, &values) {
            Ok(new_root) => {
                journal.commit();
                trace!(target: "thinmeta::remove", key, old_root = root.0, new_root = new_root.0, "removed");
                Ok(new_root)
            }
            Err(e) => {
                warn!(root = %root, key, error = %e, "remove aborted, rolling back");
                values.rollback()?;
                journal.rollback()?;
                Err(e)
            }
        }
    }

    fn remove_journaled(&self, root: BlockId, key: u64, values: &dyn ValueType) -> Result<BlockId> {
        let (new_root, value) = self.remove_raw(root, key, values)?;
        let new_root = self.collapse_root(new_root)?;
        values.release(&value)?;
        Ok(new_root)
    }

    /// Delete and rebalance, returning the shadowed root and the removed
    /// value. Every lock taken here is released on return.
    fn remove_raw(&self, root: BlockId, key: u64, values: &dyn ValueType) -> Result<(BlockId, Vec<u8>)> {
        let mut spine = ShadowSpine::new(self.tm, values);
        spine.step_root(root)?;

        loop {
            let index = {
                let node = spine.current();
                if node.is_leaf() {
                    break;
                }
                node.lower_bound(key).ok_or(Error::KeyNotFound(key))?
            };
            spine.step(index)?;
        }

        let value = {
            let mut leaf = spine.current_mut();
            let index = leaf.find(key).map_err(|_| Error::KeyNotFound(key))?;
            let value = leaf.value(index).to_vec();
            leaf.delete_at(index);
            value
        };

        let engine = RebalanceEngine::new(self.tm, values);
        while spine.depth() > 1 {
            let Some((child, Some(index))) = spine.pop() else {
                unreachable!("spine deeper than one level has a parent");
            };
            if RebalanceEngine::is_underflowed(&Node::new(&*child)) {
                let mut parent = spine.current_mut();
                engine.rebalance_child(&mut parent, index, child)?;
            }
        }

        Ok((spine.root(), value))
    }

    /// Shrink the tree while the root is an internal node with one child.
    ///
    /// `root` was shadowed by this remove, so nothing else references it:
    /// its reference to the child passes to the caller and the block is
    /// freed.
    fn collapse_root(&self, mut root: BlockId) -> Result<BlockId> {
        loop {
            let child = {
                let guard = self.tm.read_lock(root, &NODE_VALIDATOR)?;
                let node = Node::new(&*guard);
                if !node.is_internal() || node.entry_count() != 1 {
                    return Ok(root);
                }
                node.child(0)
            };
            self.tm.dec(root)?;
            trace!(target: "thinmeta::rebalance", from = root.0, to = child.0, "collapsed root");
            root = child;
        }
    }
}
