//! Rebalancing after removal.
//!
//! A non-root node below the low-water mark (`capacity / 3`) is fixed up
//! against one adjacent sibling under the same parent:
//! - if both fit in one node they **merge**: the right sibling's entries
//!   are appended to the left, the right block is released and its entry
//!   is deleted from the parent
//! - otherwise they **redistribute** into balanced halves and the parent's
//!   separator for the right sibling is reset to its new first key
//!
//! The parent may underflow as a result; the caller re-checks it one
//! level up.

use tracing::trace;

use super::node::{shift, Node};
use super::spine::shadow_child;
use super::value_type::ValueType;
use crate::block::{Block, BlockWriteGuard};
use crate::common::config::min_entries;
use crate::common::{BlockId, Result};
use crate::transaction::TransactionManager;

/// What a rebalance did to a pair of siblings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rebalance {
    /// The right sibling was folded into the left and its block released.
    Merged { survivor: BlockId, freed: BlockId },
    /// Entries moved across the boundary; positive counts moved left to
    /// right.
    Redistributed { moved: isize },
}

/// Restores minimum occupancy between sibling nodes.
pub struct RebalanceEngine<'a> {
    tm: &'a TransactionManager,
    value_type: &'a dyn ValueType,
}

impl<'a> RebalanceEngine<'a> {
    pub fn new(tm: &'a TransactionManager, value_type: &'a dyn ValueType) -> Self {
        Self { tm, value_type }
    }

    /// Whether `node` is below the low-water mark.
    pub fn is_underflowed<D: AsRef<[u8]>>(node: &Node<D>) -> bool {
        node.entry_count() < min_entries(node.capacity())
    }

    /// Rebalance children `left_index` and `left_index + 1` of `parent`.
    ///
    /// Both children are shadowed first. `parent` must already be
    /// exclusively owned.
    ///
    /// # Panics
    /// Panics if `left_index + 1` is not a child of `parent`.
    pub fn rebalance(&self, parent: &mut Node<&mut Block>, left_index: usize) -> Result<Rebalance> {
        assert!(
            left_index + 1 < parent.entry_count(),
            "no right sibling for child {}",
            left_index
        );
        let left = shadow_child(self.tm, self.value_type, parent, left_index)?;
        let right = shadow_child(self.tm, self.value_type, parent, left_index + 1)?;
        self.rebalance_pair(parent, left_index, left, right)
    }

    /// Rebalance an already shadowed child against a neighbor.
    ///
    /// The right neighbor is preferred; the last child pairs with its left
    /// neighbor. Returns `None` when `parent` has no other child, which
    /// only happens at a root about to collapse.
    pub fn rebalance_child(
        &self,
        parent: &mut Node<&mut Block>,
        index: usize,
        child: BlockWriteGuard<'a>,
    ) -> Result<Option<Rebalance>> {
        let n = parent.entry_count();
        if n < 2 {
            return Ok(None);
        }

        let outcome = if index + 1 < n {
            let right = shadow_child(self.tm, self.value_type, parent, index + 1)?;
            self.rebalance_pair(parent, index, child, right)?
        } else {
            let left = shadow_child(self.tm, self.value_type, parent, index - 1)?;
            self.rebalance_pair(parent, index - 1, left, child)?
        };
        Ok(Some(outcome))
    }

    fn rebalance_pair(
        &self,
        parent: &mut Node<&mut Block>,
        left_index: usize,
        mut left_guard: BlockWriteGuard<'a>,
        mut right_guard: BlockWriteGuard<'a>,
    ) -> Result<Rebalance> {
        let survivor = left_guard.block_id();
        let freed = right_guard.block_id();
        let mut left = Node::new(&mut *left_guard);
        let mut right = Node::new(&mut *right_guard);

        let (nr_left, nr_right) = (left.entry_count(), right.entry_count());
        let combined = nr_left + nr_right;

        if combined <= left.capacity() {
            shift(&mut left, &mut right, -(nr_right as isize));
            drop(right_guard);
            drop(left_guard);

            self.tm.dec(freed)?;
            parent.delete_at(left_index + 1);

            trace!(
                target: "thinmeta::rebalance",
                survivor = survivor.0,
                freed = freed.0,
                entries = combined,
                "merged siblings"
            );
            return Ok(Rebalance::Merged { survivor, freed });
        }

        let target_left = combined / 2;
        let moved = nr_left as isize - target_left as isize;
        shift(&mut left, &mut right, moved);
        parent.set_key(left_index + 1, right.key(0));

        trace!(
            target: "thinmeta::rebalance",
            left = survivor.0,
            right = freed.0,
            moved,
            left_entries = left.entry_count(),
            right_entries = right.entry_count(),
            "redistributed siblings"
        );
        Ok(Rebalance::Redistributed { moved })
    }
}
