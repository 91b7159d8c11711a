//! Read-only structural verifier.
//!
//! Walks every node reachable from a root and reports the first violation
//! as `Error::Corrupt`. Only one block is read-locked at a time.

use std::collections::HashSet;

use super::node::{Node, NODE_VALIDATOR};
use super::tree::BTree;
use crate::common::config::{calc_capacity, min_entries};
use crate::common::{BlockId, Error, Result};

/// Which optional checks to run.
#[derive(Debug, Clone, Copy, Default)]
pub struct CheckOptions {
    /// Require every non-root node to hold at least `capacity / 3`
    /// entries.
    pub min_occupancy: bool,
}

/// What a successful check saw.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeReport {
    /// Entries across all leaves.
    pub entries: u64,
    /// Blocks reachable from the root.
    pub blocks: u64,
    /// Levels, counting the root as 1.
    pub depth: usize,
    pub leaves: u64,
    pub internals: u64,
}

/// A node still to visit, with the key range its parent routes to it.
struct Pending {
    block: BlockId,
    level: usize,
    /// Inclusive.
    lo: Option<u64>,
    /// Exclusive.
    hi: Option<u64>,
}

/// Verify the tree at `root`.
///
/// Checked for every node: kind and geometry, strictly ascending keys
/// within the range the parent routes to it, a nonzero reference count,
/// and that no block is reachable twice. Leaves must all sit at the same
/// depth. Internal nodes other than the root may not be empty; an
/// internal root needs at least two children.
///
/// # Errors
/// - `Error::Corrupt` naming the first offending block
/// - block manager errors from locking a node
pub fn check_tree(tree: &BTree<'_>, root: BlockId, options: &CheckOptions) -> Result<TreeReport> {
    let tm = tree.tm();
    let leaf_value_size = tree.value_type().size();

    let mut report = TreeReport::default();
    let mut leaf_level = None;
    let mut seen = HashSet::new();
    let mut stack = vec![Pending {
        block: root,
        level: 1,
        lo: None,
        hi: None,
    }];

    while let Some(Pending { block, level, lo, hi }) = stack.pop() {
        let corrupt = |reason: String| Error::Corrupt { block, reason };

        if !seen.insert(block) {
            return Err(corrupt("reachable more than once".into()));
        }
        if tm.ref_count(block)? == 0 {
            return Err(corrupt("reachable but unreferenced".into()));
        }

        let guard = tm.read_lock(block, &NODE_VALIDATOR)?;
        let node = Node::new(&*guard);
        let n = node.entry_count();
        let is_root = level == 1;

        let expected_value_size = if node.is_leaf() {
            leaf_value_size
        } else {
            BlockId::SIZE
        };
        if node.value_size() != expected_value_size {
            return Err(corrupt(format!(
                "value size {}, expected {}",
                node.value_size(),
                expected_value_size
            )));
        }
        if node.capacity() != calc_capacity(expected_value_size) {
            return Err(corrupt(format!("capacity {}", node.capacity())));
        }

        let mut prev = None;
        for key in node.keys() {
            if prev.is_some_and(|p| p >= key) {
                return Err(corrupt(format!("key {} out of order", key)));
            }
            if lo.is_some_and(|lo| key < lo) || hi.is_some_and(|hi| key >= hi) {
                return Err(corrupt(format!("key {} outside parent's range", key)));
            }
            prev = Some(key);
        }

        if !is_root {
            if n == 0 {
                return Err(corrupt("empty non-root node".into()));
            }
            if options.min_occupancy && n < min_entries(node.capacity()) {
                return Err(corrupt(format!("underfull: {} entries", n)));
            }
        }

        if node.is_leaf() {
            match leaf_level {
                None => leaf_level = Some(level),
                Some(l) if l != level => {
                    return Err(corrupt(format!("leaf at depth {}, others at {}", level, l)));
                }
                Some(_) => {}
            }
            report.leaves += 1;
            report.entries += n as u64;
        } else {
            if is_root && n < 2 {
                return Err(corrupt(format!("internal root with {} children", n)));
            }
            for i in 0..n {
                let child_hi = if i + 1 < n { Some(node.key(i + 1)) } else { hi };
                stack.push(Pending {
                    block: node.child(i),
                    level: level + 1,
                    lo: Some(node.key(i)),
                    hi: child_hi,
                });
            }
            report.internals += 1;
        }
        report.blocks += 1;
    }

    report.depth = leaf_level.unwrap_or(1);
    Ok(report)
}
