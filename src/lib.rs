//! thinmeta - Copy-on-write, reference-counted B-tree metadata for thin
//! provisioning.
//!
//! Mapping trees are shared between a volume and its snapshots. Every
//! block carries a reference count; a writer shadows (copies) any shared
//! block before touching it, so older roots stay readable and unchanged.
//! This crate implements the removal side: deleting a key and restoring
//! the tree's occupancy and routing invariants afterwards.
//!
//! # Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                            thinmeta                             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │                   B-tree (btree/)                        │   │
//! │  │   BTree::remove → ShadowSpine → RebalanceEngine          │   │
//! │  │   Node (delete_at, shift) + TreeBuilder + check_tree     │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │           Transaction Layer (transaction/)               │   │
//! │  │        TransactionManager: new_block + shadow_block      │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                 ↓                               ↓               │
//! │  ┌──────────────────────────┐   ┌──────────────────────────┐   │
//! │  │  Space Map (space_map/)  │   │    Blocks (block/)       │   │
//! │  │  ref counts, new_block,  │   │  BlockManager + guards   │   │
//! │  │  low-space threshold     │   │  + Validator + stats     │   │
//! │  └──────────────────────────┘   └──────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//! - [`common`] - Shared primitives (BlockId, Error, config)
//! - [`block`] - In-memory block store with scoped locks
//! - [`space_map`] - Reference-counted block allocation
//! - [`transaction`] - Allocation, shadowing and undo on top of the two
//! - [`btree`] - Nodes, removal and rebalancing
//!
//! # Quick Start
//! ```
//! use thinmeta::btree::{check_tree, BTree, CheckOptions, TreeBuilder, U64Value};
//! use thinmeta::TransactionManager;
//!
//! let tm = TransactionManager::in_memory(64);
//! let tree = BTree::new(&tm, &U64Value);
//! let entries: Vec<(u64, [u8; 8])> = (0..1000u64).map(|k| (k, k.to_le_bytes())).collect();
//! let root = TreeBuilder::new(&tree).build(&entries).unwrap();
//!
//! // Keep the old root alive as a snapshot
//! tm.inc(root).unwrap();
//! let new_root = tree.remove(root, 500).unwrap();
//!
//! assert!(tree.contains(root, 500).unwrap());
//! assert!(!tree.contains(new_root, 500).unwrap());
//! check_tree(&tree, new_root, &CheckOptions::default()).unwrap();
//! ```

pub mod block;
pub mod btree;
pub mod common;
pub mod space_map;
pub mod transaction;

// Re-export commonly used items at crate root for convenience
pub use common::config::BLOCK_SIZE;
pub use common::{BlockId, Error, Result};

pub use block::{Block, BlockManager};
pub use btree::{BTree, ValueType};
pub use space_map::{CoreSpaceMap, SpaceMap};
pub use transaction::TransactionManager;
