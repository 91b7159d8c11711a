//! Copy-on-write B-tree: node layout, shadowing, removal and rebalancing.

mod builder;
pub mod check;
mod node;
mod rebalance;
mod remove;
mod spine;
mod tree;
mod value_type;

pub use builder::TreeBuilder;
pub use check::{check_tree, CheckOptions, TreeReport};
pub use node::{shift, Node, NodeHeader, NodeKind, NodeValidator, NODE_VALIDATOR};
pub use rebalance::{Rebalance, RebalanceEngine};
pub use spine::ShadowSpine;
pub use tree::BTree;
pub use value_type::{DataBlockValue, U64Value, ValueType};
