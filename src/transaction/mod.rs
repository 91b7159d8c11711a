//! Transaction management.
//!
//! The [`TransactionManager`] pairs the block manager with the space map
//! and provides the copy-on-write primitive the B-tree builds on:
//! [`shadow_block`](TransactionManager::shadow_block). A [`Journal`]
//! records what a mutation changed so a failed one can be undone.

mod journal;
mod transaction_manager;

pub use journal::Journal;
pub use transaction_manager::TransactionManager;
