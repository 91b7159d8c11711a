//! Block management.
//!
//! The block layer stands in for the block I/O and caching collaborator:
//! it owns every metadata block and hands out scoped locks.
//!
//! # Components
//! - [`Block`] - One 4KB unit of storage
//! - [`BlockManager`] - Block store with non-blocking per-block locks
//! - [`BlockReadGuard`] / [`BlockWriteGuard`] - RAII guards for block access
//! - [`Validator`] - Checks on lock, stamps on write release
//! - [`BlockManagerStats`] - Lock counters

#[allow(clippy::module_inception)]
mod block;
mod block_manager;
mod guard;
mod stats;
mod validator;

pub use block::Block;
pub use block_manager::BlockManager;
pub use guard::{BlockReadGuard, BlockWriteGuard};
pub use stats::{BlockManagerStats, StatsSnapshot};
pub use validator::{NoopValidator, Validator};
