//! Value types stored in B-tree leaves.
//!
//! A tree's leaves hold fixed-size opaque values. When a value is itself a
//! reference to something reference-counted (a data block, a nested tree),
//! the tree must tell its owner whenever a reference is created or dropped:
//! - `duplicate` when a shadow copy makes a second leaf hold the value
//! - `release` when the tree discards the value for good
//!
//! Relocating a value between nodes (`shift`) is neither: ownership just
//! moves with it.

use parking_lot::Mutex;

use crate::common::{BlockId, Result};
use crate::space_map::SpaceMap;

/// Capability interface describing one kind of leaf value.
pub trait ValueType: Send + Sync {
    /// Width of every value in bytes.
    fn size(&self) -> usize;

    /// A new reference to `value` now exists.
    fn duplicate(&self, _value: &[u8]) -> Result<()> {
        Ok(())
    }

    /// A reference to `value` has been dropped.
    fn release(&self, _value: &[u8]) -> Result<()> {
        Ok(())
    }

    /// Whether two values are equivalent.
    fn equal(&self, a: &[u8], b: &[u8]) -> bool {
        a == b
    }
}

/// Plain little-endian `u64` values with no ownership semantics.
#[derive(Debug, Default, Clone, Copy)]
pub struct U64Value;

impl ValueType for U64Value {
    fn size(&self) -> usize {
        8
    }
}

/// Values that are addresses of blocks counted in another space map.
///
/// This is the shape of a thin volume's mapping tree: each leaf value is a
/// data block, and the data device's space map must see one reference per
/// leaf that holds it.
pub struct DataBlockValue<'a, S: SpaceMap> {
    space_map: &'a Mutex<S>,
}

impl<'a, S: SpaceMap> DataBlockValue<'a, S> {
    pub fn new(space_map: &'a Mutex<S>) -> Self {
        Self { space_map }
    }
}

impl<S: SpaceMap> ValueType for DataBlockValue<'_, S> {
    fn size(&self) -> usize {
        8
    }

    fn duplicate(&self, value: &[u8]) -> Result<()> {
        self.space_map.lock().inc(BlockId::from_slice(value))
    }

    fn release(&self, value: &[u8]) -> Result<()> {
        self.space_map.lock().dec(BlockId::from_slice(value))
    }
}

/// Reference change made through a [`ValueJournal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueChange {
    Duplicated,
    Released,
}

/// Forwards to another value type and remembers each reference change, so
/// a failed mutation can give them back.
pub(crate) struct ValueJournal<'a> {
    inner: &'a dyn ValueType,
    changes: Mutex<Vec<(ValueChange, Vec<u8>)>>,
}

impl<'a> ValueJournal<'a> {
    pub(crate) fn new(inner: &'a dyn ValueType) -> Self {
        Self {
            inner,
            changes: Mutex::new(Vec::new()),
        }
    }

    /// Reverse every recorded change, newest first.
    pub(crate) fn rollback(self) -> Result<()> {
        for (change, value) in self.changes.into_inner().into_iter().rev() {
            match change {
                ValueChange::Duplicated => self.inner.release(&value)?,
                ValueChange::Released => self.inner.duplicate(&value)?,
            }
        }
        Ok(())
    }
}

impl ValueType for ValueJournal<'_> {
    fn size(&self) -> usize {
        self.inner.size()
    }

    fn duplicate(&self, value: &[u8]) -> Result<()> {
        self.inner.duplicate(value)?;
        self.changes.lock().push((ValueChange::Duplicated, value.to_vec()));
        Ok(())
    }

    fn release(&self, value: &[u8]) -> Result<()> {
        self.inner.release(value)?;
        self.changes.lock().push((ValueChange::Released, value.to_vec()));
        Ok(())
    }

    fn equal(&self, a: &[u8], b: &[u8]) -> bool {
        self.inner.equal(a, b)
    }
}
