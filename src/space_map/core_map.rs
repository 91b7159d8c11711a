//! In-memory space map.

use tracing::{debug, trace, warn};

use super::threshold::{Threshold, ThresholdCallback};
use super::SpaceMap;
use crate::common::{BlockId, Error, Result};

/// Space map holding one reference count per block in memory.
///
/// Used for the metadata device while it is being bootstrapped and for
/// tests. There is nothing to persist, so `commit` is a no-op and the root
/// is empty.
///
/// # Invariant
/// `nr_free` always equals the number of zero entries in `ref_counts`.
///
/// # Example
/// ```
/// use thinmeta::space_map::{CoreSpaceMap, SpaceMap};
///
/// let mut sm = CoreSpaceMap::new(4);
/// let b = sm.new_block().unwrap();
/// assert_eq!(sm.count(b).unwrap(), 1);
/// assert_eq!(sm.free_count(), 3);
/// ```
#[derive(Debug)]
pub struct CoreSpaceMap {
    ref_counts: Vec<u32>,
    nr_free: u64,
    /// Where the next free-block search starts.
    alloc_hint: usize,
    threshold: Threshold,
}

impl CoreSpaceMap {
    /// Create a map of `nr_blocks` blocks, all free.
    pub fn new(nr_blocks: u64) -> Self {
        Self {
            ref_counts: vec![0; nr_blocks as usize],
            nr_free: nr_blocks,
            alloc_hint: 0,
            threshold: Threshold::new(),
        }
    }

    fn check_index(&self, block: BlockId) -> Result<usize> {
        if block.0 >= self.block_count() {
            return Err(Error::OutOfRange {
                block,
                count: self.block_count(),
            });
        }
        Ok(block.index())
    }

    fn free_count_changed(&mut self) {
        if self.threshold.check(self.nr_free) {
            warn!(free = self.nr_free, "metadata space below threshold");
        }
    }
}

impl SpaceMap for CoreSpaceMap {
    fn block_count(&self) -> u64 {
        self.ref_counts.len() as u64
    }

    fn free_count(&self) -> u64 {
        self.nr_free
    }

    fn count(&self, block: BlockId) -> Result<u32> {
        let i = self.check_index(block)?;
        Ok(self.ref_counts[i])
    }

    fn set_count(&mut self, block: BlockId, count: u32) -> Result<()> {
        let i = self.check_index(block)?;
        let old = self.ref_counts[i];
        self.ref_counts[i] = count;

        match (old, count) {
            (0, 0) => {}
            (0, _) => {
                self.nr_free -= 1;
                self.free_count_changed();
            }
            (_, 0) => {
                self.nr_free += 1;
                self.free_count_changed();
            }
            _ => {}
        }
        Ok(())
    }

    fn inc(&mut self, block: BlockId) -> Result<()> {
        let i = self.check_index(block)?;
        let old = self.ref_counts[i];
        self.ref_counts[i] = old
            .checked_add(1)
            .ok_or_else(|| Error::Invalid(format!("reference count overflow on {}", block)))?;

        if old == 0 {
            self.nr_free -= 1;
            self.free_count_changed();
        }
        Ok(())
    }

    fn dec(&mut self, block: BlockId) -> Result<()> {
        let i = self.check_index(block)?;
        if self.ref_counts[i] == 0 {
            return Err(Error::Underflow(block));
        }

        self.ref_counts[i] -= 1;
        if self.ref_counts[i] == 0 {
            trace!(%block, "block freed");
            self.nr_free += 1;
            self.free_count_changed();
        }
        Ok(())
    }

    fn new_block(&mut self) -> Result<BlockId> {
        let len = self.ref_counts.len();
        let found = (0..len)
            .map(|n| (self.alloc_hint + n) % len)
            .find(|&i| self.ref_counts[i] == 0);

        match found {
            Some(i) => {
                self.ref_counts[i] = 1;
                self.nr_free -= 1;
                self.alloc_hint = (i + 1) % len;
                self.free_count_changed();
                Ok(BlockId::new(i as u64))
            }
            None => {
                // A nonzero free count here means the accounting is broken
                assert_eq!(self.nr_free, 0, "space map free count out of sync");
                Err(Error::OutOfSpace)
            }
        }
    }

    fn extend(&mut self, extra: u64) -> Result<()> {
        let new_len = self
            .block_count()
            .checked_add(extra)
            .filter(|&n| usize::try_from(n).is_ok())
            .ok_or_else(|| Error::Invalid(format!("cannot extend space map by {}", extra)))?;

        self.ref_counts.resize(new_len as usize, 0);
        self.nr_free += extra;
        debug!(extra, block_count = new_len, free = self.nr_free, "extended space map");
        self.free_count_changed();
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        Ok(())
    }

    fn root_size(&self) -> usize {
        0
    }

    fn copy_root(&self, _out: &mut [u8]) -> Result<()> {
        Ok(())
    }

    fn register_threshold_callback(
        &mut self,
        level: u64,
        callback: ThresholdCallback,
    ) -> Result<()> {
        self.threshold.set(level, callback);
        Ok(())
    }
}
