//! Block allocator for MetaFS
//!
//! Tracks the simulated block pool as an ordered free list plus a high-water
//! mark. Identifiers are positive and are never reissued above the mark
//! without first being minted, so the free pool and every file's block list
//! together always cover `1..=high_water` with no duplicates.

/// Free-block pool for simulated block allocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockAllocator {
    /// Free block identifiers, handed out from the front
    free: Vec<u64>,
    /// Highest identifier ever issued
    high_water: u64,
}

impl BlockAllocator {
    /// Create a fresh pool holding `1..=total_blocks`
    pub fn new(total_blocks: u64) -> Self {
        Self {
            free: (1..=total_blocks).collect(),
            high_water: total_blocks,
        }
    }

    /// Rebuild a pool from a persisted free list and the blocks in use.
    ///
    /// The high-water mark is not persisted; it is the largest identifier seen
    /// in either set.
    pub fn from_parts(free: Vec<u64>, used: impl IntoIterator<Item = u64>) -> Self {
        let used_max = used.into_iter().max().unwrap_or(0);
        let free_max = free.iter().copied().max().unwrap_or(0);
        Self {
            free,
            high_water: used_max.max(free_max),
        }
    }

    /// Allocate `count` blocks.
    ///
    /// When the pool is short, new identifiers are minted above the high-water
    /// mark. Allocation never fails.
    pub fn allocate(&mut self, count: u64) -> Vec<u64> {
        let count = count as usize;
        if self.free.len() < count {
            let shortfall = (count - self.free.len()) as u64;
            let start = self.high_water + 1;
            self.high_water += shortfall;
            self.free.extend(start..=self.high_water);
            log::debug!(
                "BlockAllocator::allocate: pool short by {} blocks, extended to {}",
                shortfall,
                self.high_water
            );
        }

        let allocated: Vec<u64> = self.free.drain(..count).collect();
        log::trace!(
            "BlockAllocator::allocate: handed out {} blocks, {} free remaining",
            allocated.len(),
            self.free.len()
        );
        allocated
    }

    /// Return blocks to the pool.
    ///
    /// Callers are internal and trusted; identifiers are not validated.
    pub fn release(&mut self, blocks: &[u64]) {
        self.free.extend_from_slice(blocks);
        log::trace!(
            "BlockAllocator::release: returned {} blocks, {} free total",
            blocks.len(),
            self.free.len()
        );
    }

    /// Reset the pool to the contiguous range `1..=total_blocks`
    pub fn reset(&mut self, total_blocks: u64) {
        self.free = (1..=total_blocks).collect();
        self.high_water = total_blocks;
    }

    /// Get the number of free blocks
    pub fn free_count(&self) -> u64 {
        self.free.len() as u64
    }

    /// Free list in hand-out order
    pub fn free_blocks(&self) -> &[u64] {
        &self.free
    }

    /// Highest identifier ever issued
    pub fn high_water(&self) -> u64 {
        self.high_water
    }
}
