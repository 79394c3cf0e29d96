//! An owner's availability schedule and the algebra that maintains it.
//!
//! All mutation goes through [`AvailableSchedule::add`] and
//! [`AvailableSchedule::remove`], which re-run the combine/split algebra so
//! stored blocks never overlap in time.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::block::AvailableBlock;
use crate::error::BookdavResult;

/// The ordered set of non-overlapping [`AvailableBlock`]s for one owner.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableSchedule {
    blocks: BTreeSet<AvailableBlock>,
}

impl AvailableSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a schedule from arbitrary blocks, combining adjacent runs.
    pub fn from_blocks<I: IntoIterator<Item = AvailableBlock>>(blocks: I) -> Self {
        let mut schedule = AvailableSchedule::new();
        schedule.blocks = combine(blocks.into_iter().collect());
        schedule
    }

    pub fn blocks(&self) -> impl Iterator<Item = &AvailableBlock> {
        self.blocks.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Earliest start over contained blocks, `None` when empty.
    pub fn schedule_start(&self) -> Option<DateTime<Utc>> {
        self.blocks.iter().map(|b| b.start()).min()
    }

    /// Latest end over contained blocks, `None` when empty.
    pub fn schedule_end(&self) -> Option<DateTime<Utc>> {
        self.blocks.iter().map(|b| b.end()).max()
    }

    /// Add a block, overwriting whatever the schedule previously held in
    /// its interval, then re-combine adjacent runs.
    pub fn add(&mut self, block: AvailableBlock) -> BookdavResult<()> {
        // The incoming block wins over existing coverage with a different
        // limit or location; subtract its interval first.
        let mut blocks = subtract(std::mem::take(&mut self.blocks), &block)?;
        blocks.insert(block);
        self.blocks = combine(blocks);
        Ok(())
    }

    /// Remove the interval covered by `removal` from the schedule.
    ///
    /// A block strictly containing the interval splits into up to two
    /// remainder blocks with the same limit/location; a block fully inside
    /// it is dropped; non-intersecting blocks are untouched.
    pub fn remove(&mut self, removal: &AvailableBlock) -> BookdavResult<()> {
        self.blocks = subtract(std::mem::take(&mut self.blocks), removal)?;
        Ok(())
    }

    /// Blocks intersecting `[start, end)`.
    pub fn blocks_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<AvailableBlock> {
        self.blocks
            .iter()
            .filter(|b| b.overlaps(start, end))
            .cloned()
            .collect()
    }

    /// Locate the sub-block of `duration_minutes` starting at `start`.
    ///
    /// Returns the stored block covering `start` narrowed to
    /// `[start, start + duration]`, clamped to the covering block's end so
    /// the returned block never extends past stored availability. `None`
    /// when `start` is outside all blocks (a block's end boundary is
    /// exclusive and never matches).
    pub fn retrieve_target_block(
        &self,
        start: DateTime<Utc>,
        duration_minutes: u32,
    ) -> Option<AvailableBlock> {
        let covering = self.blocks.iter().find(|b| b.contains(start))?;
        let end = std::cmp::min(
            start + Duration::minutes(i64::from(duration_minutes)),
            covering.end(),
        );
        covering.with_bounds(start, end).ok()
    }

    /// Locate the exact sub-block `[start, end]`; `None` unless the whole
    /// interval lies inside one stored block.
    pub fn retrieve_target_block_exact(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Option<AvailableBlock> {
        if start >= end {
            return None;
        }
        let covering = self.blocks.iter().find(|b| b.contains(start))?;
        if end > covering.end() {
            return None;
        }
        covering.with_bounds(start, end).ok()
    }

    /// Locate the double-length ("maximum preferred duration") sub-block
    /// starting at `start`. Unlike [`Self::retrieve_target_block`] the
    /// doubled interval must fit entirely inside the covering block.
    pub fn retrieve_target_double_length_block(
        &self,
        start: DateTime<Utc>,
        duration_minutes: u32,
    ) -> Option<AvailableBlock> {
        let covering = self.blocks.iter().find(|b| b.contains(start))?;
        let end = start + Duration::minutes(i64::from(duration_minutes) * 2);
        if end > covering.end() {
            return None;
        }
        covering.with_bounds(start, end).ok()
    }

    /// Expand every block into `unit_minutes` sub-blocks, chronologically.
    pub fn expand(&self, unit_minutes: u32) -> BookdavResult<Vec<AvailableBlock>> {
        let mut out = Vec::new();
        for block in &self.blocks {
            out.extend(block.expand(unit_minutes)?);
        }
        Ok(out)
    }
}

/// Merge every maximal run of combinable adjacent blocks into one block.
///
/// Idempotent, and independent of input iteration order (the working set is
/// ordered). Overlapping blocks with matching limit/location also merge,
/// which keeps the result well-formed for any input.
pub fn combine(blocks: BTreeSet<AvailableBlock>) -> BTreeSet<AvailableBlock> {
    let mut out: BTreeSet<AvailableBlock> = BTreeSet::new();
    let mut run: Option<AvailableBlock> = None;

    for block in blocks {
        match run.take() {
            None => run = Some(block),
            Some(current) => {
                let mergeable = current.is_combinable_with(&block)
                    || (current.visitor_limit() == block.visitor_limit()
                        && current.meeting_location() == block.meeting_location()
                        && current.overlaps(block.start(), block.end()));
                if mergeable {
                    let end = std::cmp::max(current.end(), block.end());
                    // Bounds come from valid blocks, so this cannot fail.
                    if let Ok(merged) = current.with_bounds(current.start(), end) {
                        run = Some(merged);
                    } else {
                        out.insert(current);
                        run = Some(block);
                    }
                } else {
                    out.insert(current);
                    run = Some(block);
                }
            }
        }
    }
    if let Some(current) = run {
        out.insert(current);
    }
    out
}

/// Remove `removal`'s interval from every intersecting block.
fn subtract(
    blocks: BTreeSet<AvailableBlock>,
    removal: &AvailableBlock,
) -> BookdavResult<BTreeSet<AvailableBlock>> {
    let mut out = BTreeSet::new();
    for block in blocks {
        if !block.overlaps(removal.start(), removal.end()) {
            out.insert(block);
            continue;
        }
        if removal.start() > block.start() {
            out.insert(block.with_bounds(block.start(), removal.start())?);
        }
        if removal.end() < block.end() {
            out.insert(block.with_bounds(removal.end(), block.end())?);
        }
        // Otherwise the removal covers the block entirely and it is dropped.
    }
    Ok(out)
}
