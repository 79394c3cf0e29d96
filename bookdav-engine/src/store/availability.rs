//! SQLite-backed availability store.
//!
//! Every mutation loads the owner's schedule, re-runs the combine/split
//! algebra in memory, and rewrites the owner's rows inside one IMMEDIATE
//! transaction, so the no-overlap invariant holds after every write and a
//! failing write leaves no partial mutation. The transaction also
//! serializes concurrent writers for the same owner.

use chrono::{DateTime, Duration, Utc};
use rusqlite::{Transaction, TransactionBehavior};
use tracing::{debug, instrument};

use bookdav_core::block::AvailableBlock;
use bookdav_core::error::BookdavResult;
use bookdav_core::range::DateRange;
use bookdav_core::schedule::AvailableSchedule;

use crate::store::{db_err, StorePool};

/// Persistence for owners' available blocks.
pub struct AvailabilityStore {
    pool: StorePool,
}

impl AvailabilityStore {
    pub fn new(pool: StorePool) -> Self {
        AvailabilityStore { pool }
    }

    /// Add blocks to the owner's schedule.
    #[instrument(skip(self, blocks), fields(count = blocks.len()))]
    pub fn add_to_schedule(
        &self,
        owner_id: &str,
        blocks: &[AvailableBlock],
    ) -> BookdavResult<AvailableSchedule> {
        self.mutate(owner_id, |schedule| {
            for block in blocks {
                schedule.add(block.clone())?;
            }
            Ok(())
        })
    }

    /// Remove the intervals covered by `blocks` from the owner's schedule.
    #[instrument(skip(self, blocks), fields(count = blocks.len()))]
    pub fn remove_from_schedule(
        &self,
        owner_id: &str,
        blocks: &[AvailableBlock],
    ) -> BookdavResult<AvailableSchedule> {
        self.mutate(owner_id, |schedule| {
            for block in blocks {
                schedule.remove(block)?;
            }
            Ok(())
        })
    }

    /// Drop every block the owner has published.
    #[instrument(skip(self))]
    pub fn clear_all_blocks(&self, owner_id: &str) -> BookdavResult<()> {
        let conn = self.pool.get()?;
        let deleted = conn
            .execute(
                "DELETE FROM available_blocks WHERE owner_id = ?1",
                [owner_id],
            )
            .map_err(db_err)?;
        debug!(owner_id, deleted, "cleared availability schedule");
        Ok(())
    }

    /// The owner's full schedule.
    pub fn retrieve(&self, owner_id: &str) -> BookdavResult<AvailableSchedule> {
        let conn = self.pool.get()?;
        let mut stmt = conn
            .prepare(
                "SELECT start_ts, end_ts, visitor_limit, meeting_location
                 FROM available_blocks
                 WHERE owner_id = ?1
                 ORDER BY start_ts ASC",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map([owner_id], row_to_block)
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;

        let mut blocks = Vec::with_capacity(rows.len());
        for row in rows {
            blocks.push(row?);
        }
        Ok(AvailableSchedule::from_blocks(blocks))
    }

    /// The owner's blocks intersecting `range`.
    pub fn retrieve_in_range(
        &self,
        owner_id: &str,
        range: &DateRange,
    ) -> BookdavResult<AvailableSchedule> {
        let schedule = self.retrieve(owner_id)?;
        Ok(AvailableSchedule::from_blocks(
            schedule.blocks_in_range(range.start, range.end),
        ))
    }

    /// The owner's blocks for the week starting at `week_start`.
    pub fn retrieve_weekly_schedule(
        &self,
        owner_id: &str,
        week_start: DateTime<Utc>,
    ) -> BookdavResult<AvailableSchedule> {
        let range = DateRange::new(week_start, week_start + Duration::weeks(1))?;
        self.retrieve_in_range(owner_id, &range)
    }

    /// Locate the stored sub-block of `duration_minutes` starting at
    /// `start`. `None` when `start` is outside all stored blocks.
    pub fn retrieve_target_block(
        &self,
        owner_id: &str,
        start: DateTime<Utc>,
        duration_minutes: u32,
    ) -> BookdavResult<Option<AvailableBlock>> {
        Ok(self
            .retrieve(owner_id)?
            .retrieve_target_block(start, duration_minutes))
    }

    /// Locate the exact stored sub-block `[start, end]`.
    pub fn retrieve_target_block_exact(
        &self,
        owner_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> BookdavResult<Option<AvailableBlock>> {
        Ok(self
            .retrieve(owner_id)?
            .retrieve_target_block_exact(start, end))
    }

    /// Locate the double-length stored sub-block starting at `start`.
    pub fn retrieve_target_double_length_block(
        &self,
        owner_id: &str,
        start: DateTime<Utc>,
        duration_minutes: u32,
    ) -> BookdavResult<Option<AvailableBlock>> {
        Ok(self
            .retrieve(owner_id)?
            .retrieve_target_double_length_block(start, duration_minutes))
    }

    /// Load, mutate, and rewrite the owner's schedule atomically.
    fn mutate(
        &self,
        owner_id: &str,
        apply: impl FnOnce(&mut AvailableSchedule) -> BookdavResult<()>,
    ) -> BookdavResult<AvailableSchedule> {
        let mut conn = self.pool.get()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db_err)?;

        let mut schedule = load_schedule(&tx, owner_id)?;
        apply(&mut schedule)?;

        tx.execute(
            "DELETE FROM available_blocks WHERE owner_id = ?1",
            [owner_id],
        )
        .map_err(db_err)?;
        {
            let mut insert = tx
                .prepare(
                    "INSERT INTO available_blocks
                        (owner_id, start_ts, end_ts, visitor_limit, meeting_location)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )
                .map_err(db_err)?;
            for block in schedule.blocks() {
                insert
                    .execute(rusqlite::params![
                        owner_id,
                        block.start().timestamp(),
                        block.end().timestamp(),
                        block.visitor_limit(),
                        block.meeting_location(),
                    ])
                    .map_err(db_err)?;
            }
        }
        tx.commit().map_err(db_err)?;

        debug!(owner_id, blocks = schedule.len(), "schedule rewritten");
        Ok(schedule)
    }
}

fn load_schedule(tx: &Transaction<'_>, owner_id: &str) -> BookdavResult<AvailableSchedule> {
    let mut stmt = tx
        .prepare(
            "SELECT start_ts, end_ts, visitor_limit, meeting_location
             FROM available_blocks
             WHERE owner_id = ?1
             ORDER BY start_ts ASC",
        )
        .map_err(db_err)?;
    let rows = stmt
        .query_map([owner_id], row_to_block)
        .map_err(db_err)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(db_err)?;

    let mut blocks = Vec::with_capacity(rows.len());
    for row in rows {
        blocks.push(row?);
    }
    Ok(AvailableSchedule::from_blocks(blocks))
}

type BlockRow = BookdavResult<AvailableBlock>;

fn row_to_block(row: &rusqlite::Row<'_>) -> rusqlite::Result<BlockRow> {
    let start_ts: i64 = row.get(0)?;
    let end_ts: i64 = row.get(1)?;
    let visitor_limit: u32 = row.get(2)?;
    let meeting_location: Option<String> = row.get(3)?;

    let start = DateTime::<Utc>::from_timestamp(start_ts, 0).unwrap_or_default();
    let end = DateTime::<Utc>::from_timestamp(end_ts, 0).unwrap_or_default();
    Ok(AvailableBlock::new(start, end, visitor_limit, meeting_location))
}
