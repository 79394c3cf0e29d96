//! Per-owner advisory locks for reflection runs.
//!
//! A lock is a row in `reflection_locks`: `locked_at IS NULL` means free.
//! Acquisition is a single conditional UPDATE, so two concurrent workers
//! can never both win, and a crashed holder's lock expires after the TTL.

use std::time::Duration;

use chrono::Utc;
use tracing::{debug, instrument};

use bookdav_core::error::{BookdavError, BookdavResult};

use crate::store::{db_err, StorePool};

pub struct ReflectionLockStore {
    pool: StorePool,
    ttl: Duration,
}

impl ReflectionLockStore {
    pub fn new(pool: StorePool, ttl: Duration) -> Self {
        ReflectionLockStore { pool, ttl }
    }

    /// Make sure the owner has a lock row. Safe to call repeatedly.
    pub fn ensure(&self, owner_id: &str) -> BookdavResult<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT OR IGNORE INTO reflection_locks (owner_id, locked_at) VALUES (?1, NULL)",
            [owner_id],
        )
        .map_err(db_err)?;
        Ok(())
    }

    /// Try to take the owner's lock without waiting.
    ///
    /// Fails with [`BookdavError::LockUnavailable`] when another holder
    /// owns it and the hold is younger than the TTL.
    #[instrument(skip(self))]
    pub fn try_acquire(&self, owner_id: &str) -> BookdavResult<()> {
        self.ensure(owner_id)?;

        let now = Utc::now().timestamp();
        let expired_before = now - self.ttl.as_secs() as i64;

        let conn = self.pool.get()?;
        let updated = conn
            .execute(
                "UPDATE reflection_locks
                 SET locked_at = ?1
                 WHERE owner_id = ?2
                   AND (locked_at IS NULL OR locked_at <= ?3)",
                rusqlite::params![now, owner_id, expired_before],
            )
            .map_err(db_err)?;

        if updated == 0 {
            debug!(owner_id, "reflection lock held elsewhere");
            return Err(BookdavError::LockUnavailable(owner_id.to_string()));
        }
        Ok(())
    }

    /// Release the owner's lock. Releasing an unheld lock is harmless.
    pub fn release(&self, owner_id: &str) -> BookdavResult<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "UPDATE reflection_locks SET locked_at = NULL WHERE owner_id = ?1",
            [owner_id],
        )
        .map_err(db_err)?;
        Ok(())
    }
}
