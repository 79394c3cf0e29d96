//! SQLite connection pool and schema bootstrap.

use std::path::Path;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use tracing::debug;

use bookdav_core::error::BookdavResult;

use crate::store::db_err;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS available_blocks (
    owner_id TEXT NOT NULL,
    start_ts INTEGER NOT NULL,
    end_ts INTEGER NOT NULL,
    visitor_limit INTEGER NOT NULL,
    meeting_location TEXT
);
CREATE INDEX IF NOT EXISTS idx_available_blocks_owner
    ON available_blocks(owner_id, start_ts);

CREATE TABLE IF NOT EXISTS reflection_locks (
    owner_id TEXT PRIMARY KEY,
    locked_at INTEGER
);
";

/// Shared connection pool over the engine database.
#[derive(Clone)]
pub struct StorePool {
    pool: Pool<SqliteConnectionManager>,
}

impl StorePool {
    /// Open (creating if necessary) the database at `path` and apply the
    /// schema.
    pub fn open(path: &Path) -> BookdavResult<Self> {
        let manager = SqliteConnectionManager::file(path)
            .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));
        let pool = Pool::builder().max_size(8).build(manager).map_err(db_err)?;

        let conn = pool.get().map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        debug!(path = %path.display(), "availability database ready");

        Ok(StorePool { pool })
    }

    pub fn get(&self) -> BookdavResult<PooledConnection<SqliteConnectionManager>> {
        self.pool.get().map_err(db_err)
    }
}
