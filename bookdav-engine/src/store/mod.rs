//! Persistence for availability blocks and the reflection lock table.

mod availability;
mod pool;
mod reflection_lock;

pub use availability::AvailabilityStore;
pub use pool::StorePool;
pub use reflection_lock::ReflectionLockStore;

use bookdav_core::error::BookdavError;

/// Map any database-layer failure into the crate error type.
pub(crate) fn db_err(e: impl std::fmt::Display) -> BookdavError {
    BookdavError::Database(e.to_string())
}
