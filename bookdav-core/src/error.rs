//! Error types for the bookdav ecosystem.

use thiserror::Error;

/// Errors that can occur in bookdav operations.
///
/// The scheduling variants (`BlockUnavailable`, `CapacityExceeded`,
/// `StaleAppointment`, `NoAppointmentExists`) are distinct business
/// outcomes and must be presented to callers individually, never collapsed
/// into a generic failure.
#[derive(Error, Debug)]
pub enum BookdavError {
    #[error("Invalid input: {0}")]
    InputFormat(String),

    #[error("Block is not available: {0}")]
    BlockUnavailable(String),

    #[error("Appointment is full (visitor limit {limit})")]
    CapacityExceeded { limit: u32 },

    #[error("Appointment changed on the server since it was read: {0}")]
    StaleAppointment(String),

    #[error("No appointment exists: {0}")]
    NoAppointmentExists(String),

    #[error("Calendar protocol error: {0}")]
    Protocol(String),

    #[error("Reflection lock unavailable for owner '{0}'")]
    LockUnavailable(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("ICS parse error: {0}")]
    IcsParse(String),

    #[error("ICS generation error: {0}")]
    IcsGenerate(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for bookdav operations.
pub type BookdavResult<T> = Result<T, BookdavError>;
