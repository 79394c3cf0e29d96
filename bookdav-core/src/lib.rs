//! Core types for the bookdav ecosystem.
//!
//! This crate provides the pure domain shared by the CalDAV layer and the
//! scheduling engine:
//! - `AvailableBlock` / `AvailableSchedule` and the block algebra
//! - `Event` / appointment model with the scheduling markers
//! - `ics` module for iCalendar generation and parsing
//! - the `CalendarDao` port the engine drives

pub mod appointment;
pub mod block;
pub mod error;
pub mod event;
pub mod ics;
pub mod identity;
pub mod ports;
pub mod range;
pub mod schedule;

pub use block::AvailableBlock;
pub use error::{BookdavError, BookdavResult};
pub use range::DateRange;
pub use schedule::AvailableSchedule;
