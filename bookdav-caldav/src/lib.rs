//! CalDAV protocol client for bookdav.
//!
//! Implements the wire subset the scheduling engine needs: calendar-query
//! REPORT with a time-range filter, conditional PUT for create and update
//! (If-None-Match / If-Match), and DELETE, plus the appointment-level
//! `CalendarDao` built on top.

pub mod client;
pub mod dao;
pub mod multistatus;

pub use client::{CaldavClient, CaldavDialect, StandardDialect};
pub use dao::CaldavCalendarDao;
