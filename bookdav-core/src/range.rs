//! Closed date range used for schedule queries and CalDAV time filters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{BookdavError, BookdavResult};

/// A `[start, end)` window in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> BookdavResult<Self> {
        if start >= end {
            return Err(BookdavError::InputFormat(format!(
                "range start ({start}) must be before end ({end})"
            )));
        }
        Ok(DateRange { start, end })
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant < self.end
    }

    /// Narrow this range to `bounds`, silently clamping out-of-window
    /// edges. `None` when the two ranges do not intersect.
    pub fn clamp_to(&self, bounds: &DateRange) -> Option<DateRange> {
        let start = self.start.max(bounds.start);
        let end = self.end.min(bounds.end);
        if start >= end {
            return None;
        }
        Some(DateRange { start, end })
    }

    /// CalDAV time-range filter value for the start: `yyyyMMdd'T'HHmmss'Z'`.
    pub fn start_caldav(&self) -> String {
        format_caldav(self.start)
    }

    /// CalDAV time-range filter value for the end.
    pub fn end_caldav(&self) -> String {
        format_caldav(self.end)
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{} - {})", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

/// Format a UTC timestamp for CalDAV time-range queries: `20250101T000000Z`.
pub fn format_caldav(dt: DateTime<Utc>) -> String {
    dt.format("%Y%m%dT%H%M%SZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_rejects_inverted_range() {
        assert!(DateRange::new(at(2, 10), at(2, 9)).is_err());
        assert!(DateRange::new(at(2, 10), at(2, 10)).is_err());
    }

    #[test]
    fn test_clamp_narrows_both_edges() {
        let requested = DateRange::new(at(1, 0), at(30, 0)).unwrap();
        let window = DateRange::new(at(2, 9), at(9, 17)).unwrap();
        let clamped = requested.clamp_to(&window).unwrap();
        assert_eq!(clamped, window);
    }

    #[test]
    fn test_clamp_disjoint_ranges_yield_none() {
        let requested = DateRange::new(at(1, 0), at(2, 0)).unwrap();
        let window = DateRange::new(at(10, 0), at(11, 0)).unwrap();
        assert!(requested.clamp_to(&window).is_none());
    }

    #[test]
    fn test_caldav_format() {
        let dt = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(format_caldav(dt), "20250101T000000Z");
    }
}
