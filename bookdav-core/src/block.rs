//! Bookable time blocks.
//!
//! An [`AvailableBlock`] is an immutable value describing one interval of
//! bookable time published by a schedule owner, together with how many
//! visitors may share it and where the meeting happens.

use std::cmp::Ordering;

use chrono::{DateTime, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{BookdavError, BookdavResult};

/// An owner-published bookable time interval.
///
/// Timestamps are minute precision; seconds and sub-seconds are truncated
/// on construction. `start < end` always holds for a constructed block.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AvailableBlock {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    visitor_limit: u32,
    meeting_location: Option<String>,
}

impl AvailableBlock {
    /// Create a block, validating its bounds.
    ///
    /// Zero-length or inverted intervals and a zero visitor limit are
    /// rejected with [`BookdavError::InputFormat`] before any I/O happens.
    pub fn new(
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        visitor_limit: u32,
        meeting_location: Option<String>,
    ) -> BookdavResult<Self> {
        let start = truncate_to_minute(start);
        let end = truncate_to_minute(end);

        if start >= end {
            return Err(BookdavError::InputFormat(format!(
                "block start ({start}) must be before end ({end})"
            )));
        }
        if visitor_limit == 0 {
            return Err(BookdavError::InputFormat(
                "visitor limit must be at least 1".to_string(),
            ));
        }

        Ok(AvailableBlock {
            start,
            end,
            visitor_limit,
            meeting_location,
        })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn visitor_limit(&self) -> u32 {
        self.visitor_limit
    }

    pub fn meeting_location(&self) -> Option<&str> {
        self.meeting_location.as_deref()
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Whether `instant` falls inside this block.
    ///
    /// The end boundary is exclusive: a timestamp exactly at `end` is
    /// never contained.
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant < self.end
    }

    /// Whether this block's interval intersects `[start, end)`.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start < end && self.end > start
    }

    /// Whether `other` can be merged onto the end of this block.
    ///
    /// Two blocks are combinable iff they share visitor limit and meeting
    /// location and this block ends exactly where the other starts.
    pub fn is_combinable_with(&self, other: &AvailableBlock) -> bool {
        self.visitor_limit == other.visitor_limit
            && self.meeting_location == other.meeting_location
            && self.end == other.start
    }

    /// A copy of this block with different bounds, keeping limit/location.
    pub(crate) fn with_bounds(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> BookdavResult<AvailableBlock> {
        AvailableBlock::new(start, end, self.visitor_limit, self.meeting_location.clone())
    }

    /// Expand this block into `ceil(duration / unit_minutes)` chronological
    /// sub-blocks covering `[start, end)` contiguously. The final sub-block
    /// is shorter when the duration is not a multiple of the unit.
    pub fn expand(&self, unit_minutes: u32) -> BookdavResult<Vec<AvailableBlock>> {
        if unit_minutes == 0 {
            return Err(BookdavError::InputFormat(
                "expansion unit must be at least 1 minute".to_string(),
            ));
        }

        let unit = Duration::minutes(i64::from(unit_minutes));
        let mut out = Vec::new();
        let mut cursor = self.start;
        while cursor < self.end {
            let sub_end = std::cmp::min(cursor + unit, self.end);
            out.push(self.with_bounds(cursor, sub_end)?);
            cursor = sub_end;
        }
        Ok(out)
    }
}

impl PartialOrd for AvailableBlock {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AvailableBlock {
    /// Blocks order by start time, then end time.
    fn cmp(&self, other: &Self) -> Ordering {
        (self.start, self.end, self.visitor_limit, &self.meeting_location).cmp(&(
            other.start,
            other.end,
            other.visitor_limit,
            &other.meeting_location,
        ))
    }
}

impl std::fmt::Display for AvailableBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{} - {}) limit={}",
            self.start.format("%Y-%m-%d %H:%M"),
            self.end.format("%Y-%m-%d %H:%M"),
            self.visitor_limit
        )
    }
}

fn truncate_to_minute(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.with_second(0).and_then(|d| d.with_nanosecond(0)).unwrap_or(dt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, h, m, 0).unwrap()
    }

    #[test]
    fn test_rejects_inverted_and_zero_length_bounds() {
        assert!(matches!(
            AvailableBlock::new(at(10, 0), at(9, 0), 1, None),
            Err(BookdavError::InputFormat(_))
        ));
        assert!(matches!(
            AvailableBlock::new(at(10, 0), at(10, 0), 1, None),
            Err(BookdavError::InputFormat(_))
        ));
    }

    #[test]
    fn test_rejects_zero_visitor_limit() {
        assert!(matches!(
            AvailableBlock::new(at(9, 0), at(10, 0), 0, None),
            Err(BookdavError::InputFormat(_))
        ));
    }

    #[test]
    fn test_truncates_to_minute_precision() {
        let start = Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 42).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 6, 2, 10, 0, 17).unwrap();
        let block = AvailableBlock::new(start, end, 1, None).unwrap();
        assert_eq!(block.start(), at(9, 0));
        assert_eq!(block.end(), at(10, 0));
    }

    #[test]
    fn test_end_boundary_is_exclusive() {
        let block = AvailableBlock::new(at(9, 0), at(10, 0), 1, None).unwrap();
        assert!(block.contains(at(9, 0)));
        assert!(block.contains(at(9, 59)));
        assert!(!block.contains(at(10, 0)));
    }

    #[test]
    fn test_combinable_requires_matching_limit_location_and_adjacency() {
        let a = AvailableBlock::new(at(9, 0), at(10, 0), 2, Some("Room 1".into())).unwrap();
        let b = AvailableBlock::new(at(10, 0), at(11, 0), 2, Some("Room 1".into())).unwrap();
        let c = AvailableBlock::new(at(10, 0), at(11, 0), 3, Some("Room 1".into())).unwrap();
        let d = AvailableBlock::new(at(10, 30), at(11, 0), 2, Some("Room 1".into())).unwrap();

        assert!(a.is_combinable_with(&b));
        assert!(!a.is_combinable_with(&c), "different visitor limit");
        assert!(!a.is_combinable_with(&d), "gap between blocks");
        assert!(!b.is_combinable_with(&a), "adjacency is directional");
    }

    #[test]
    fn test_expand_covers_block_without_gaps() {
        let block = AvailableBlock::new(at(9, 0), at(10, 30), 1, None).unwrap();
        let units = block.expand(30).unwrap();

        assert_eq!(units.len(), 3);
        assert_eq!(units[0].start(), at(9, 0));
        for pair in units.windows(2) {
            assert_eq!(pair[0].end(), pair[1].start(), "expansion must be contiguous");
        }
        assert_eq!(units[2].end(), at(10, 30));
    }

    #[test]
    fn test_expand_partial_trailing_unit() {
        // 70 minutes expanded by 30 -> 30 + 30 + 10
        let block = AvailableBlock::new(at(9, 0), at(10, 10), 1, None).unwrap();
        let units = block.expand(30).unwrap();
        assert_eq!(units.len(), 3);
        assert_eq!(units[2].start(), at(10, 0));
        assert_eq!(units[2].end(), at(10, 10));
    }

    #[test]
    fn test_expand_preserves_limit_and_location() {
        let block = AvailableBlock::new(at(9, 0), at(10, 0), 4, Some("Lab".into())).unwrap();
        for unit in block.expand(20).unwrap() {
            assert_eq!(unit.visitor_limit(), 4);
            assert_eq!(unit.meeting_location(), Some("Lab"));
        }
    }
}
