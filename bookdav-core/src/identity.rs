//! Owner and visitor identities plus owner scheduling preferences.
//!
//! Account and directory lookup are external collaborators; these types
//! only carry what the engine needs at its boundary.

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{BookdavError, BookdavResult};
use crate::range::DateRange;

/// A resolved calendar user. Visitors are bare `IdentityRef`s; schedule
/// owners additionally carry [`Preferences`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRef {
    pub id: String,
    pub email: String,
    pub display_name: String,
}

impl IdentityRef {
    pub fn new(id: &str, email: &str, display_name: &str) -> Self {
        IdentityRef {
            id: id.to_string(),
            email: email.to_string(),
            display_name: display_name.to_string(),
        }
    }
}

/// A schedule owner: an identity plus scheduling preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Owner {
    pub identity: IdentityRef,
    pub preferences: Preferences,
}

/// Owner scheduling preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    /// Minimum preferred meeting length, in minutes
    pub meeting_minutes: u32,
    /// Whether visitors may request a double-length slot
    pub double_length: bool,
    /// Visible window opens this many hours from now
    pub window_hours_start: u32,
    /// Visible window closes this many weeks from now
    pub window_weeks_end: u32,
    /// Default capacity for newly published blocks
    pub default_visitor_limit: u32,
    /// Whether availability is mirrored into the remote calendar
    pub reflect_schedule: bool,
    /// Default meeting location for published blocks
    pub meeting_location: Option<String>,
}

impl Default for Preferences {
    fn default() -> Self {
        Preferences {
            meeting_minutes: 30,
            double_length: false,
            window_hours_start: 24,
            window_weeks_end: 3,
            default_visitor_limit: 1,
            reflect_schedule: false,
            meeting_location: None,
        }
    }
}

impl Preferences {
    /// Parse a human-readable meeting duration ("30m", "1h") into minutes.
    pub fn parse_meeting_duration(value: &str) -> BookdavResult<u32> {
        let duration = humantime::parse_duration(value).map_err(|e| {
            BookdavError::InputFormat(format!("invalid meeting duration '{value}': {e}"))
        })?;
        let minutes = duration.as_secs() / 60;
        if minutes == 0 {
            return Err(BookdavError::InputFormat(format!(
                "meeting duration '{value}' is shorter than one minute"
            )));
        }
        u32::try_from(minutes).map_err(|_| {
            BookdavError::InputFormat(format!("meeting duration '{value}' is out of range"))
        })
    }

    /// Maximum meeting length in minutes: doubled when the owner allows
    /// double-length slots, otherwise the minimum.
    pub fn max_meeting_minutes(&self) -> u32 {
        if self.double_length {
            self.meeting_minutes * 2
        } else {
            self.meeting_minutes
        }
    }

    /// The owner's currently visible booking window,
    /// `[now + hours_start, now + weeks_end]`.
    pub fn visible_window(&self) -> DateRange {
        let now = Utc::now();
        let start = now + Duration::hours(i64::from(self.window_hours_start));
        let end = now + Duration::weeks(i64::from(self.window_weeks_end));
        // window_weeks_end is always positive and dwarfs hours_start in
        // practice, but guard against degenerate preference combinations.
        DateRange {
            start,
            end: end.max(start + Duration::minutes(1)),
        }
    }
}
