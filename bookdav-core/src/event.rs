//! Provider-neutral calendar event types.
//!
//! These represent remote calendar entries in a wire-agnostic way. The
//! CalDAV layer converts iCalendar documents into these types, and the
//! scheduling engine works exclusively with them for conflict checks and
//! appointment mutation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single remote calendar event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub uid: String,
    pub summary: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub status: EventStatus,

    /// Whether the event blocks time (OPAQUE) or shows as free (TRANSPARENT)
    pub transparency: Transparency,

    /// Event attendees, including the schedule owner
    pub attendees: Vec<Attendee>,

    /// Custom X- properties, preserved for round-tripping. The
    /// scheduling-assistant markers live here.
    pub custom_properties: Vec<(String, String)>,
}

impl Event {
    /// Whether this event overlaps `[start, end)`.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start < end && self.end > start
    }

    /// An event conflicts with a prospective booking iff it is not
    /// cancelled and it blocks time. Unset transparency is treated as
    /// busy; only explicitly transparent events never conflict.
    pub fn is_conflicting(&self) -> bool {
        self.status != EventStatus::Cancelled && self.transparency == Transparency::Opaque
    }

    /// First value of a custom property, if present.
    pub fn property(&self, name: &str) -> Option<&str> {
        self.custom_properties
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn attendees_with_role(&self, role: AttendeeRole) -> impl Iterator<Item = &Attendee> {
        self.attendees.iter().filter(move |a| a.role == Some(role))
    }
}

/// An event attendee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attendee {
    /// Display name
    pub name: Option<String>,
    /// Email address
    pub email: String,
    /// Scheduling-assistant role, absent on foreign events
    pub role: Option<AttendeeRole>,
}

/// The role an attendee plays on a scheduling-assistant appointment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttendeeRole {
    Owner,
    Visitor,
}

impl AttendeeRole {
    pub fn as_ics_str(&self) -> &'static str {
        match self {
            AttendeeRole::Owner => "OWNER",
            AttendeeRole::Visitor => "VISITOR",
        }
    }

    pub fn from_ics_str(s: &str) -> Option<Self> {
        match s {
            "OWNER" => Some(AttendeeRole::Owner),
            "VISITOR" => Some(AttendeeRole::Visitor),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventStatus {
    Confirmed,
    Tentative,
    Cancelled,
}

/// Event transparency (busy/free status)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transparency {
    /// Event blocks time on the calendar (default)
    Opaque,
    /// Event does not block time (shows as free)
    Transparent,
}
