//! ICS parsing using the icalendar crate's parser.

use chrono::{DateTime, Utc};
use icalendar::parser::{read_calendar, unfold, Component, Property};

use crate::appointment::CalendarObject;
use crate::error::{BookdavError, BookdavResult};
use crate::event::{Attendee, AttendeeRole, Event, EventStatus, Transparency};
use crate::ics::generate::ROLE_PARAM;

/// Parse ICS content into a calendar object holding every VEVENT.
///
/// A malformed document is an error; an individual VEVENT missing its
/// required properties is skipped, matching the discovery policy of
/// ignoring resources this system cannot interpret.
pub fn parse_calendar(content: &str) -> BookdavResult<CalendarObject> {
    let unfolded = unfold(content);
    let calendar =
        read_calendar(&unfolded).map_err(|e| BookdavError::IcsParse(e.to_string()))?;

    let events = calendar
        .components
        .iter()
        .filter(|c| c.name == "VEVENT")
        .filter_map(parse_vevent)
        .collect();

    Ok(CalendarObject { events })
}

/// Parse ICS content into the first VEVENT, if any.
pub fn parse_event(content: &str) -> Option<Event> {
    parse_calendar(content).ok()?.events.into_iter().next()
}

fn parse_vevent(vevent: &Component) -> Option<Event> {
    let uid = vevent.find_prop("UID")?.val.to_string();
    let summary = vevent
        .find_prop("SUMMARY")
        .map(|p| p.val.to_string())
        .unwrap_or_else(|| "(No title)".to_string());
    let start = parse_utc_datetime(vevent.find_prop("DTSTART")?.val.as_ref())?;
    let end = parse_utc_datetime(vevent.find_prop("DTEND")?.val.as_ref())?;

    let description = vevent.find_prop("DESCRIPTION").map(|p| p.val.to_string());
    let location = vevent.find_prop("LOCATION").map(|p| p.val.to_string());

    let status = vevent
        .find_prop("STATUS")
        .map(|p| match p.val.as_ref() {
            "TENTATIVE" => EventStatus::Tentative,
            "CANCELLED" => EventStatus::Cancelled,
            _ => EventStatus::Confirmed,
        })
        .unwrap_or(EventStatus::Confirmed);

    let transparency = vevent
        .find_prop("TRANSP")
        .map(|p| {
            if p.val == "TRANSPARENT" {
                Transparency::Transparent
            } else {
                Transparency::Opaque
            }
        })
        .unwrap_or(Transparency::Opaque);

    let attendees: Vec<Attendee> = vevent
        .properties
        .iter()
        .filter(|p| p.name == "ATTENDEE")
        .map(parse_attendee)
        .collect();

    // Custom X- properties (the scheduling markers live here)
    let custom_properties: Vec<(String, String)> = vevent
        .properties
        .iter()
        .filter(|p| p.name.as_ref().starts_with("X-"))
        .map(|p| (p.name.to_string(), p.val.to_string()))
        .collect();

    Some(Event {
        uid,
        summary,
        description,
        location,
        start,
        end,
        status,
        transparency,
        attendees,
        custom_properties,
    })
}

/// Parse a DTSTART/DTEND value into UTC.
///
/// Appointments and placeholders are always written with the `Z` suffix;
/// a floating value from a foreign server is read as UTC rather than
/// rejected, since conflict checks only need approximate overlap.
fn parse_utc_datetime(value: &str) -> Option<DateTime<Utc>> {
    let trimmed = value.trim_end_matches('Z');
    chrono::NaiveDateTime::parse_from_str(trimmed, "%Y%m%dT%H%M%S")
        .ok()
        .map(|dt| dt.and_utc())
}

/// Parse an ATTENDEE property
fn parse_attendee(prop: &Property) -> Attendee {
    let email = prop
        .val
        .as_ref()
        .strip_prefix("mailto:")
        .unwrap_or(prop.val.as_ref())
        .to_string();

    let name = prop
        .params
        .iter()
        .find(|p| p.key == "CN")
        .and_then(|p| p.val.as_ref().map(|v| v.to_string()));

    let role = prop
        .params
        .iter()
        .find(|p| p.key == ROLE_PARAM)
        .and_then(|p| p.val.as_ref())
        .and_then(|v| AttendeeRole::from_ics_str(v.as_ref()));

    Attendee { name, email, role }
}
