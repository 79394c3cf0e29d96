//! ICS generation for remote writes.

use icalendar::{Calendar, Component, EventLike, Property};

use crate::error::BookdavResult;
use crate::event::{Event, EventStatus, Transparency};

/// Parameter carrying an attendee's scheduling role.
pub(crate) const ROLE_PARAM: &str = "X-BOOKDAV-ROLE";

/// Generate .ics content for a single event wrapped in a VCALENDAR.
pub fn generate_ics(event: &Event) -> BookdavResult<String> {
    let mut cal = Calendar::new();

    let mut ics_event = icalendar::Event::new();
    ics_event.uid(&event.uid);
    ics_event.summary(&event.summary);

    // DTSTAMP - required by RFC 5545
    let dtstamp = chrono::Utc::now().format("%Y%m%dT%H%M%SZ").to_string();
    ics_event.add_property("DTSTAMP", &dtstamp);

    ics_event.add_property("DTSTART", event.start.format("%Y%m%dT%H%M%SZ").to_string());
    ics_event.add_property("DTEND", event.end.format("%Y%m%dT%H%M%SZ").to_string());

    if let Some(ref desc) = event.description {
        ics_event.description(desc);
    }

    if let Some(ref loc) = event.location {
        ics_event.location(loc);
    }

    // Status - only emit if not CONFIRMED (the implied default)
    match event.status {
        EventStatus::Confirmed => {}
        EventStatus::Tentative => {
            ics_event.add_property("STATUS", "TENTATIVE");
        }
        EventStatus::Cancelled => {
            ics_event.add_property("STATUS", "CANCELLED");
        }
    }

    // TRANSP - only emit if TRANSPARENT (OPAQUE is the default)
    if event.transparency == Transparency::Transparent {
        ics_event.add_property("TRANSP", "TRANSPARENT");
    }

    // ATTENDEE (multi-property - can appear multiple times)
    for attendee in &event.attendees {
        let mut prop = Property::new("ATTENDEE", format!("mailto:{}", attendee.email));
        if let Some(ref name) = attendee.name {
            prop.add_parameter("CN", name);
        }
        if let Some(role) = attendee.role {
            prop.add_parameter(ROLE_PARAM, role.as_ics_str());
        }
        ics_event.append_multi_property(prop);
    }

    // Marker X- properties
    for (key, value) in &event.custom_properties {
        ics_event.add_property(key, value);
    }

    let ics_event = ics_event.done();
    cal.push(ics_event);
    let cal = cal.done();

    Ok(strip_ics_bloat(&cal.to_string()))
}

/// Clean up ICS output from the icalendar crate
/// - Replace PRODID with BOOKDAV (we post-process the output)
/// - Remove CALSCALE:GREGORIAN (it's the default)
fn strip_ics_bloat(ics: &str) -> String {
    let mut result = String::with_capacity(ics.len());

    for line in ics.lines() {
        if line.starts_with("PRODID:") {
            result.push_str("PRODID:BOOKDAV\r\n");
            continue;
        }
        if line == "CALSCALE:GREGORIAN" {
            continue;
        }
        result.push_str(line);
        result.push_str("\r\n");
    }

    result
}
