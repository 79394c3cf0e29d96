//! Scheduling-assistant appointment model.
//!
//! Appointments live in the remote calendar as ordinary VEVENTs carrying
//! bookdav marker properties. This module owns the marker vocabulary, the
//! resource discovery rules, and the attendee mutations the engine applies
//! before writing an event back.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::block::AvailableBlock;
use crate::error::{BookdavError, BookdavResult};
use crate::event::{Attendee, AttendeeRole, Event, EventStatus, Transparency};
use crate::identity::{IdentityRef, Owner};
use crate::schedule::AvailableSchedule;

/// Marks a VEVENT as a bookdav appointment (value `TRUE`).
pub const PROP_APPOINTMENT: &str = "X-BOOKDAV-APPOINTMENT";
/// Appointment format version. Events without it predate the versioning
/// scheme and are cancelled outright rather than mutated.
pub const PROP_VERSION: &str = "X-BOOKDAV-VERSION";
/// Visitor capacity recorded on the appointment itself.
pub const PROP_VISITOR_LIMIT: &str = "X-BOOKDAV-VISITOR-LIMIT";
/// Marks a VEVENT as a reflection placeholder, never an appointment.
pub const PROP_REFLECTION: &str = "X-BOOKDAV-REFLECT";

/// Versions this implementation recognizes.
pub const RECOGNIZED_VERSIONS: &[&str] = &["1.0", "1.1"];
/// Version written on newly created appointments.
pub const CURRENT_VERSION: &str = "1.1";

/// A parsed remote calendar document: zero or more events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalendarObject {
    pub events: Vec<Event>,
}

/// A parsed calendar document plus where it came from and its concurrency
/// token. Constructed per query and discarded after the operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarResource {
    pub calendar: CalendarObject,
    pub uri: String,
    pub etag: Option<String>,
}

impl CalendarResource {
    /// The appointment event, when this resource passes the discovery
    /// rules for `owner` (exactly one VEVENT, appointment marker set,
    /// recognized or absent version handled by the caller, owner attends
    /// with the OWNER role).
    pub fn appointment_for(&self, owner: &IdentityRef) -> Option<&Event> {
        if self.calendar.events.len() != 1 {
            return None;
        }
        let event = &self.calendar.events[0];
        if event.property(PROP_APPOINTMENT) != Some("TRUE") {
            return None;
        }
        if let Some(version) = event.property(PROP_VERSION) {
            if !RECOGNIZED_VERSIONS.contains(&version) {
                return None;
            }
        }
        let owner_attends = event
            .attendees_with_role(AttendeeRole::Owner)
            .any(|a| a.email.eq_ignore_ascii_case(&owner.email));
        if !owner_attends {
            return None;
        }
        Some(event)
    }
}

/// Find "the" appointment resource for an owner among query results.
///
/// Resources failing any discovery check are skipped, not errors.
pub fn find_appointment<'a>(
    resources: &'a [CalendarResource],
    owner: &IdentityRef,
    block: &AvailableBlock,
) -> Option<&'a CalendarResource> {
    resources.iter().find(|r| {
        r.appointment_for(owner)
            .is_some_and(|e| e.start == block.start() && e.end == block.end())
    })
}

/// Merge query results pairwise into one combined calendar object.
///
/// Used for unified free/busy views spanning several underlying
/// resources; the merge is associative, so result contents do not depend
/// on input order.
pub fn consolidate(resources: &[CalendarResource]) -> CalendarObject {
    let mut combined = CalendarObject::default();
    for resource in resources {
        combined.events.extend(resource.calendar.events.iter().cloned());
    }
    combined
}

/// Number of visitor-role attendees on an appointment.
pub fn visitor_count(event: &Event) -> usize {
    event.attendees_with_role(AttendeeRole::Visitor).count()
}

/// Whether `visitor` already attends with the visitor role.
pub fn is_attending(event: &Event, visitor: &IdentityRef) -> bool {
    event
        .attendees_with_role(AttendeeRole::Visitor)
        .any(|a| a.email.eq_ignore_ascii_case(&visitor.email))
}

/// Whether the event predates the versioning scheme.
pub fn is_pre_versioning(event: &Event) -> bool {
    event.property(PROP_VERSION).is_none()
}

/// Build a brand-new appointment event for `block` with the owner and the
/// first visitor attending.
pub fn build_appointment(
    owner: &Owner,
    visitor: &IdentityRef,
    block: &AvailableBlock,
    description: &str,
) -> Event {
    Event {
        uid: format!("{}@bookdav", Uuid::new_v4()),
        summary: format!("Appointment with {}", owner.identity.display_name),
        description: if description.is_empty() {
            None
        } else {
            Some(description.to_string())
        },
        location: block.meeting_location().map(str::to_string),
        start: block.start(),
        end: block.end(),
        status: EventStatus::Confirmed,
        transparency: Transparency::Opaque,
        attendees: vec![
            Attendee {
                name: Some(owner.identity.display_name.clone()),
                email: owner.identity.email.clone(),
                role: Some(AttendeeRole::Owner),
            },
            Attendee {
                name: Some(visitor.display_name.clone()),
                email: visitor.email.clone(),
                role: Some(AttendeeRole::Visitor),
            },
        ],
        custom_properties: vec![
            (PROP_APPOINTMENT.to_string(), "TRUE".to_string()),
            (PROP_VERSION.to_string(), CURRENT_VERSION.to_string()),
            (
                PROP_VISITOR_LIMIT.to_string(),
                block.visitor_limit().to_string(),
            ),
        ],
    }
}

/// A copy of `event` with `visitor` added as a visitor-role attendee.
pub fn with_visitor_added(event: &Event, visitor: &IdentityRef) -> Event {
    let mut updated = event.clone();
    updated.attendees.push(Attendee {
        name: Some(visitor.display_name.clone()),
        email: visitor.email.clone(),
        role: Some(AttendeeRole::Visitor),
    });
    updated
}

/// A copy of `event` with `visitor`'s visitor-role attendee entry removed.
///
/// Fails with [`BookdavError::NoAppointmentExists`] when the visitor is
/// not on the attendee list.
pub fn with_visitor_removed(event: &Event, visitor: &IdentityRef) -> BookdavResult<Event> {
    let mut updated = event.clone();
    let before = updated.attendees.len();
    updated.attendees.retain(|a| {
        !(a.role == Some(AttendeeRole::Visitor) && a.email.eq_ignore_ascii_case(&visitor.email))
    });
    if updated.attendees.len() == before {
        return Err(BookdavError::NoAppointmentExists(format!(
            "{} does not attend appointment {}",
            visitor.email, event.uid
        )));
    }
    Ok(updated)
}

/// Build the transparent reflection placeholders for an owner's schedule.
///
/// One placeholder per stored block, deterministically identified so a
/// re-reflection overwrites rather than duplicates. Placeholders are
/// TRANSPARENT and therefore invisible to the engine's conflict check.
pub fn build_reflection_events(owner: &Owner, schedule: &AvailableSchedule) -> Vec<Event> {
    schedule
        .blocks()
        .map(|block| Event {
            uid: format!(
                "reflect-{}-{}@bookdav",
                owner.identity.id,
                block.start().timestamp()
            ),
            summary: "Available".to_string(),
            description: None,
            location: block.meeting_location().map(str::to_string),
            start: block.start(),
            end: block.end(),
            status: EventStatus::Confirmed,
            transparency: Transparency::Transparent,
            attendees: vec![],
            custom_properties: vec![(PROP_REFLECTION.to_string(), "TRUE".to_string())],
        })
        .collect()
}

/// Whether an event is a reflection placeholder.
pub fn is_reflection(event: &Event) -> bool {
    event.property(PROP_REFLECTION) == Some("TRUE")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, h, m, 0).unwrap()
    }

    fn owner() -> Owner {
        Owner {
            identity: IdentityRef::new("owner1", "owner@example.com", "Owner One"),
            preferences: Default::default(),
        }
    }

    fn visitor() -> IdentityRef {
        IdentityRef::new("vis1", "visitor@example.com", "Visitor One")
    }

    fn block() -> AvailableBlock {
        AvailableBlock::new(at(9, 0), at(9, 30), 3, None).unwrap()
    }

    fn resource(events: Vec<Event>) -> CalendarResource {
        CalendarResource {
            calendar: CalendarObject { events },
            uri: "/cal/owner1/appt.ics".to_string(),
            etag: Some("\"etag-1\"".to_string()),
        }
    }

    #[test]
    fn test_new_appointment_carries_markers_and_both_attendees() {
        let event = build_appointment(&owner(), &visitor(), &block(), "thesis chat");

        assert_eq!(event.property(PROP_APPOINTMENT), Some("TRUE"));
        assert_eq!(event.property(PROP_VERSION), Some(CURRENT_VERSION));
        assert_eq!(event.property(PROP_VISITOR_LIMIT), Some("3"));
        assert_eq!(visitor_count(&event), 1);
        assert_eq!(event.attendees_with_role(AttendeeRole::Owner).count(), 1);
        assert_eq!(event.description.as_deref(), Some("thesis chat"));
    }

    #[test]
    fn test_discovery_accepts_well_formed_appointment() {
        let event = build_appointment(&owner(), &visitor(), &block(), "");
        let res = resource(vec![event]);
        assert!(find_appointment(&[res], &owner().identity, &block()).is_some());
    }

    #[test]
    fn test_discovery_skips_unmarked_event() {
        let mut event = build_appointment(&owner(), &visitor(), &block(), "");
        event.custom_properties.retain(|(k, _)| k != PROP_APPOINTMENT);
        let res = resource(vec![event]);
        assert!(find_appointment(&[res], &owner().identity, &block()).is_none());
    }

    #[test]
    fn test_discovery_skips_unrecognized_version() {
        let mut event = build_appointment(&owner(), &visitor(), &block(), "");
        for (k, v) in event.custom_properties.iter_mut() {
            if k == PROP_VERSION {
                *v = "99.0".to_string();
            }
        }
        let res = resource(vec![event]);
        assert!(find_appointment(&[res], &owner().identity, &block()).is_none());
    }

    #[test]
    fn test_discovery_skips_multi_event_resource() {
        let event = build_appointment(&owner(), &visitor(), &block(), "");
        let res = resource(vec![event.clone(), event]);
        assert!(find_appointment(&[res], &owner().identity, &block()).is_none());
    }

    #[test]
    fn test_discovery_requires_owner_role_attendee() {
        let mut event = build_appointment(&owner(), &visitor(), &block(), "");
        event.attendees.retain(|a| a.role != Some(AttendeeRole::Owner));
        let res = resource(vec![event]);
        assert!(find_appointment(&[res], &owner().identity, &block()).is_none());
    }

    #[test]
    fn test_pre_versioning_appointment_still_discoverable() {
        let mut event = build_appointment(&owner(), &visitor(), &block(), "");
        event.custom_properties.retain(|(k, _)| k != PROP_VERSION);
        assert!(is_pre_versioning(&event));
        let res = resource(vec![event]);
        assert!(find_appointment(&[res], &owner().identity, &block()).is_some());
    }

    #[test]
    fn test_visitor_add_and_remove_roundtrip() {
        let event = build_appointment(&owner(), &visitor(), &block(), "");
        let second = IdentityRef::new("vis2", "v2@example.com", "Visitor Two");

        let joined = with_visitor_added(&event, &second);
        assert_eq!(visitor_count(&joined), 2);
        assert!(is_attending(&joined, &second));

        let left = with_visitor_removed(&joined, &second).unwrap();
        assert_eq!(visitor_count(&left), 1);
        assert!(!is_attending(&left, &second));
    }

    #[test]
    fn test_remove_absent_visitor_fails() {
        let event = build_appointment(&owner(), &visitor(), &block(), "");
        let stranger = IdentityRef::new("x", "x@example.com", "X");
        assert!(matches!(
            with_visitor_removed(&event, &stranger),
            Err(BookdavError::NoAppointmentExists(_))
        ));
    }

    #[test]
    fn test_consolidate_merges_all_events_order_independent() {
        let e1 = build_appointment(&owner(), &visitor(), &block(), "");
        let b2 = AvailableBlock::new(at(10, 0), at(10, 30), 1, None).unwrap();
        let e2 = build_appointment(&owner(), &visitor(), &b2, "");

        let ab = consolidate(&[resource(vec![e1.clone()]), resource(vec![e2.clone()])]);
        let ba = consolidate(&[resource(vec![e2]), resource(vec![e1])]);

        assert_eq!(ab.events.len(), 2);
        let mut ab_uids: Vec<_> = ab.events.iter().map(|e| e.uid.clone()).collect();
        let mut ba_uids: Vec<_> = ba.events.iter().map(|e| e.uid.clone()).collect();
        ab_uids.sort();
        ba_uids.sort();
        assert_eq!(ab_uids, ba_uids);
    }

    #[test]
    fn test_reflection_events_are_transparent_and_deterministic() {
        let schedule = AvailableSchedule::from_blocks(vec![block()]);
        let first = build_reflection_events(&owner(), &schedule);
        let second = build_reflection_events(&owner(), &schedule);

        assert_eq!(first.len(), 1);
        assert_eq!(first[0].uid, second[0].uid);
        assert!(is_reflection(&first[0]));
        assert!(!first[0].is_conflicting(), "placeholders must never conflict");
    }
}
