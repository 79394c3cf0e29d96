//! The booking state machine.
//!
//! All capacity and conflict decisions are made here against a fresh
//! calendar query; the [`CalendarDao`] underneath enforces freshness with
//! conditional writes, so a decision made against a stale view surfaces
//! as [`BookdavError::StaleAppointment`] instead of a silent overwrite.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use bookdav_core::appointment::{
    self, find_appointment, is_reflection, PROP_VISITOR_LIMIT,
};
use bookdav_core::block::AvailableBlock;
use bookdav_core::error::{BookdavError, BookdavResult};
use bookdav_core::event::Event;
use bookdav_core::identity::{IdentityRef, Owner};
use bookdav_core::ports::CalendarDao;
use bookdav_core::range::DateRange;
use bookdav_core::schedule::AvailableSchedule;

use crate::events::{AppointmentEvent, NotificationSink};
use crate::store::AvailabilityStore;

/// How a booking request was satisfied.
#[derive(Debug, Clone)]
pub enum ScheduleOutcome {
    /// A new appointment resource was created for the block.
    Created(Event),
    /// The visitor was added to an existing group appointment.
    Joined(Event),
}

/// How a cancellation request was satisfied.
#[derive(Debug, Clone)]
pub enum CancelOutcome {
    /// The appointment resource was deleted.
    Cancelled,
    /// The visitor left; the appointment survives for the others.
    Left(Event),
}

pub struct SchedulingEngine {
    store: Arc<AvailabilityStore>,
    calendar: Arc<dyn CalendarDao>,
    sink: Arc<dyn NotificationSink>,
}

impl SchedulingEngine {
    pub fn new(
        store: Arc<AvailabilityStore>,
        calendar: Arc<dyn CalendarDao>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        SchedulingEngine {
            store,
            calendar,
            sink,
        }
    }

    /// Book `requested` on the owner's calendar for `visitor`.
    ///
    /// Returns `Ok(None)` when the visitor is the owner (a self-booking is
    /// ignored, not an error). The requested interval must match a stored
    /// availability sub-block exactly, otherwise the block is reported
    /// unavailable.
    #[instrument(skip(self, owner, requested, description), fields(owner = %owner.identity.id, visitor = %visitor.id))]
    pub async fn schedule_appointment(
        &self,
        visitor: &IdentityRef,
        owner: &Owner,
        requested: &DateRange,
        description: &str,
    ) -> BookdavResult<Option<ScheduleOutcome>> {
        if self.is_self_booking(visitor, owner) {
            warn!("owner attempted to book their own block, ignoring");
            return Ok(None);
        }

        let target = self
            .store
            .retrieve_target_block_exact(&owner.identity.id, requested.start, requested.end)?
            .ok_or_else(|| block_unavailable(requested))?;

        let resources = self
            .calendar
            .get_calendars(&owner.identity, requested)
            .await?;

        if target.visitor_limit() == 1 {
            self.ensure_no_conflict(&resources, &target)?;
            return self.create(owner, visitor, &target, description).await;
        }

        match find_appointment(&resources, &owner.identity, &target) {
            None => {
                self.ensure_no_conflict(&resources, &target)?;
                self.create(owner, visitor, &target, description).await
            }
            Some(resource) => {
                let event = resource
                    .appointment_for(&owner.identity)
                    .ok_or_else(|| no_appointment(&target))?;
                let limit = effective_limit(event, &target);
                if appointment::visitor_count(event) >= limit as usize {
                    return Err(BookdavError::CapacityExceeded { limit });
                }
                let updated = self
                    .calendar
                    .join_appointment(owner, visitor, resource)
                    .await?;
                info!(uid = %updated.uid, "visitor joined appointment");
                self.sink.publish(AppointmentEvent::Joined {
                    appointment: updated.clone(),
                    owner: owner.identity.clone(),
                    visitor: visitor.clone(),
                    block: target,
                });
                Ok(Some(ScheduleOutcome::Joined(updated)))
            }
        }
    }

    /// Cancel the visitor's participation in the appointment on `block`.
    ///
    /// Sole-visitor and single-capacity appointments are deleted outright;
    /// otherwise the visitor leaves and the appointment survives. Returns
    /// `Ok(None)` for a self-cancellation.
    #[instrument(skip(self, owner, block, reason), fields(owner = %owner.identity.id, visitor = %visitor.id))]
    pub async fn cancel_appointment(
        &self,
        visitor: &IdentityRef,
        owner: &Owner,
        block: &AvailableBlock,
        reason: Option<&str>,
    ) -> BookdavResult<Option<CancelOutcome>> {
        if self.is_self_booking(visitor, owner) {
            warn!("owner attempted to cancel against themselves, ignoring");
            return Ok(None);
        }

        let range = DateRange::new(block.start(), block.end())?;
        let resources = self.calendar.get_calendars(&owner.identity, &range).await?;
        let resource = find_appointment(&resources, &owner.identity, block)
            .ok_or_else(|| no_appointment(block))?;
        let event = resource
            .appointment_for(&owner.identity)
            .ok_or_else(|| no_appointment(block))?;

        let pre_versioning = appointment::is_pre_versioning(event);
        let limit = effective_limit(event, block);

        // On the group path the requester must actually attend; otherwise
        // any identity could delete the sole visitor's appointment.
        if !pre_versioning && limit > 1 && !appointment::is_attending(event, visitor) {
            return Err(no_appointment(block));
        }

        let delete_outright =
            pre_versioning || limit == 1 || appointment::visitor_count(event) <= 1;

        if delete_outright {
            self.calendar.cancel_appointment(owner, resource).await?;
            info!(uid = %event.uid, "appointment cancelled");
            self.sink.publish(AppointmentEvent::Cancelled {
                owner: owner.identity.clone(),
                visitor: visitor.clone(),
                block: block.clone(),
                reason: reason.map(str::to_string),
            });
            return Ok(Some(CancelOutcome::Cancelled));
        }

        let updated = self
            .calendar
            .leave_appointment(owner, visitor, resource)
            .await?;
        info!(uid = %updated.uid, "visitor left appointment");
        self.sink.publish(AppointmentEvent::Left {
            appointment: updated.clone(),
            owner: owner.identity.clone(),
            visitor: visitor.clone(),
            block: block.clone(),
        });
        Ok(Some(CancelOutcome::Left(updated)))
    }

    /// The owner's schedule as a visitor may see it: clamped to the
    /// owner's visible booking window.
    pub fn visible_schedule(
        &self,
        owner: &Owner,
        requested: &DateRange,
    ) -> BookdavResult<AvailableSchedule> {
        match requested.clamp_to(&owner.preferences.visible_window()) {
            Some(window) => self.store.retrieve_in_range(&owner.identity.id, &window),
            None => Ok(AvailableSchedule::new()),
        }
    }

    fn is_self_booking(&self, visitor: &IdentityRef, owner: &Owner) -> bool {
        visitor.id == owner.identity.id
            || visitor.email.eq_ignore_ascii_case(&owner.identity.email)
    }

    /// Reject the booking when anything opaque already occupies the block.
    /// Reflection placeholders are transparent by construction and never
    /// count, but an owner may have marked one busy by hand.
    fn ensure_no_conflict(
        &self,
        resources: &[bookdav_core::appointment::CalendarResource],
        target: &AvailableBlock,
    ) -> BookdavResult<()> {
        let combined = appointment::consolidate(resources);
        let conflict = combined.events.iter().any(|e| {
            e.overlaps(target.start(), target.end()) && e.is_conflicting() && !is_reflection(e)
        });
        if conflict {
            warn!(block = %target, "block already occupied on calendar");
            return Err(BookdavError::BlockUnavailable(target.to_string()));
        }
        Ok(())
    }

    async fn create(
        &self,
        owner: &Owner,
        visitor: &IdentityRef,
        target: &AvailableBlock,
        description: &str,
    ) -> BookdavResult<Option<ScheduleOutcome>> {
        let created = self
            .calendar
            .create_appointment(owner, visitor, target, description)
            .await?;
        info!(uid = %created.uid, "appointment created");
        self.sink.publish(AppointmentEvent::Created {
            appointment: created.clone(),
            owner: owner.identity.clone(),
            visitor: visitor.clone(),
            block: target.clone(),
        });
        Ok(Some(ScheduleOutcome::Created(created)))
    }
}

/// Capacity recorded on the event wins over the stored block: the block
/// may have been republished with a new limit after the appointment was
/// made.
fn effective_limit(event: &Event, block: &AvailableBlock) -> u32 {
    event
        .property(PROP_VISITOR_LIMIT)
        .and_then(|v| v.parse().ok())
        .unwrap_or_else(|| block.visitor_limit())
}

fn block_unavailable(requested: &DateRange) -> BookdavError {
    BookdavError::BlockUnavailable(requested.to_string())
}

fn no_appointment(block: &AvailableBlock) -> BookdavError {
    BookdavError::NoAppointmentExists(block.to_string())
}
