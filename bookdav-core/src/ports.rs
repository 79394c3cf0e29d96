//! Trait seams between the scheduling engine and its collaborators.
//!
//! The calendar server and the account directory are external systems;
//! the engine only ever sees these traits. Production wiring lives in
//! `bookdav-caldav` and the embedding application.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::appointment::CalendarResource;
use crate::block::AvailableBlock;
use crate::error::BookdavResult;
use crate::event::Event;
use crate::identity::{IdentityRef, Owner};
use crate::range::DateRange;
use crate::schedule::AvailableSchedule;

/// A resolved calendar account: where the owner's calendar home lives and
/// how to authenticate against it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarAccount {
    /// Calendar-home collection path, e.g. `/calendars/owner1/home/`
    pub home_uri: String,
    pub username: String,
    pub password: String,
}

/// Resolves an identity to its calendar account (external collaborator).
pub trait AccountResolver: Send + Sync {
    fn resolve(&self, identity: &IdentityRef) -> BookdavResult<CalendarAccount>;
}

/// Appointment operations against the remote calendar store.
///
/// Every mutation is a single PUT or DELETE; optimistic concurrency runs
/// on the ETags captured by [`CalendarDao::get_calendars`]. A conditional
/// update rejected by the server surfaces as
/// [`crate::error::BookdavError::StaleAppointment`] and is never retried
/// inside the call.
#[async_trait]
pub trait CalendarDao: Send + Sync {
    /// Query the owner's calendar home for resources intersecting `range`.
    async fn get_calendars(
        &self,
        owner: &IdentityRef,
        range: &DateRange,
    ) -> BookdavResult<Vec<CalendarResource>>;

    /// Create a brand-new appointment for `block`; fails if a resource
    /// already exists at the generated URI.
    async fn create_appointment(
        &self,
        owner: &Owner,
        visitor: &IdentityRef,
        block: &AvailableBlock,
        description: &str,
    ) -> BookdavResult<Event>;

    /// Add `visitor` to the appointment held by `resource` via
    /// conditional update.
    async fn join_appointment(
        &self,
        owner: &Owner,
        visitor: &IdentityRef,
        resource: &CalendarResource,
    ) -> BookdavResult<Event>;

    /// Remove `visitor` from the appointment held by `resource` via
    /// conditional update.
    async fn leave_appointment(
        &self,
        owner: &Owner,
        visitor: &IdentityRef,
        resource: &CalendarResource,
    ) -> BookdavResult<Event>;

    /// Delete the appointment resource outright.
    async fn cancel_appointment(
        &self,
        owner: &Owner,
        resource: &CalendarResource,
    ) -> BookdavResult<()>;

    /// Replace the reflection placeholders in `range` with the owner's
    /// current schedule.
    async fn reflect_schedule(
        &self,
        owner: &Owner,
        schedule: &AvailableSchedule,
        range: &DateRange,
    ) -> BookdavResult<()>;

    /// Remove every reflection placeholder in `range`.
    async fn purge_reflections(&self, owner: &Owner, range: &DateRange) -> BookdavResult<()>;
}
