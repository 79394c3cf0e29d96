//! `CalendarDao` implementation over the CalDAV wire client.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use bookdav_core::appointment::{
    self, build_appointment, build_reflection_events, is_reflection, with_visitor_added,
    with_visitor_removed, CalendarResource,
};
use bookdav_core::block::AvailableBlock;
use bookdav_core::error::{BookdavError, BookdavResult};
use bookdav_core::event::Event;
use bookdav_core::ics::generate_ics;
use bookdav_core::identity::{IdentityRef, Owner};
use bookdav_core::ports::{AccountResolver, CalendarDao};
use bookdav_core::range::DateRange;
use bookdav_core::schedule::AvailableSchedule;

use crate::client::CaldavClient;

/// Appointment operations backed by a CalDAV server.
pub struct CaldavCalendarDao {
    client: CaldavClient,
    accounts: Arc<dyn AccountResolver>,
}

impl CaldavCalendarDao {
    pub fn new(client: CaldavClient, accounts: Arc<dyn AccountResolver>) -> Self {
        CaldavCalendarDao { client, accounts }
    }

    fn etag_of<'a>(resource: &'a CalendarResource) -> BookdavResult<&'a str> {
        resource.etag.as_deref().ok_or_else(|| {
            BookdavError::Protocol(format!(
                "resource {} carries no etag; conditional update impossible",
                resource.uri
            ))
        })
    }

    fn appointment_of<'a>(
        resource: &'a CalendarResource,
        owner: &Owner,
    ) -> BookdavResult<&'a Event> {
        resource.appointment_for(&owner.identity).ok_or_else(|| {
            BookdavError::NoAppointmentExists(format!(
                "resource {} holds no appointment for {}",
                resource.uri, owner.identity.email
            ))
        })
    }
}

#[async_trait]
impl CalendarDao for CaldavCalendarDao {
    async fn get_calendars(
        &self,
        owner: &IdentityRef,
        range: &DateRange,
    ) -> BookdavResult<Vec<CalendarResource>> {
        let account = self.accounts.resolve(owner)?;
        self.client.report(&account, range).await
    }

    async fn create_appointment(
        &self,
        owner: &Owner,
        visitor: &IdentityRef,
        block: &AvailableBlock,
        description: &str,
    ) -> BookdavResult<Event> {
        let account = self.accounts.resolve(&owner.identity)?;
        let event = build_appointment(owner, visitor, block, description);
        let ics = generate_ics(&event)?;
        let href = CaldavClient::event_href(&account.home_uri, &event.uid);

        self.client.put_new(&account, &href, &ics).await?;
        info!(owner = %owner.identity.email, visitor = %visitor.email, block = %block, "created appointment");
        Ok(event)
    }

    async fn join_appointment(
        &self,
        owner: &Owner,
        visitor: &IdentityRef,
        resource: &CalendarResource,
    ) -> BookdavResult<Event> {
        let account = self.accounts.resolve(&owner.identity)?;
        let current = Self::appointment_of(resource, owner)?;

        if appointment::is_attending(current, visitor) {
            debug!(visitor = %visitor.email, uid = %current.uid, "visitor already attends; join is a no-op");
            return Ok(current.clone());
        }

        let updated = with_visitor_added(current, visitor);
        let ics = generate_ics(&updated)?;
        self.client
            .put_conditional(&account, &resource.uri, Self::etag_of(resource)?, &ics)
            .await?;
        info!(owner = %owner.identity.email, visitor = %visitor.email, uid = %updated.uid, "visitor joined appointment");
        Ok(updated)
    }

    async fn leave_appointment(
        &self,
        owner: &Owner,
        visitor: &IdentityRef,
        resource: &CalendarResource,
    ) -> BookdavResult<Event> {
        let account = self.accounts.resolve(&owner.identity)?;
        let current = Self::appointment_of(resource, owner)?;

        let updated = with_visitor_removed(current, visitor)?;
        let ics = generate_ics(&updated)?;
        self.client
            .put_conditional(&account, &resource.uri, Self::etag_of(resource)?, &ics)
            .await?;
        info!(owner = %owner.identity.email, visitor = %visitor.email, uid = %updated.uid, "visitor left appointment");
        Ok(updated)
    }

    async fn cancel_appointment(
        &self,
        owner: &Owner,
        resource: &CalendarResource,
    ) -> BookdavResult<()> {
        let account = self.accounts.resolve(&owner.identity)?;
        self.client.delete(&account, &resource.uri).await?;
        info!(owner = %owner.identity.email, uri = %resource.uri, "cancelled appointment");
        Ok(())
    }

    async fn reflect_schedule(
        &self,
        owner: &Owner,
        schedule: &AvailableSchedule,
        range: &DateRange,
    ) -> BookdavResult<()> {
        let account = self.accounts.resolve(&owner.identity)?;

        // Stale placeholders first; reflection UIDs are deterministic, so
        // the subsequent creates land on clean hrefs.
        self.purge_reflections(owner, range).await?;

        let events = build_reflection_events(owner, schedule);
        let count = events.len();
        for event in events {
            if !range.contains(event.start) {
                continue;
            }
            let ics = generate_ics(&event)?;
            let href = CaldavClient::event_href(&account.home_uri, &event.uid);
            self.client.put_new(&account, &href, &ics).await?;
        }

        info!(owner = %owner.identity.email, count, "reflected availability schedule");
        Ok(())
    }

    async fn purge_reflections(&self, owner: &Owner, range: &DateRange) -> BookdavResult<()> {
        let account = self.accounts.resolve(&owner.identity)?;
        let resources = self.client.report(&account, range).await?;

        let mut purged = 0usize;
        for resource in resources {
            let placeholder = resource.calendar.events.len() == 1
                && is_reflection(&resource.calendar.events[0]);
            if placeholder {
                self.client.delete(&account, &resource.uri).await?;
                purged += 1;
            }
        }

        debug!(owner = %owner.identity.email, purged, "purged reflection placeholders");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bookdav_core::ports::CalendarAccount;
    use chrono::TimeZone;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct FixedResolver {
        account: CalendarAccount,
    }

    impl AccountResolver for FixedResolver {
        fn resolve(&self, _identity: &IdentityRef) -> BookdavResult<CalendarAccount> {
            Ok(self.account.clone())
        }
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
        AvailableBlock::new(
            chrono::Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap(),
            chrono::Utc.with_ymd_and_hms(2025, 6, 2, 9, 30, 0).unwrap(),
            1,
            None,
        )
        .unwrap()
    }

    fn dao_for(server: &MockServer) -> CaldavCalendarDao {
        CaldavCalendarDao::new(
            CaldavClient::new(&server.uri()),
            Arc::new(FixedResolver {
                account: CalendarAccount {
                    home_uri: "/calendars/owner1/home/".to_string(),
                    username: "owner1".to_string(),
                    password: "secret".to_string(),
                },
            }),
        )
    }

    #[tokio::test]
    async fn test_create_appointment_puts_generated_event() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let dao = dao_for(&server);
        let event = dao
            .create_appointment(&owner(), &visitor(), &block(), "office hours")
            .await
            .unwrap();

        assert_eq!(appointment::visitor_count(&event), 1);

        let requests = server.received_requests().await.unwrap();
        let req = &requests[0];
        assert!(req.url.path().ends_with(&format!("{}.ics", event.uid)));
        let body = String::from_utf8(req.body.clone()).unwrap();
        assert!(body.contains("X-BOOKDAV-APPOINTMENT:TRUE"));
        assert!(body.contains("mailto:visitor@example.com"));
    }

    #[tokio::test]
    async fn test_join_without_etag_is_protocol_error() {
        let server = MockServer::start().await;
        let dao = dao_for(&server);

        let event = build_appointment(&owner(), &visitor(), &block(), "");
        let resource = CalendarResource {
            calendar: bookdav_core::appointment::CalendarObject { events: vec![event] },
            uri: "/calendars/owner1/home/appt.ics".to_string(),
            etag: None,
        };
        let second = IdentityRef::new("vis2", "v2@example.com", "Visitor Two");

        let err = dao
            .join_appointment(&owner(), &second, &resource)
            .await
            .unwrap_err();
        assert!(matches!(err, BookdavError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_join_by_existing_visitor_is_noop() {
        let server = MockServer::start().await;
        // No PUT expected; dao must not touch the wire for a no-op join.
        let dao = dao_for(&server);

        let event = build_appointment(&owner(), &visitor(), &block(), "");
        let resource = CalendarResource {
            calendar: bookdav_core::appointment::CalendarObject { events: vec![event.clone()] },
            uri: "/calendars/owner1/home/appt.ics".to_string(),
            etag: Some("\"e1\"".to_string()),
        };

        let result = dao
            .join_appointment(&owner(), &visitor(), &resource)
            .await
            .unwrap();
        assert_eq!(result, event);
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_purge_deletes_only_reflection_placeholders() {
        let multistatus = r#"<?xml version="1.0" encoding="utf-8"?>
<multistatus xmlns="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">
  <response>
    <href>/calendars/owner1/home/reflect-1.ics</href>
    <propstat><prop>
      <getetag>"e1"</getetag>
      <C:calendar-data>BEGIN:VCALENDAR
BEGIN:VEVENT
UID:reflect-owner1-1@bookdav
SUMMARY:Available
DTSTART:20250602T090000Z
DTEND:20250602T100000Z
TRANSP:TRANSPARENT
X-BOOKDAV-REFLECT:TRUE
END:VEVENT
END:VCALENDAR</C:calendar-data>
    </prop><status>HTTP/1.1 200 OK</status></propstat>
  </response>
  <response>
    <href>/calendars/owner1/home/meeting.ics</href>
    <propstat><prop>
      <getetag>"e2"</getetag>
      <C:calendar-data>BEGIN:VCALENDAR
BEGIN:VEVENT
UID:meeting-1
SUMMARY:Standup
DTSTART:20250602T110000Z
DTEND:20250602T113000Z
END:VEVENT
END:VCALENDAR</C:calendar-data>
    </prop><status>HTTP/1.1 200 OK</status></propstat>
  </response>
</multistatus>"#;

        let server = MockServer::start().await;
        Mock::given(method("REPORT"))
            .respond_with(ResponseTemplate::new(207).set_body_string(multistatus))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/calendars/owner1/home/reflect-1.ics"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let dao = dao_for(&server);
        let range = DateRange::new(
            chrono::Utc.with_ymd_and_hms(2025, 6, 2, 0, 0, 0).unwrap(),
            chrono::Utc.with_ymd_and_hms(2025, 6, 3, 0, 0, 0).unwrap(),
        )
        .unwrap();

        dao.purge_reflections(&owner(), &range).await.unwrap();

        let deletes: Vec<_> = server
            .received_requests()
            .await
            .unwrap()
            .into_iter()
            .filter(|r| r.method.as_str() == "DELETE")
            .collect();
        assert_eq!(deletes.len(), 1, "ordinary events are never purged");
    }
}
