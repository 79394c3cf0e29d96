//! Low-level CalDAV wire client.
//!
//! Speaks the protocol subset this system needs: calendar-query REPORT,
//! conditional PUT (create and update), and DELETE. Optimistic concurrency
//! relies on `If-None-Match` / `If-Match`; a rejected conditional update is
//! surfaced distinctly and never retried here.

use std::sync::Arc;

use reqwest::Method;
use tracing::{debug, warn};

use bookdav_core::appointment::CalendarResource;
use bookdav_core::error::{BookdavError, BookdavResult};
use bookdav_core::ics::parse_calendar;
use bookdav_core::ports::CalendarAccount;
use bookdav_core::range::DateRange;

use crate::multistatus::parse_multistatus;

/// Mutation hook applied to every outgoing request before dispatch.
///
/// Calendar servers differ in quirks (redirect targets, extra headers);
/// a dialect adjusts the request and always returns one.
pub trait CaldavDialect: Send + Sync {
    fn prepare(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder;
}

/// Default dialect: requests pass through untouched.
pub struct StandardDialect;

impl CaldavDialect for StandardDialect {
    fn prepare(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
    }
}

/// CalDAV client bound to one server root.
pub struct CaldavClient {
    http: reqwest::Client,
    server_root: String,
    dialect: Arc<dyn CaldavDialect>,
}

impl CaldavClient {
    /// Create a client for `server_root`, e.g. `https://cal.example.com`.
    pub fn new(server_root: &str) -> Self {
        Self::with_dialect(server_root, Arc::new(StandardDialect))
    }

    pub fn with_dialect(server_root: &str, dialect: Arc<dyn CaldavDialect>) -> Self {
        CaldavClient {
            http: reqwest::Client::new(),
            server_root: server_root.trim_end_matches('/').to_string(),
            dialect,
        }
    }

    /// Absolute URL for a server-relative href.
    pub fn url_for(&self, href: &str) -> String {
        if href.starts_with("http://") || href.starts_with("https://") {
            href.to_string()
        } else if href.starts_with('/') {
            format!("{}{}", self.server_root, href)
        } else {
            format!("{}/{}", self.server_root, href)
        }
    }

    /// Href of a new event resource inside a calendar home:
    /// `<calendar-home>/<uid>.ics`.
    pub fn event_href(home_uri: &str, uid: &str) -> String {
        format!("{}/{}.ics", home_uri.trim_end_matches('/'), uid)
    }

    /// Issue a calendar-query REPORT over `range` against the account's
    /// calendar home and parse the multistatus response.
    ///
    /// Entries whose calendar data does not parse are skipped with a
    /// warning; they cannot be scheduling-assistant appointments.
    pub async fn report(
        &self,
        account: &CalendarAccount,
        range: &DateRange,
    ) -> BookdavResult<Vec<CalendarResource>> {
        let body = calendar_query_body(range);
        let method = Method::from_bytes(b"REPORT")
            .map_err(|e| BookdavError::Protocol(format!("REPORT method: {e}")))?;

        let request = self
            .http
            .request(method, self.url_for(&account.home_uri))
            .basic_auth(&account.username, Some(&account.password))
            .header("Depth", "1")
            .header("Content-Type", "application/xml")
            .body(body);

        let response = self
            .dialect
            .prepare(request)
            .send()
            .await
            .map_err(|e| BookdavError::Protocol(format!("REPORT failed: {e}")))?;

        let status = response.status();
        if !matches!(status.as_u16(), 200 | 207) {
            return Err(BookdavError::Protocol(format!(
                "REPORT returned status {status}"
            )));
        }

        let text = response
            .text()
            .await
            .map_err(|e| BookdavError::Protocol(format!("REPORT body: {e}")))?;

        let mut resources = Vec::new();
        for entry in parse_multistatus(&text)? {
            match parse_calendar(&entry.data) {
                Ok(calendar) => resources.push(CalendarResource {
                    calendar,
                    uri: entry.href,
                    etag: entry.etag,
                }),
                Err(e) => {
                    warn!(href = %entry.href, error = %e, "skipping unparseable calendar resource");
                }
            }
        }

        debug!(
            home = %account.home_uri,
            range = %range,
            count = resources.len(),
            "calendar query complete"
        );

        Ok(resources)
    }

    /// PUT a new resource. `If-None-Match: *` makes the server reject the
    /// write when anything already lives at `href`.
    pub async fn put_new(
        &self,
        account: &CalendarAccount,
        href: &str,
        ics: &str,
    ) -> BookdavResult<()> {
        let request = self
            .http
            .put(self.url_for(href))
            .basic_auth(&account.username, Some(&account.password))
            .header("If-None-Match", "*")
            .header("Content-Type", "text/calendar")
            .body(ics.to_string());

        let response = self
            .dialect
            .prepare(request)
            .send()
            .await
            .map_err(|e| BookdavError::Protocol(format!("PUT failed: {e}")))?;

        match response.status().as_u16() {
            200 | 201 => Ok(()),
            status => Err(BookdavError::Protocol(format!(
                "PUT create of {href} returned status {status}"
            ))),
        }
    }

    /// PUT an updated resource conditionally on `etag`.
    ///
    /// A 412 means the resource changed since it was read; that is
    /// reported as [`BookdavError::StaleAppointment`] so callers can
    /// distinguish a lost race from a wire failure. No retry happens here.
    pub async fn put_conditional(
        &self,
        account: &CalendarAccount,
        href: &str,
        etag: &str,
        ics: &str,
    ) -> BookdavResult<()> {
        let request = self
            .http
            .put(self.url_for(href))
            .basic_auth(&account.username, Some(&account.password))
            .header("If-Match", etag)
            .header("Content-Type", "text/calendar")
            .body(ics.to_string());

        let response = self
            .dialect
            .prepare(request)
            .send()
            .await
            .map_err(|e| BookdavError::Protocol(format!("PUT failed: {e}")))?;

        match response.status().as_u16() {
            200 | 201 | 204 => Ok(()),
            412 => Err(BookdavError::StaleAppointment(format!(
                "conditional update of {href} rejected (etag {etag})"
            ))),
            status => Err(BookdavError::Protocol(format!(
                "PUT update of {href} returned status {status}"
            ))),
        }
    }

    /// DELETE a resource. 204 is the only success status.
    pub async fn delete(&self, account: &CalendarAccount, href: &str) -> BookdavResult<()> {
        let request = self
            .http
            .delete(self.url_for(href))
            .basic_auth(&account.username, Some(&account.password));

        let response = self
            .dialect
            .prepare(request)
            .send()
            .await
            .map_err(|e| BookdavError::Protocol(format!("DELETE failed: {e}")))?;

        match response.status().as_u16() {
            204 => Ok(()),
            status => Err(BookdavError::Protocol(format!(
                "DELETE of {href} returned status {status}"
            ))),
        }
    }
}

/// calendar-query REPORT body with a VEVENT time-range filter.
fn calendar_query_body(range: &DateRange) -> String {
    format!(
        r#"<C:calendar-query xmlns="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">
    <prop>
        <getetag/>
        <C:calendar-data/>
    </prop>
    <C:filter>
        <C:comp-filter name="VCALENDAR">
            <C:comp-filter name="VEVENT">
                <C:time-range start="{}" end="{}"/>
            </C:comp-filter>
        </C:comp-filter>
    </C:filter>
</C:calendar-query>"#,
        range.start_caldav(),
        range.end_caldav()
    )
}
