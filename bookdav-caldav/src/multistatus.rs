//! WebDAV multistatus response parsing.

use bookdav_core::error::{BookdavError, BookdavResult};

/// One `<response>` entry from a multistatus body that carried calendar
/// data.
#[derive(Debug)]
pub struct MultistatusEntry {
    pub href: String,
    pub etag: Option<String>,
    pub data: String,
}

/// Parse the multistatus body of a calendar-query REPORT.
///
/// Responses without calendar data (collection entries, failed propstats)
/// are skipped.
pub fn parse_multistatus(body: &str) -> BookdavResult<Vec<MultistatusEntry>> {
    let doc = roxmltree::Document::parse(body)
        .map_err(|e| BookdavError::Protocol(format!("invalid multistatus body: {e}")))?;
    let root = doc.root_element();

    let mut entries = Vec::new();

    for response in root.descendants().filter(|n| n.tag_name().name() == "response") {
        let href = response
            .descendants()
            .find(|n| n.tag_name().name() == "href")
            .and_then(|n| n.text())
            .map(|s| s.to_string());

        let Some(href) = href else { continue };

        let etag = response
            .descendants()
            .find(|n| n.tag_name().name() == "getetag")
            .and_then(|n| n.text())
            .map(|s| s.to_string());

        let data = response
            .descendants()
            .find(|n| n.tag_name().name() == "calendar-data")
            .and_then(|n| n.text())
            .map(|s| s.to_string());

        if let Some(data) = data {
            entries.push(MultistatusEntry { href, etag, data });
        }
    }

    Ok(entries)
}
