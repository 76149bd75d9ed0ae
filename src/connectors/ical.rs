//! iCalendar (RFC 5545) connector.
//!
//! Hand-parsed via manual `BEGIN:VEVENT`/`END:VEVENT` line splitting: no crate
//! in the dependency tree parses RFC 5545, and its line-unfolding rule (a line
//! starting with a single space or tab continues the previous line) is simple
//! enough to implement directly.

use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use sha2::{Digest, Sha256};

use super::{Connector, RawItem};
use crate::errors::ConnectorError;
use crate::models::SourceConfig;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

pub struct IcalConnector;

#[async_trait::async_trait]
impl Connector for IcalConnector {
    fn connector_type(&self) -> &'static str {
        "ical"
    }

    async fn fetch(&self, source: &SourceConfig) -> Result<Vec<RawItem>, ConnectorError> {
        let feed_url = source
            .config
            .get("feedUrl")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ConnectorError::Parse("ical connector requires config.feedUrl".to_string()))?;
        let days_ahead = source
            .config
            .get("daysAhead")
            .and_then(|v| v.as_i64())
            .unwrap_or(90);

        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|e| ConnectorError::Http(e.to_string()))?;

        let body = client
            .get(feed_url)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ConnectorError::Timeout(FETCH_TIMEOUT)
                } else {
                    ConnectorError::Http(e.to_string())
                }
            })?
            .text()
            .await
            .map_err(|e| ConnectorError::Http(e.to_string()))?;

        let now = Utc::now();
        let horizon = now + chrono::Duration::days(days_ahead);
        let events = parse_calendar(&body);

        Ok(events
            .into_iter()
            .filter(|e| match e.published_at {
                Some(start) => start >= now && start <= horizon,
                None => true,
            })
            .collect())
    }
}

/// Unfolds continuation lines (leading space/tab) and splits into logical
/// `KEY[;PARAM=...]:VALUE` lines.
fn unfold(raw: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    for line in raw.split("\r\n").flat_map(|l| l.split('\n')) {
        if (line.starts_with(' ') || line.starts_with('\t')) && !lines.is_empty() {
            let last = lines.last_mut().unwrap();
            last.push_str(line.trim_start_matches([' ', '\t']));
        } else if !line.is_empty() {
            lines.push(line.to_string());
        }
    }
    lines
}

fn split_property(line: &str) -> Option<(&str, &str)> {
    let colon = line.find(':')?;
    let key_part = &line[..colon];
    let value = &line[colon + 1..];
    let key = key_part.split(';').next().unwrap_or(key_part);
    Some((key, value))
}

pub fn parse_calendar(raw: &str) -> Vec<RawItem> {
    let lines = unfold(raw);
    let mut events = Vec::new();
    let mut current: Option<Draft> = None;

    for line in lines {
        let Some((key, value)) = split_property(&line) else {
            continue;
        };
        match key {
            "BEGIN" if value == "VEVENT" => current = Some(Draft::default()),
            "END" if value == "VEVENT" => {
                if let Some(draft) = current.take() {
                    if let Some(item) = draft.finish() {
                        events.push(item);
                    }
                }
            }
            "SUMMARY" => {
                if let Some(d) = current.as_mut() {
                    d.summary = Some(unescape_text(value));
                }
            }
            "DESCRIPTION" => {
                if let Some(d) = current.as_mut() {
                    d.description = Some(unescape_text(value));
                }
            }
            "LOCATION" => {
                if let Some(d) = current.as_mut() {
                    d.location = Some(unescape_text(value));
                }
            }
            "UID" => {
                if let Some(d) = current.as_mut() {
                    d.uid = Some(value.to_string());
                }
            }
            "URL" => {
                if let Some(d) = current.as_mut() {
                    d.url = Some(value.to_string());
                }
            }
            "DTSTART" => {
                if let Some(d) = current.as_mut() {
                    d.dtstart = Some(value.to_string());
                }
            }
            _ => {}
        }
    }

    events
}

#[derive(Default)]
struct Draft {
    uid: Option<String>,
    summary: Option<String>,
    description: Option<String>,
    location: Option<String>,
    url: Option<String>,
    dtstart: Option<String>,
}

impl Draft {
    fn finish(self) -> Option<RawItem> {
        let summary = self.summary?;
        let published_at = self.dtstart.as_deref().and_then(parse_ical_datetime);
        let mut content = self.description.clone().unwrap_or_default();
        if let Some(location) = &self.location {
            if !content.is_empty() {
                content.push('\n');
            }
            content.push_str("Location: ");
            content.push_str(location);
        }
        Some(RawItem {
            title: summary,
            content,
            summary: self.description,
            url: self.url,
            image_url: None,
            published_at,
            expires_at: None,
            uid: self.uid,
        })
    }
}

fn unescape_text(value: &str) -> String {
    value
        .replace("\\n", "\n")
        .replace("\\N", "\n")
        .replace("\\,", ",")
        .replace("\\;", ";")
        .replace("\\\\", "\\")
}

/// Parses both date-only (`VALUE=DATE`, `YYYYMMDD`) and datetime
/// (`YYYYMMDDTHHMMSS[Z]`) forms.
fn parse_ical_datetime(value: &str) -> Option<DateTime<Utc>> {
    if value.len() == 8 {
        let date = NaiveDate::parse_from_str(value, "%Y%m%d").ok()?;
        return Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?));
    }
    let trimmed = value.trim_end_matches('Z');
    let naive = NaiveDateTime::parse_from_str(trimmed, "%Y%m%dT%H%M%S").ok()?;
    Some(Utc.from_utc_datetime(&naive))
}

/// Hashes on the event's `UID` when present, falling back to summary+start
/// time for feeds that omit it.
pub fn content_hash(item: &RawItem) -> String {
    let basis = item
        .uid
        .clone()
        .unwrap_or_else(|| format!("{}{}", item.title, item.published_at.map(|d| d.to_rfc3339()).unwrap_or_default()));
    let mut hasher = Sha256::new();
    hasher.update(basis.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "BEGIN:VCALENDAR\r\nBEGIN:VEVENT\r\nUID:abc-123\r\nSUMMARY:Town Council Meeting\r\nDESCRIPTION:Monthly council\\n meeting\r\nLOCATION:Town Hall\r\nDTSTART:20240115T190000Z\r\nEND:VEVENT\r\nEND:VCALENDAR";

    #[test]
    fn parses_single_event_with_datetime() {
        let events = parse_calendar(SAMPLE);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].title, "Town Council Meeting");
        assert!(events[0].content.contains("Town Hall"));
        assert!(events[0].published_at.is_some());
    }

    #[test]
    fn unfolds_continuation_lines() {
        let raw = "BEGIN:VEVENT\r\nSUMMARY:Long meeting na\r\n me\r\nEND:VEVENT";
        let events = parse_calendar(raw);
        assert_eq!(events[0].title, "Long meeting name");
    }

    #[test]
    fn parses_date_only_value() {
        let ts = parse_ical_datetime("20240301").unwrap();
        assert_eq!(ts.format("%Y-%m-%d").to_string(), "2024-03-01");
    }

    #[test]
    fn parsed_event_carries_its_uid() {
        let events = parse_calendar(SAMPLE);
        assert_eq!(events[0].uid.as_deref(), Some("abc-123"));
    }

    #[test]
    fn content_hash_distinguishes_same_summary_different_uid() {
        let raw_a = "BEGIN:VEVENT\r\nUID:event-a\r\nSUMMARY:Council Meeting\r\nDTSTART:20240115T190000Z\r\nEND:VEVENT";
        let raw_b = "BEGIN:VEVENT\r\nUID:event-b\r\nSUMMARY:Council Meeting\r\nDTSTART:20240115T190000Z\r\nEND:VEVENT";
        let a = &parse_calendar(raw_a)[0];
        let b = &parse_calendar(raw_b)[0];
        assert_ne!(content_hash(a), content_hash(b));
    }
}
