//! Connector Framework (C9).
//!
//! A connector fetches raw items from one external source (an RSS feed, an
//! iCalendar feed, a scraped web page set) and normalizes them into
//! [`ContentItem`]s, narrowed to the five source kinds a source's
//! `connector_type` names (`rss`, `ical`, `scrape`, `api`, `pdf`). No
//! user-extensible registry here — connectors are a closed, built-in set.

pub mod ical;
pub mod rss;
pub mod scrape;

use async_trait::async_trait;

use crate::models::SourceConfig;

/// One fetched item before normalization into a [`crate::models::ContentItem`].
#[derive(Debug, Clone, Default)]
pub struct RawItem {
    pub title: String,
    pub content: String,
    pub summary: Option<String>,
    pub url: Option<String>,
    pub image_url: Option<String>,
    pub published_at: Option<chrono::DateTime<chrono::Utc>>,
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
    /// Source-assigned stable identifier, when the connector has one (e.g. an
    /// iCalendar `UID`). `None` for connectors with no such concept.
    pub uid: Option<String>,
}

#[async_trait]
pub trait Connector: Send + Sync {
    /// The `source_configs.connector_type` value this implementation handles.
    fn connector_type(&self) -> &'static str;

    /// Fetches and parses raw items from the external source described by
    /// `source.config`. I/O errors are returned; parse errors for individual
    /// items should be logged and skipped rather than failing the whole run.
    async fn fetch(&self, source: &SourceConfig) -> Result<Vec<RawItem>, crate::errors::ConnectorError>;
}

/// Resolves the connector implementation for a source's configured type.
pub fn for_type(connector_type: &str) -> Option<Box<dyn Connector>> {
    match connector_type {
        "rss" => Some(Box::new(rss::RssConnector)),
        "ical" => Some(Box::new(ical::IcalConnector)),
        "scrape" | "pdf" => Some(Box::new(scrape::ScrapeConnector)),
        _ => None,
    }
}
