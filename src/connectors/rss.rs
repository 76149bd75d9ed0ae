//! RSS 2.0 / Atom 1.0 connector.
//!
//! Hand-parsed via `quick_xml`. No RSS/Atom parsing crate covers both formats
//! well enough to justify pulling one in, so the item/entry walk below tracks
//! the current tag and accumulates its text, switching behavior per
//! `<item>`/`<entry>` element name.

use std::time::Duration;

use chrono::{DateTime, Utc};
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use sha2::{Digest, Sha256};

use super::{Connector, RawItem};
use crate::errors::ConnectorError;
use crate::models::SourceConfig;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

pub struct RssConnector;

#[async_trait::async_trait]
impl Connector for RssConnector {
    fn connector_type(&self) -> &'static str {
        "rss"
    }

    async fn fetch(&self, source: &SourceConfig) -> Result<Vec<RawItem>, ConnectorError> {
        let feed_url = source
            .config
            .get("feedUrl")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ConnectorError::Parse("rss connector requires config.feedUrl".to_string()))?;

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

        parse_feed(&body)
    }
}

/// Parses either an RSS `<item>` feed or an Atom `<entry>` feed into raw items.
pub fn parse_feed(xml: &str) -> Result<Vec<RawItem>, ConnectorError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut items = Vec::new();
    let mut stack: Vec<String> = Vec::new();
    let mut current: Option<Draft> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(tag)) => {
                let name = local_name(&tag.name().0);
                if name == "item" || name == "entry" {
                    current = Some(Draft::default());
                }
                if name == "link" {
                    if let Some(draft) = current.as_mut() {
                        // Atom <link href="..."/> has no text content.
                        for attr in tag.attributes().flatten() {
                            if local_name(attr.key.0.as_ref()) == "href" {
                                draft.url = Some(decode_entities(&String::from_utf8_lossy(&attr.value)));
                            }
                        }
                    }
                }
                stack.push(name);
            }
            Ok(Event::Text(text)) | Ok(Event::CData(text)) => {
                let raw = text.unescape().map(|c| c.to_string()).unwrap_or_else(|_| {
                    String::from_utf8_lossy(text.as_ref()).to_string()
                });
                let decoded = decode_entities(&raw);
                if let (Some(tag), Some(draft)) = (stack.last(), current.as_mut()) {
                    apply_text(draft, tag, decoded);
                }
            }
            Ok(Event::End(tag)) => {
                let name = local_name(&tag.name().0);
                stack.pop();
                if name == "item" || name == "entry" {
                    if let Some(draft) = current.take() {
                        if let Some(item) = draft.finish() {
                            items.push(item);
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ConnectorError::Parse(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    Ok(items)
}

#[derive(Default)]
struct Draft {
    title: Option<String>,
    description: Option<String>,
    url: Option<String>,
    published_at_raw: Option<String>,
}

impl Draft {
    fn finish(self) -> Option<RawItem> {
        let title = self.title?;
        let published_at = self.published_at_raw.as_deref().and_then(parse_date);
        let content = self.description.clone().unwrap_or_default();
        Some(RawItem {
            title,
            content,
            summary: self.description,
            url: self.url,
            image_url: None,
            published_at,
            expires_at: None,
            uid: None,
        })
    }
}

fn apply_text(draft: &mut Draft, tag: &str, text: String) {
    if text.trim().is_empty() {
        return;
    }
    match tag {
        "title" => draft.title = Some(text),
        "description" | "summary" | "content" => draft.description = Some(text),
        "link" => {
            if draft.url.is_none() {
                draft.url = Some(text);
            }
        }
        "pubdate" | "published" | "updated" | "dc:date" => draft.published_at_raw = Some(text),
        _ => {}
    }
}

fn local_name(qname: &[u8]) -> String {
    let s = String::from_utf8_lossy(qname);
    s.rsplit(':').next().unwrap_or(&s).to_lowercase()
}

/// Decodes HTML/XML entities in a fixed order — `&lt; &gt; &quot; &#39;
/// &nbsp;` before `&amp;` — so a literal `&amp;lt;` does not get
/// double-unescaped into `<`.
fn decode_entities(input: &str) -> String {
    input
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(raw)
        .map(|d| d.with_timezone(&Utc))
        .or_else(|_| DateTime::parse_from_rfc3339(raw).map(|d| d.with_timezone(&Utc)))
        .ok()
}

pub fn content_hash(item: &RawItem) -> String {
    let basis = item.url.clone().unwrap_or_else(|| item.title.clone());
    let mut hasher = Sha256::new();
    hasher.update(basis.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS_SAMPLE: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
<item>
  <title>Road closure on Main St</title>
  <link>https://town.example/news/1</link>
  <description>Main St will be closed &amp; detoured Monday.</description>
  <pubDate>Mon, 01 Jan 2024 09:00:00 GMT</pubDate>
</item>
</channel></rss>"#;

    const ATOM_SAMPLE: &str = r#"<?xml version="1.0"?>
<feed xmlns="http://www.w3.org/2005/Atom">
<entry>
  <title>Town meeting rescheduled</title>
  <link href="https://town.example/news/2"/>
  <summary>Meeting moved to Thursday.</summary>
  <published>2024-01-02T10:00:00Z</published>
</entry>
</feed>"#;

    #[test]
    fn parses_rss_item() {
        let items = parse_feed(RSS_SAMPLE).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Road closure on Main St");
        assert_eq!(items[0].url.as_deref(), Some("https://town.example/news/1"));
        assert!(items[0].content.contains("detoured"));
        assert!(items[0].published_at.is_some());
    }

    #[test]
    fn parses_atom_entry() {
        let items = parse_feed(ATOM_SAMPLE).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Town meeting rescheduled");
        assert_eq!(items[0].url.as_deref(), Some("https://town.example/news/2"));
    }

    #[test]
    fn entities_decode_without_double_unescaping() {
        let decoded = decode_entities("Tom &amp;amp; Jerry");
        assert_eq!(decoded, "Tom &amp; Jerry");
    }

    #[test]
    fn content_hash_prefers_url_over_title() {
        let item = RawItem {
            title: "same title".to_string(),
            content: String::new(),
            summary: None,
            url: Some("https://a.example/1".to_string()),
            image_url: None,
            published_at: None,
            expires_at: None,
            uid: None,
        };
        let other = RawItem {
            url: Some("https://a.example/2".to_string()),
            ..item.clone()
        };
        assert_ne!(content_hash(&item), content_hash(&other));
    }
}
