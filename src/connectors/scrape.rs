//! Generic web-page scraper connector.
//!
//! Walks a starting URL's same-site links (optionally filtered by a URL
//! regex), extracting a readability-style body via `scraper`'s CSS selection,
//! bounded by `maxPages` and a politeness delay between fetches. Grounded on
//! the `scraper` crate as used in `lexlapax-rs-llmspell/llmspell-tools`.

use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;
use scraper::{Html, Selector};
use sha2::{Digest, Sha256};

use super::{Connector, RawItem};
use crate::errors::ConnectorError;
use crate::models::SourceConfig;

const DEFAULT_MAX_PAGES: usize = 20;
const PER_ITEM_TIMEOUT: Duration = Duration::from_secs(15);
const POLITENESS_DELAY: Duration = Duration::from_millis(500);
const MIN_BODY_CHARS: usize = 50;

pub struct ScrapeConnector;

#[async_trait::async_trait]
impl Connector for ScrapeConnector {
    fn connector_type(&self) -> &'static str {
        "scrape"
    }

    async fn fetch(&self, source: &SourceConfig) -> Result<Vec<RawItem>, ConnectorError> {
        let start_url = source
            .config
            .get("startUrl")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ConnectorError::Parse("scrape connector requires config.startUrl".to_string()))?;

        let content_selector = source
            .config
            .get("contentSelector")
            .and_then(|v| v.as_str())
            .unwrap_or("article, main, body");

        let url_filter = source
            .config
            .get("urlPattern")
            .and_then(|v| v.as_str())
            .map(Regex::new)
            .transpose()
            .map_err(|e| ConnectorError::Parse(format!("invalid urlPattern: {e}")))?;

        let max_pages = source
            .config
            .get("maxPages")
            .and_then(|v| v.as_u64())
            .unwrap_or(DEFAULT_MAX_PAGES as u64) as usize;

        let client = reqwest::Client::builder()
            .timeout(PER_ITEM_TIMEOUT)
            .build()
            .map_err(|e| ConnectorError::Http(e.to_string()))?;

        let urls = discover_urls(&client, start_url, url_filter.as_ref(), max_pages).await?;

        let mut items = Vec::new();
        for (i, url) in urls.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(POLITENESS_DELAY).await;
            }
            match fetch_one(&client, url, content_selector).await {
                Ok(Some(item)) => items.push(item),
                Ok(None) => {}
                Err(e) => tracing::warn!(url = %url, error = %e, "scrape item failed, skipping"),
            }
        }

        Ok(items)
    }
}

async fn discover_urls(
    client: &reqwest::Client,
    start_url: &str,
    url_filter: Option<&Regex>,
    max_pages: usize,
) -> Result<Vec<String>, ConnectorError> {
    let body = fetch_text(client, start_url).await?;
    let document = Html::parse_document(&body);
    let link_selector = Selector::parse("a[href]").expect("valid selector");

    let base = reqwest::Url::parse(start_url).map_err(|e| ConnectorError::Parse(e.to_string()))?;

    let mut urls = vec![start_url.to_string()];
    for element in document.select(&link_selector) {
        if urls.len() >= max_pages {
            break;
        }
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let Ok(absolute) = base.join(href) else {
            continue;
        };
        if absolute.host_str() != base.host_str() {
            continue;
        }
        let absolute = absolute.to_string();
        if let Some(filter) = url_filter {
            if !filter.is_match(&absolute) {
                continue;
            }
        }
        if !urls.contains(&absolute) {
            urls.push(absolute);
        }
    }

    urls.truncate(max_pages);
    Ok(urls)
}

async fn fetch_text(client: &reqwest::Client, url: &str) -> Result<String, ConnectorError> {
    client
        .get(url)
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                ConnectorError::Timeout(PER_ITEM_TIMEOUT)
            } else {
                ConnectorError::Http(e.to_string())
            }
        })?
        .text()
        .await
        .map_err(|e| ConnectorError::Http(e.to_string()))
}

async fn fetch_one(
    client: &reqwest::Client,
    url: &str,
    content_selector: &str,
) -> Result<Option<RawItem>, ConnectorError> {
    let body = fetch_text(client, url).await?;
    let document = Html::parse_document(&body);

    let title = document
        .select(&Selector::parse("title").expect("valid selector"))
        .next()
        .map(|e| e.text().collect::<String>().trim().to_string())
        .unwrap_or_default();

    let selector = Selector::parse(content_selector)
        .map_err(|e| ConnectorError::Parse(format!("invalid contentSelector: {e:?}")))?;

    let body_text: String = document
        .select(&selector)
        .next()
        .map(|el| html_to_text(el))
        .unwrap_or_default();

    if body_text.trim().chars().count() < MIN_BODY_CHARS {
        return Ok(None);
    }

    let published_at = extract_meta_date(&document);

    Ok(Some(RawItem {
        title: if title.is_empty() { url.to_string() } else { title },
        content: body_text,
        summary: None,
        url: Some(url.to_string()),
        image_url: extract_meta_image(&document),
        published_at,
        expires_at: None,
        uid: None,
    }))
}

fn html_to_text(element: scraper::ElementRef<'_>) -> String {
    let paragraphs: Vec<String> = element
        .text()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect();
    paragraphs.join("\n\n")
}

fn extract_meta_date(document: &Html) -> Option<DateTime<Utc>> {
    let selector = Selector::parse(
        "meta[property='article:published_time'], meta[name='date'], time[datetime]",
    )
    .ok()?;
    document.select(&selector).find_map(|el| {
        let raw = el
            .value()
            .attr("content")
            .or_else(|| el.value().attr("datetime"))?;
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|d| d.with_timezone(&Utc))
    })
}

fn extract_meta_image(document: &Html) -> Option<String> {
    let selector = Selector::parse("meta[property='og:image']").ok()?;
    document
        .select(&selector)
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(|s| s.to_string())
}

pub fn content_hash(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_is_stable_for_same_url() {
        assert_eq!(content_hash("https://a.example/1"), content_hash("https://a.example/1"));
        assert_ne!(content_hash("https://a.example/1"), content_hash("https://a.example/2"));
    }

    #[test]
    fn html_to_text_strips_tags_and_joins_blocks() {
        let html = Html::parse_fragment("<div><p>First</p><p>Second</p></div>");
        let selector = Selector::parse("div").unwrap();
        let el = html.select(&selector).next().unwrap();
        let text = html_to_text(el);
        assert!(text.contains("First"));
        assert!(text.contains("Second"));
    }
}
