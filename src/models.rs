//! Core data models flowing through ingestion, retrieval, and answering.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A source web page or file tracked for change detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub tenant_id: String,
    pub url: String,
    pub content_hash: Option<String>,
    pub source_type: String, // "html" | "pdf"
    pub metadata: serde_json::Value,
    pub last_verified_at: Option<DateTime<Utc>>,
    pub is_stale: bool,
}

/// A passage extracted from a document, carrying its embedding.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub tenant_id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub chunk_text: String,
    pub document_title: Option<String>,
    pub document_url: Option<String>,
    pub section: Option<String>,
    pub page_number: Option<i64>,
    pub published_at: Option<DateTime<Utc>>,
}

/// The closed set of ContentItem categories.
pub const CATEGORIES: &[&str] = &[
    "news", "events", "dining", "safety", "transit", "weather", "government",
    "community", "sports",
];

/// A normalized record produced by a connector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: String,
    pub tenant_id: String,
    pub source_id: String,
    pub category: String,
    pub title: String,
    pub content: String,
    pub summary: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub url: Option<String>,
    pub image_url: Option<String>,
    pub metadata: serde_json::Value,
    pub content_hash: String,
}

/// The persistent configuration of one connector instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub id: String,
    pub tenant_id: String,
    pub connector_type: String, // rss | ical | scrape | api | pdf
    pub category: String,
    pub schedule: String, // 5min | 15min | hourly | daily | weekly
    pub config: serde_json::Value,
    pub enabled: bool,
    pub should_embed: bool,
    pub last_fetched_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub error_count: i64,
}

impl SourceConfig {
    /// The schedule's minimum re-run interval.
    pub fn interval(&self) -> chrono::Duration {
        match self.schedule.as_str() {
            "5min" => chrono::Duration::minutes(5),
            "15min" => chrono::Duration::minutes(15),
            "hourly" => chrono::Duration::hours(1),
            "daily" => chrono::Duration::days(1),
            "weekly" => chrono::Duration::weeks(1),
            _ => chrono::Duration::hours(1),
        }
    }

    /// Whether this source is due to run, honoring `force`.
    pub fn is_due(&self, now: DateTime<Utc>, force: bool) -> bool {
        if force {
            return true;
        }
        match self.last_fetched_at {
            None => true,
            Some(last) => now - last >= self.interval(),
        }
    }
}

/// One turn of conversation history sent to the answering endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String, // user | assistant | system
    pub content: String,
}

/// A cited source attached to a retrieved chunk or a cached answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRef {
    pub source_id: String,
    pub citation: Option<String>,
    pub document_title: Option<String>,
    pub document_url: Option<String>,
    pub section: Option<String>,
    pub date: Option<String>,
    pub page_number: Option<i64>,
}

/// A finished answer cached by (question, tenant).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedAnswer {
    pub key: String,
    pub answer_text: String,
    pub sources: Vec<SourceRef>,
    pub stored_at: DateTime<Utc>,
    pub ttl_seconds: i64,
}

/// Transient projection returned by hybrid search.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedChunk {
    pub id: String,
    pub chunk_text: String,
    pub similarity: f32,
    pub weighted_score: f32,
    pub metadata: serde_json::Value,
    pub source: SourceRef,
}

/// An append-only record of one ingestion/monitor/cron run.
#[derive(Debug, Clone, Serialize)]
pub struct IngestionLogEntry {
    pub id: String,
    pub tenant_id: String,
    pub run_kind: String, // monitor | ingest | cron
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub checked: i64,
    pub changed_count: i64,
    pub new_count: i64,
    pub error_count: i64,
    pub detail: serde_json::Value,
}

/// Token usage accounting for one LLM/embedding invocation.
#[derive(Debug, Clone)]
pub struct UsageRecord {
    pub id: String,
    pub tenant_id: String,
    pub endpoint: String,
    pub model: String,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,
    pub estimated_cost_usd: f64,
    pub metadata: serde_json::Value,
}
