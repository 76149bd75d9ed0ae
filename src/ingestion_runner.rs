//! Ingestion Runner (C10).
//!
//! Runs each enabled, due connector sequentially: fetch → normalize →
//! content-hash upsert → optional embed. Sequential (not fanned out) so one
//! misbehaving connector's rate limit doesn't starve the others.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::config::Config;
use crate::connectors;
use crate::embedding_client::EmbeddingClient;
use crate::geography;
use crate::models::SourceConfig;
use crate::usage;

const SUMMARY_TRUNCATE_CHARS: usize = 8000;

#[derive(Debug, Clone, Serialize)]
pub struct ConnectorResult {
    pub source_id: String,
    pub connector_type: String,
    pub fetched: usize,
    pub stored: usize,
    pub skipped_duplicate: usize,
    pub skipped_out_of_scope: usize,
    pub error: Option<String>,
}

pub struct RunOptions {
    pub tenant_id: Option<String>,
    pub schedule: Option<String>,
    pub force: bool,
}

/// Runs all enabled sources matching `options`, in `source_configs.id` order.
pub async fn run(
    pool: &SqlitePool,
    config: &Config,
    embedding_client: Option<Arc<EmbeddingClient>>,
    options: RunOptions,
) -> Result<Vec<ConnectorResult>, sqlx::Error> {
    let sources = load_due_sources(pool, &options).await?;
    let mut results = Vec::with_capacity(sources.len());

    for source in sources {
        let result = run_one(pool, config, embedding_client.as_deref(), &source).await;
        update_source_status(pool, &source, &result).await.ok();
        results.push(result);
    }

    Ok(results)
}

async fn load_due_sources(pool: &SqlitePool, options: &RunOptions) -> Result<Vec<SourceConfig>, sqlx::Error> {
    let mut query = "SELECT id, tenant_id, connector_type, category, schedule, config_json, enabled, should_embed, last_fetched_at, last_error, error_count FROM source_configs WHERE enabled = 1".to_string();
    if options.tenant_id.is_some() {
        query.push_str(" AND tenant_id = ?");
    }
    if options.schedule.is_some() {
        query.push_str(" AND schedule = ?");
    }
    query.push_str(" ORDER BY id");

    let mut q = sqlx::query(&query);
    if let Some(tenant_id) = &options.tenant_id {
        q = q.bind(tenant_id);
    }
    if let Some(schedule) = &options.schedule {
        q = q.bind(schedule);
    }

    let rows = q.fetch_all(pool).await?;
    let now = Utc::now();

    let sources: Vec<SourceConfig> = rows
        .into_iter()
        .map(|row| SourceConfig {
            id: row.get("id"),
            tenant_id: row.get("tenant_id"),
            connector_type: row.get("connector_type"),
            category: row.get("category"),
            schedule: row.get("schedule"),
            config: serde_json::from_str(&row.get::<String, _>("config_json")).unwrap_or(serde_json::json!({})),
            enabled: row.get::<i64, _>("enabled") != 0,
            should_embed: row.get::<i64, _>("should_embed") != 0,
            last_fetched_at: row.get("last_fetched_at"),
            last_error: row.get("last_error"),
            error_count: row.get("error_count"),
        })
        .filter(|s| s.is_due(now, options.force))
        .collect();

    Ok(sources)
}

async fn run_one(
    pool: &SqlitePool,
    config: &Config,
    embedding_client: Option<&EmbeddingClient>,
    source: &SourceConfig,
) -> ConnectorResult {
    let mut result = ConnectorResult {
        source_id: source.id.clone(),
        connector_type: source.connector_type.clone(),
        fetched: 0,
        stored: 0,
        skipped_duplicate: 0,
        skipped_out_of_scope: 0,
        error: None,
    };

    let Some(connector) = connectors::for_type(&source.connector_type) else {
        result.error = Some(format!("unknown connector_type '{}'", source.connector_type));
        return result;
    };

    let raw_items = match connector.fetch(source).await {
        Ok(items) => items,
        Err(e) => {
            result.error = Some(e.to_string());
            return result;
        }
    };
    result.fetched = raw_items.len();

    let tenant = config.tenant(&source.tenant_id);

    for item in raw_items {
        if let Some(tenant) = tenant {
            if !geography::is_in_scope(&source.category, &item.content, tenant) {
                result.skipped_out_of_scope += 1;
                continue;
            }
        }

        let content_hash = content_hash_for(&source.connector_type, &item);
        let truncated_content: String = item.content.chars().take(SUMMARY_TRUNCATE_CHARS).collect();
        let id = Uuid::new_v4().to_string();

        let insert = sqlx::query(
            "INSERT OR IGNORE INTO content_items (id, tenant_id, source_id, category, title, content, summary, published_at, expires_at, url, image_url, metadata_json, content_hash)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&source.tenant_id)
        .bind(&source.id)
        .bind(&source.category)
        .bind(&item.title)
        .bind(&truncated_content)
        .bind(&item.summary)
        .bind(item.published_at)
        .bind(item.expires_at)
        .bind(&item.url)
        .bind(&item.image_url)
        .bind("{}")
        .bind(&content_hash)
        .execute(pool)
        .await;

        match insert {
            Ok(outcome) if outcome.rows_affected() == 0 => {
                result.skipped_duplicate += 1;
                continue;
            }
            Ok(_) => {}
            Err(e) => {
                result.error = Some(e.to_string());
                continue;
            }
        }

        result.stored += 1;

        if source.should_embed {
            if let Some(client) = embedding_client {
                let embed_text = format!("{}\n{}", item.title, truncated_content);
                if let Ok(vector) = client.embed(&embed_text).await {
                    let blob = crate::embedding::vec_to_blob(&vector);
                    let _ = sqlx::query(
                        "INSERT OR REPLACE INTO content_vectors (content_item_id, tenant_id, embedding) VALUES (?, ?, ?)",
                    )
                    .bind(&id)
                    .bind(&source.tenant_id)
                    .bind(blob)
                    .execute(pool)
                    .await;

                    // providers don't report token counts for embedding calls; estimate
                    // from input length (~4 chars/token) for cost accounting purposes.
                    let estimated_tokens = (embed_text.chars().count() as i64 / 4).max(1);
                    let _ = usage::record_sampled(
                        pool,
                        &source.tenant_id,
                        "/ingest/embed",
                        client.model_name(),
                        estimated_tokens,
                        0,
                    )
                    .await;
                }
            }
        }
    }

    result
}

fn content_hash_for(connector_type: &str, item: &connectors::RawItem) -> String {
    match connector_type {
        "ical" => crate::connectors::ical::content_hash(item),
        "scrape" | "pdf" => item
            .url
            .as_deref()
            .map(crate::connectors::scrape::content_hash)
            .unwrap_or_else(|| crate::connectors::rss::content_hash(item)),
        _ => crate::connectors::rss::content_hash(item),
    }
}

async fn update_source_status(
    pool: &SqlitePool,
    source: &SourceConfig,
    result: &ConnectorResult,
) -> Result<(), sqlx::Error> {
    let now = Utc::now();
    let (last_error, error_count) = match &result.error {
        Some(e) => (Some(e.clone()), source.error_count + 1),
        None => (None, 0),
    };

    sqlx::query(
        "UPDATE source_configs SET last_fetched_at = ?, last_error = ?, error_count = ? WHERE id = ?",
    )
    .bind(now)
    .bind(last_error)
    .bind(error_count)
    .bind(&source.id)
    .execute(pool)
    .await?;

    Ok(())
}
