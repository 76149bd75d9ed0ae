//! `/content` endpoint logic.
//!
//! Offset-paginated listing of normalized [`ContentItem`]s for a tenant,
//! filterable by category and source, excluding items past their
//! `expires_at`.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

use crate::models::ContentItem;

const DEFAULT_LIMIT: i64 = 20;
const MAX_LIMIT: i64 = 100;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ContentQuery {
    pub category: Option<String>,
    pub source_id: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContentPage {
    pub items: Vec<ContentItem>,
    pub total: i64,
    #[serde(rename = "hasMore")]
    pub has_more: bool,
    pub offset: i64,
    pub limit: i64,
}

pub async fn list(
    pool: &SqlitePool,
    tenant_id: &str,
    query: &ContentQuery,
) -> Result<ContentPage, sqlx::Error> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = query.offset.unwrap_or(0).max(0);

    let mut filter_sql = " WHERE tenant_id = ? AND (expires_at IS NULL OR expires_at > ?)".to_string();
    if query.category.is_some() {
        filter_sql.push_str(" AND category = ?");
    }
    if query.source_id.is_some() {
        filter_sql.push_str(" AND source_id = ?");
    }

    let mut count_q = sqlx::query(&format!("SELECT COUNT(*) AS n FROM content_items{filter_sql}"))
        .bind(tenant_id)
        .bind(Utc::now());
    if let Some(category) = &query.category {
        count_q = count_q.bind(category);
    }
    if let Some(source_id) = &query.source_id {
        count_q = count_q.bind(source_id);
    }
    let total: i64 = count_q.fetch_one(pool).await?.get("n");

    let list_sql = format!(
        "SELECT id, tenant_id, source_id, category, title, content, summary, published_at, expires_at, url, image_url, metadata_json, content_hash
         FROM content_items{filter_sql} ORDER BY published_at DESC NULLS LAST, id DESC LIMIT ? OFFSET ?"
    );
    let mut q = sqlx::query(&list_sql).bind(tenant_id).bind(Utc::now());
    if let Some(category) = &query.category {
        q = q.bind(category);
    }
    if let Some(source_id) = &query.source_id {
        q = q.bind(source_id);
    }
    q = q.bind(limit).bind(offset);

    let rows = q.fetch_all(pool).await?;

    let items: Vec<ContentItem> = rows
        .into_iter()
        .map(|row| ContentItem {
            id: row.get("id"),
            tenant_id: row.get("tenant_id"),
            source_id: row.get("source_id"),
            category: row.get("category"),
            title: row.get("title"),
            content: row.get("content"),
            summary: row.get("summary"),
            published_at: row.get("published_at"),
            expires_at: row.get("expires_at"),
            url: row.get("url"),
            image_url: row.get("image_url"),
            metadata: serde_json::from_str(&row.get::<String, _>("metadata_json")).unwrap_or(serde_json::json!({})),
            content_hash: row.get("content_hash"),
        })
        .collect();

    let has_more = offset + items.len() as i64 < total;

    Ok(ContentPage {
        items,
        total,
        has_more,
        offset,
        limit,
    })
}
