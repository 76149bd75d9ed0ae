//! Change Monitor (C11).
//!
//! For each tracked `documents` row, issues an HTTP HEAD and compares ETag,
//! Last-Modified, and Content-Length against the stored values to detect
//! drift without re-downloading and re-chunking unchanged pages. Flags
//! documents past the configured staleness horizon and appends one
//! `ingestion_log` row per run.

use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::config::Config;

const HEAD_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Serialize)]
pub struct ChangeMonitorReport {
    pub checked: i64,
    pub changed: Vec<String>,
    pub new_count: i64,
    pub errors: i64,
    pub duration_ms: i64,
}

struct DocumentSnapshot {
    id: String,
    url: String,
    content_hash: Option<String>,
    last_verified_at: Option<chrono::DateTime<Utc>>,
}

/// Runs change detection for one tenant. `triggered_by` is recorded in the
/// ingestion log's detail blob for audit (cron vs manual vs CLI).
pub async fn run(
    pool: &SqlitePool,
    config: &Config,
    tenant_id: &str,
    triggered_by: &str,
) -> Result<ChangeMonitorReport, sqlx::Error> {
    let started_at = Utc::now();
    let client = reqwest::Client::builder()
        .timeout(HEAD_TIMEOUT)
        .build()
        .expect("reqwest client builds");

    let documents = load_documents(pool, tenant_id).await?;
    let mut changed = Vec::new();
    let mut errors = 0_i64;
    let staleness_horizon = chrono::Duration::days(config.geography.staleness_horizon_days);

    for doc in &documents {
        let mut new_fingerprint = None;
        match fetch_fingerprint(&client, doc).await {
            Ok(Some(fingerprint)) => {
                if doc.content_hash.as_deref() != Some(fingerprint.as_str()) {
                    changed.push(doc.url.clone());
                    new_fingerprint = Some(fingerprint);
                }
            }
            Ok(None) => {}
            Err(_) => errors += 1,
        }

        let is_stale = doc
            .last_verified_at
            .map(|t| Utc::now() - t > staleness_horizon)
            .unwrap_or(true);

        let _ = sqlx::query(
            "UPDATE documents SET last_verified_at = ?, is_stale = ?, content_hash = COALESCE(?, content_hash) WHERE id = ?",
        )
        .bind(Utc::now())
        .bind(is_stale as i64)
        .bind(new_fingerprint)
        .bind(&doc.id)
        .execute(pool)
        .await;
    }

    let finished_at = Utc::now();
    let report = ChangeMonitorReport {
        checked: documents.len() as i64,
        changed: changed.clone(),
        new_count: 0,
        errors,
        duration_ms: (finished_at - started_at).num_milliseconds(),
    };

    let detail = serde_json::json!({ "triggeredBy": triggered_by, "changedUrls": changed });
    sqlx::query(
        "INSERT INTO ingestion_log (id, tenant_id, run_kind, started_at, finished_at, checked, changed_count, new_count, error_count, detail_json)
         VALUES (?, ?, 'monitor', ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(tenant_id)
    .bind(started_at)
    .bind(finished_at)
    .bind(report.checked)
    .bind(report.changed.len() as i64)
    .bind(report.new_count)
    .bind(report.errors)
    .bind(detail.to_string())
    .execute(pool)
    .await?;

    Ok(report)
}

async fn load_documents(pool: &SqlitePool, tenant_id: &str) -> Result<Vec<DocumentSnapshot>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT id, url, content_hash, last_verified_at FROM documents WHERE tenant_id = ?",
    )
    .bind(tenant_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| DocumentSnapshot {
            id: row.get("id"),
            url: row.get("url"),
            content_hash: row.get("content_hash"),
            last_verified_at: row.get("last_verified_at"),
        })
        .collect())
}

/// Fetches `doc.url`'s ETag/Last-Modified/Content-Length and combines them
/// into a single comparable fingerprint, or `None` if the server sent none of
/// those headers (in which case no change can be inferred cheaply).
async fn fetch_fingerprint(
    client: &reqwest::Client,
    doc: &DocumentSnapshot,
) -> Result<Option<String>, reqwest::Error> {
    let resp = client.head(&doc.url).send().await?;
    let headers = resp.headers();

    let etag = headers.get("etag").and_then(|v| v.to_str().ok()).map(str::to_string);
    let last_modified = headers
        .get("last-modified")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let content_length = headers
        .get("content-length")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let fingerprint = [etag, last_modified, content_length]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join("|");

    if fingerprint.is_empty() {
        Ok(None)
    } else {
        Ok(Some(fingerprint))
    }
}
