//! Answer Cache (C3).
//!
//! A durable SQLite-backed cache keyed by `(tenant_id, normalized question)`,
//! checked first in the answer composer (C8) before retrieval or generation
//! runs. A plain `INSERT ... ON CONFLICT DO UPDATE` against a single-table
//! schema, same upsert style as the embedding-storage paths.

use chrono::Utc;
use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};

use crate::models::{CachedAnswer, SourceRef};

/// Normalizes a question into a cache key: lowercased, trimmed, whitespace
/// collapsed, then hashed together with the tenant so unrelated tenants never
/// collide even on an identical question.
pub fn cache_key(tenant_id: &str, question: &str) -> String {
    let normalized = question
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let mut hasher = Sha256::new();
    hasher.update(tenant_id.as_bytes());
    hasher.update(b"\0");
    hasher.update(normalized.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Looks up a cached answer, returning `None` if absent or expired.
pub async fn get(pool: &SqlitePool, tenant_id: &str, question: &str) -> Result<Option<CachedAnswer>, sqlx::Error> {
    let key = cache_key(tenant_id, question);
    let row = sqlx::query(
        "SELECT key, answer_text, sources_json, stored_at, ttl_seconds FROM answer_cache WHERE key = ? AND tenant_id = ?",
    )
    .bind(&key)
    .bind(tenant_id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let stored_at: chrono::DateTime<Utc> = row.get("stored_at");
    let ttl_seconds: i64 = row.get("ttl_seconds");
    if Utc::now() - stored_at >= chrono::Duration::seconds(ttl_seconds) {
        return Ok(None);
    }

    let sources_json: String = row.get("sources_json");
    let sources: Vec<SourceRef> = serde_json::from_str(&sources_json).unwrap_or_default();

    Ok(Some(CachedAnswer {
        key: row.get("key"),
        answer_text: row.get("answer_text"),
        sources,
        stored_at,
        ttl_seconds,
    }))
}

/// Stores (or replaces) a finished answer. Called fire-and-forget from the
/// answer composer after a stream completes successfully.
pub async fn put(
    pool: &SqlitePool,
    tenant_id: &str,
    question: &str,
    answer_text: &str,
    sources: &[SourceRef],
    ttl_seconds: i64,
) -> Result<(), sqlx::Error> {
    let key = cache_key(tenant_id, question);
    let sources_json = serde_json::to_string(sources).unwrap_or_else(|_| "[]".to_string());
    let now = Utc::now();

    sqlx::query(
        "INSERT INTO answer_cache (key, tenant_id, answer_text, sources_json, stored_at, ttl_seconds)
         VALUES (?, ?, ?, ?, ?, ?)
         ON CONFLICT(key) DO UPDATE SET
            answer_text = excluded.answer_text,
            sources_json = excluded.sources_json,
            stored_at = excluded.stored_at,
            ttl_seconds = excluded.ttl_seconds",
    )
    .bind(&key)
    .bind(tenant_id)
    .bind(answer_text)
    .bind(&sources_json)
    .bind(now)
    .bind(ttl_seconds)
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_is_whitespace_and_case_insensitive() {
        let a = cache_key("town-a", "What time does   Town Hall  open?");
        let b = cache_key("town-a", "what time does town hall open?");
        assert_eq!(a, b);
    }

    #[test]
    fn cache_key_differs_across_tenants() {
        let a = cache_key("town-a", "same question");
        let b = cache_key("town-b", "same question");
        assert_ne!(a, b);
    }
}
