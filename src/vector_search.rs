//! Vector Search (C4).
//!
//! `query(namespace, embedding, top_k, filter?) -> [{id, score, metadata}]`.
//! The vector index is realized as SQLite BLOB columns queried via a brute-force
//! cosine scan scoped by tenant_id, built on the existing `vec_to_blob`/
//! `blob_to_vec`/`cosine_similarity` utilities rather than a native vector-index
//! extension (see DESIGN.md). The caller supplies the embedding; this module
//! never embeds.

use sqlx::{Row, SqlitePool};

use crate::embedding::{blob_to_vec, cosine_similarity};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    Chunks,
    Content,
}

#[derive(Debug, Clone)]
pub struct VectorHit {
    pub id: String,
    pub score: f32,
}

/// Queries `namespace` for the `top_k` nearest neighbors of `embedding` within
/// `tenant_id`. Returns hits sorted by score descending.
pub async fn query(
    pool: &SqlitePool,
    namespace: Namespace,
    tenant_id: &str,
    embedding: &[f32],
    top_k: i64,
) -> Result<Vec<VectorHit>, sqlx::Error> {
    if top_k <= 0 || embedding.is_empty() {
        return Ok(Vec::new());
    }

    let (table, id_col) = match namespace {
        Namespace::Chunks => ("chunk_vectors", "chunk_id"),
        Namespace::Content => ("content_vectors", "content_item_id"),
    };

    let query = format!("SELECT {id_col} AS id, embedding FROM {table} WHERE tenant_id = ?");
    let rows = sqlx::query(&query).bind(tenant_id).fetch_all(pool).await?;

    let mut hits: Vec<VectorHit> = rows
        .into_iter()
        .map(|row| {
            let id: String = row.get("id");
            let blob: Vec<u8> = row.get("embedding");
            let vector = blob_to_vec(&blob);
            let score = cosine_similarity(embedding, &vector);
            VectorHit { id, score }
        })
        .collect();

    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    hits.truncate(top_k as usize);

    Ok(hits)
}
