//! Hybrid Search (C5).
//!
//! Embeds a query, fans out to vector search (C4) over both the `chunks` and
//! `content` namespaces, dedups by URL keeping the maximum score, applies a
//! weighted rerank (semantic + lexical-overlap + recency + authority, plus
//! source-type boosts), expands same-document siblings, and truncates to the
//! intent's configured result count.

use std::collections::HashMap;

use chrono::Utc;
use sqlx::{Row, SqlitePool};

use crate::embedding_client::EmbeddingClient;
use crate::errors::AnswerError;
use crate::models::{RetrievedChunk, SourceRef};
use crate::query_router::RetrievalConfig;
use crate::vector_search::{self, Namespace};

#[derive(Debug, Clone)]
struct Candidate {
    id: String,
    document_id: Option<String>,
    chunk_index: Option<i64>,
    chunk_text: String,
    similarity: f32,
    published_at: Option<chrono::DateTime<Utc>>,
    source: SourceRef,
    namespace: Namespace,
    is_sibling: bool,
}

/// Runs hybrid search for one (already rewritten/expanded) query string
/// against a tenant's corpus, returning chunks ordered by weighted score.
pub async fn search(
    pool: &SqlitePool,
    embedding_client: &EmbeddingClient,
    tenant_id: &str,
    query: &str,
    retrieval: &RetrievalConfig,
) -> Result<Vec<RetrievedChunk>, AnswerError> {
    if query.trim().is_empty() {
        return Ok(Vec::new());
    }

    let embedding = embedding_client
        .embed(query)
        .await
        .map_err(AnswerError::Embedding)?;

    let candidate_count = retrieval.count * 3;

    let (chunk_hits, content_hits) = futures_util::future::join(
        vector_search::query(pool, Namespace::Chunks, tenant_id, &embedding, candidate_count),
        vector_search::query(pool, Namespace::Content, tenant_id, &embedding, candidate_count),
    )
    .await;

    let chunk_hits = chunk_hits?;
    let content_hits = content_hits?;

    let mut candidates = Vec::new();
    candidates.extend(fetch_chunk_candidates(pool, tenant_id, &chunk_hits).await?);
    candidates.extend(fetch_content_candidates(pool, tenant_id, &content_hits).await?);

    // dedup by URL, keeping the maximum similarity
    let mut best_by_url: HashMap<String, usize> = HashMap::new();
    let mut deduped: Vec<Candidate> = Vec::new();
    for candidate in candidates {
        let url_key = candidate
            .source
            .document_url
            .clone()
            .unwrap_or_else(|| candidate.id.clone());
        match best_by_url.get(&url_key) {
            Some(&idx) if deduped[idx].similarity >= candidate.similarity => continue,
            Some(&idx) => deduped[idx] = candidate,
            None => {
                best_by_url.insert(url_key, deduped.len());
                deduped.push(candidate);
            }
        }
    }

    let filtered: Vec<Candidate> = deduped
        .into_iter()
        .filter(|c| c.similarity >= retrieval.threshold)
        .collect();

    let reranked = rerank(filtered, query, retrieval);

    let expanded = expand_siblings(pool, tenant_id, reranked, retrieval).await?;

    let mut results: Vec<RetrievedChunk> = expanded
        .into_iter()
        .map(|(candidate, weighted_score)| RetrievedChunk {
            id: candidate.id,
            chunk_text: candidate.chunk_text,
            similarity: candidate.similarity,
            weighted_score,
            metadata: serde_json::json!({ "is_sibling": candidate.is_sibling }),
            source: candidate.source,
        })
        .collect();

    results.sort_by(|a, b| {
        b.weighted_score
            .partial_cmp(&a.weighted_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.similarity.partial_cmp(&a.similarity).unwrap_or(std::cmp::Ordering::Equal))
            .then_with(|| {
                a.source
                    .document_url
                    .as_deref()
                    .unwrap_or("")
                    .cmp(b.source.document_url.as_deref().unwrap_or(""))
            })
    });
    results.truncate(retrieval.count as usize);

    Ok(results)
}

async fn fetch_chunk_candidates(
    pool: &SqlitePool,
    tenant_id: &str,
    hits: &[vector_search::VectorHit],
) -> Result<Vec<Candidate>, sqlx::Error> {
    let mut out = Vec::with_capacity(hits.len());
    for hit in hits {
        let row = sqlx::query(
            "SELECT id, document_id, chunk_index, chunk_text, document_title, document_url, section, page_number, published_at
             FROM chunks WHERE id = ? AND tenant_id = ?",
        )
        .bind(&hit.id)
        .bind(tenant_id)
        .fetch_optional(pool)
        .await?;

        let Some(row) = row else { continue };

        let document_url: Option<String> = row.get("document_url");
        let document_title: Option<String> = row.get("document_title");
        out.push(Candidate {
            id: row.get("id"),
            document_id: Some(row.get("document_id")),
            chunk_index: Some(row.get::<i64, _>("chunk_index")),
            chunk_text: row.get("chunk_text"),
            similarity: hit.score,
            published_at: row.get("published_at"),
            source: SourceRef {
                source_id: hit.id.clone(),
                citation: document_title.clone(),
                document_title,
                document_url,
                section: row.get("section"),
                date: row
                    .get::<Option<chrono::DateTime<Utc>>, _>("published_at")
                    .map(|d| d.to_rfc3339()),
                page_number: row.get("page_number"),
            },
            namespace: Namespace::Chunks,
            is_sibling: false,
        });
    }
    Ok(out)
}

async fn fetch_content_candidates(
    pool: &SqlitePool,
    tenant_id: &str,
    hits: &[vector_search::VectorHit],
) -> Result<Vec<Candidate>, sqlx::Error> {
    let mut out = Vec::with_capacity(hits.len());
    for hit in hits {
        let row = sqlx::query(
            "SELECT id, title, content, url, category, published_at FROM content_items WHERE id = ? AND tenant_id = ?",
        )
        .bind(&hit.id)
        .bind(tenant_id)
        .fetch_optional(pool)
        .await?;

        let Some(row) = row else { continue };

        let title: String = row.get("title");
        let url: Option<String> = row.get("url");
        out.push(Candidate {
            id: row.get("id"),
            document_id: None,
            chunk_index: None,
            chunk_text: row.get("content"),
            similarity: hit.score,
            published_at: row.get("published_at"),
            source: SourceRef {
                source_id: hit.id.clone(),
                citation: Some(title.clone()),
                document_title: Some(title),
                document_url: url,
                section: row.get("category"),
                date: row
                    .get::<Option<chrono::DateTime<Utc>>, _>("published_at")
                    .map(|d| d.to_rfc3339()),
                page_number: None,
            },
            namespace: Namespace::Content,
            is_sibling: false,
        });
    }
    Ok(out)
}

/// Applies the weighted rerank: `semantic*0.60 + lexical*0.20 + recency*0.10
/// + authority*0.10` by default, with intent-specific recency/authority
/// weights and source-type boosts substituted in.
fn rerank(candidates: Vec<Candidate>, query: &str, retrieval: &RetrievalConfig) -> Vec<(Candidate, f32)> {
    let query_terms: Vec<String> = query
        .to_lowercase()
        .split_whitespace()
        .map(|s| s.to_string())
        .collect();

    let semantic_weight = 0.60_f32;
    let lexical_weight = 0.20_f32;
    let recency_weight = retrieval.recency_weight;
    let authority_weight = retrieval.authority_weight;

    candidates
        .into_iter()
        .map(|candidate| {
            let lexical = lexical_overlap(&query_terms, &candidate.chunk_text);
            let recency = recency_score(candidate.published_at);
            let authority = authority_score(&candidate);

            let mut score = candidate.similarity * semantic_weight
                + lexical * lexical_weight
                + recency * recency_weight
                + authority * authority_weight;

            for (source_type, boost) in retrieval.source_boosts {
                if candidate
                    .source
                    .section
                    .as_deref()
                    .map(|s| s.eq_ignore_ascii_case(source_type))
                    .unwrap_or(false)
                {
                    score += boost;
                }
            }

            (candidate, score.min(1.0))
        })
        .collect()
}

fn lexical_overlap(query_terms: &[String], text: &str) -> f32 {
    if query_terms.is_empty() {
        return 0.0;
    }
    let lower = text.to_lowercase();
    let matched = query_terms.iter().filter(|t| lower.contains(t.as_str())).count();
    matched as f32 / query_terms.len() as f32
}

fn recency_score(published_at: Option<chrono::DateTime<Utc>>) -> f32 {
    let Some(published_at) = published_at else {
        return 0.0;
    };
    let age_days = (Utc::now() - published_at).num_days().max(0) as f32;
    // decays to ~0 by one year old
    (1.0 - age_days / 365.0).clamp(0.0, 1.0)
}

fn authority_score(candidate: &Candidate) -> f32 {
    match candidate.namespace {
        Namespace::Chunks => 1.0, // municipal documents are the authoritative namespace
        Namespace::Content => 0.5,
    }
}

/// Expands each result with up to `sibling_expansion_count` same-document
/// chunks ordered by index-adjacency, scored at the parent's score minus
/// `0.01` per step of distance so siblings sort immediately after their
/// parent without displacing unrelated, higher-scoring chunks.
async fn expand_siblings(
    pool: &SqlitePool,
    tenant_id: &str,
    reranked: Vec<(Candidate, f32)>,
    retrieval: &RetrievalConfig,
) -> Result<Vec<(Candidate, f32)>, sqlx::Error> {
    if retrieval.sibling_expansion_count == 0 {
        return Ok(reranked);
    }

    let mut seen_ids: std::collections::HashSet<String> =
        reranked.iter().map(|(c, _)| c.id.clone()).collect();
    let mut out = reranked.clone();

    for (candidate, score) in &reranked {
        let (Some(document_id), Some(chunk_index)) = (&candidate.document_id, candidate.chunk_index) else {
            continue;
        };

        let rows = sqlx::query(
            "SELECT id, document_id, chunk_index, chunk_text, document_title, document_url, section, page_number, published_at
             FROM chunks WHERE document_id = ? AND tenant_id = ? AND chunk_index != ?
             ORDER BY ABS(chunk_index - ?) ASC
             LIMIT ?",
        )
        .bind(document_id)
        .bind(tenant_id)
        .bind(chunk_index)
        .bind(chunk_index)
        .bind(retrieval.sibling_expansion_count as i64)
        .fetch_all(pool)
        .await?;

        for row in rows {
            let id: String = row.get("id");
            if !seen_ids.insert(id.clone()) {
                continue;
            }
            let sibling_index: i64 = row.get("chunk_index");
            let distance = (sibling_index - chunk_index).unsigned_abs();
            let document_url: Option<String> = row.get("document_url");
            let document_title: Option<String> = row.get("document_title");
            let sibling = Candidate {
                id: id.clone(),
                document_id: Some(row.get("document_id")),
                chunk_index: Some(sibling_index),
                chunk_text: row.get("chunk_text"),
                similarity: candidate.similarity,
                published_at: row.get("published_at"),
                source: SourceRef {
                    source_id: id,
                    citation: document_title.clone(),
                    document_title,
                    document_url,
                    section: row.get("section"),
                    date: row
                        .get::<Option<chrono::DateTime<Utc>>, _>("published_at")
                        .map(|d| d.to_rfc3339()),
                    page_number: row.get("page_number"),
                },
                namespace: Namespace::Chunks,
                is_sibling: true,
            };
            let sibling_score = (score - 0.01 * distance as f32).max(0.0);
            out.push((sibling, sibling_score));
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lexical_overlap_is_fraction_of_matched_terms() {
        let terms = vec!["trash".to_string(), "pickup".to_string()];
        assert_eq!(lexical_overlap(&terms, "trash day is monday"), 0.5);
        assert_eq!(lexical_overlap(&terms, "trash pickup is monday"), 1.0);
        assert_eq!(lexical_overlap(&terms, "unrelated text"), 0.0);
    }

    #[test]
    fn recency_score_favors_newer_content() {
        let now = Utc::now();
        let fresh = recency_score(Some(now));
        let old = recency_score(Some(now - chrono::Duration::days(400)));
        assert!(fresh > old);
        assert_eq!(old, 0.0);
    }
}
