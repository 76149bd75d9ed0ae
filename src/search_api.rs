//! `/search` endpoint logic.
//!
//! A thinner sibling of the answer composer: runs hybrid search (C5) for a
//! raw query and returns ranked snippets without generating an LLM answer.
//! Used by callers that want citations/snippets directly rather than a
//! synthesized response.

use serde::Serialize;
use sqlx::SqlitePool;

use crate::embedding_client::EmbeddingClient;
use crate::errors::AnswerError;
use crate::hybrid_search;
use crate::query_router::{self, Intent};

const SNIPPET_MAX_CHARS: usize = 280;
pub const DEFAULT_LIMIT: i64 = 20;
pub const MAX_LIMIT: i64 = 20;

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub id: String,
    pub title: String,
    pub snippet: String,
    pub source_url: Option<String>,
    pub department: Option<String>,
    pub date: Option<String>,
    pub similarity: f32,
    pub highlights: Vec<String>,
}

/// Runs a plain retrieval query (factual intent's retrieval tuning) and
/// returns deduplicated, snippeted results capped at `limit` (clamped to
/// [1, 20]).
pub async fn search(
    pool: &SqlitePool,
    embedding_client: &EmbeddingClient,
    tenant_id: &str,
    query: &str,
    min_similarity: f32,
    limit: i64,
) -> Result<Vec<SearchResult>, AnswerError> {
    let retrieval = query_router::retrieval_config_for(Intent::Factual);
    let retrieved = hybrid_search::search(pool, embedding_client, tenant_id, query, retrieval).await?;

    let query_terms: Vec<String> = query
        .to_lowercase()
        .split_whitespace()
        .map(|s| s.to_string())
        .collect();

    let mut by_url: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
    let mut results: Vec<SearchResult> = Vec::new();

    for chunk in retrieved.into_iter().filter(|c| c.similarity >= min_similarity) {
        let url_key = chunk
            .source
            .document_url
            .clone()
            .unwrap_or_else(|| chunk.id.clone());

        let candidate = SearchResult {
            id: chunk.id.clone(),
            title: chunk.source.document_title.clone().unwrap_or_else(|| "Untitled".to_string()),
            snippet: truncate_snippet(&chunk.chunk_text, SNIPPET_MAX_CHARS),
            source_url: chunk.source.document_url.clone(),
            department: chunk.source.section.clone(),
            date: chunk.source.date.clone(),
            similarity: chunk.similarity,
            highlights: extract_highlights(&chunk.chunk_text, &query_terms),
        };

        match by_url.get(&url_key) {
            Some(&idx) if results[idx].similarity >= candidate.similarity => continue,
            Some(&idx) => results[idx] = candidate,
            None => {
                by_url.insert(url_key, results.len());
                results.push(candidate);
            }
        }
    }

    results.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(std::cmp::Ordering::Equal));
    let limit = limit.clamp(1, MAX_LIMIT) as usize;
    results.truncate(limit);
    Ok(results)
}

/// Picks up to 3 sentences containing a query term, for UI highlighting.
fn extract_highlights(text: &str, query_terms: &[String]) -> Vec<String> {
    if query_terms.is_empty() {
        return Vec::new();
    }
    text.split(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter(|s| {
            let lower = s.to_lowercase();
            query_terms.iter().any(|t| lower.contains(t.as_str()))
        })
        .take(3)
        .map(|s| s.to_string())
        .collect()
}

/// Truncates `text` to at most `max_chars`, backing off to the preceding word
/// boundary and appending an ellipsis when truncation occurred.
fn truncate_snippet(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }

    let truncated: String = trimmed.chars().take(max_chars).collect();
    let cut = truncated.rfind(' ').unwrap_or(truncated.len());
    format!("{}…", &truncated[..cut])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snippet_under_limit_is_unchanged() {
        assert_eq!(truncate_snippet("short text", 280), "short text");
    }

    #[test]
    fn snippet_over_limit_truncates_at_word_boundary() {
        let long = "word ".repeat(100);
        let snippet = truncate_snippet(&long, 20);
        assert!(snippet.ends_with('…'));
        assert!(!snippet.trim_end_matches('…').ends_with(' '));
    }

    #[test]
    fn highlights_only_include_sentences_with_query_terms() {
        let text = "Trash pickup is Tuesday. The park reopens in spring. Call public works for bulk pickup.";
        let terms = vec!["pickup".to_string()];
        let highlights = extract_highlights(text, &terms);
        assert_eq!(highlights.len(), 2);
        assert!(highlights.iter().all(|h| h.to_lowercase().contains("pickup")));
    }
}
