//! Paragraph-boundary text chunker.
//!
//! Splits document body text into [`Chunk`]s that respect a configurable
//! `max_tokens` limit. Splitting occurs on paragraph boundaries (`\n\n`)
//! to preserve semantic coherence within each chunk.
//!
//! Each chunk receives a deterministic UUID and carries the document metadata
//! (title, url, section, page, date) that the answer composer attaches as a
//! citation.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::Chunk;

/// Approximate chars-per-token ratio.
const CHARS_PER_TOKEN: usize = 4;

/// Metadata carried by every chunk produced from one document.
#[derive(Debug, Clone, Default)]
pub struct ChunkMeta {
    pub document_title: Option<String>,
    pub document_url: Option<String>,
    pub section: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

/// Split text into chunks on paragraph boundaries, respecting max_tokens.
/// Returns chunks with contiguous indices starting at 0.
pub fn chunk_text(
    tenant_id: &str,
    document_id: &str,
    text: &str,
    max_tokens: usize,
    meta: &ChunkMeta,
) -> Vec<Chunk> {
    let max_chars = max_tokens * CHARS_PER_TOKEN;

    if text.is_empty() {
        return vec![make_chunk(tenant_id, document_id, 0, text, meta)];
    }

    let paragraphs: Vec<&str> = text.split("\n\n").collect();
    let mut chunks = Vec::new();
    let mut current_buf = String::new();
    let mut chunk_index: i64 = 0;

    for para in paragraphs {
        let trimmed = para.trim();
        if trimmed.is_empty() {
            continue;
        }

        let would_be = if current_buf.is_empty() {
            trimmed.len()
        } else {
            current_buf.len() + 2 + trimmed.len()
        };

        if would_be > max_chars && !current_buf.is_empty() {
            chunks.push(make_chunk(
                tenant_id,
                document_id,
                chunk_index,
                &current_buf,
                meta,
            ));
            chunk_index += 1;
            current_buf.clear();
        }

        if trimmed.len() > max_chars {
            if !current_buf.is_empty() {
                chunks.push(make_chunk(
                    tenant_id,
                    document_id,
                    chunk_index,
                    &current_buf,
                    meta,
                ));
                chunk_index += 1;
                current_buf.clear();
            }
            let mut remaining = trimmed;
            while !remaining.is_empty() {
                let split_at = remaining.len().min(max_chars);
                let actual_split = if split_at < remaining.len() {
                    remaining[..split_at]
                        .rfind('\n')
                        .or_else(|| remaining[..split_at].rfind(' '))
                        .map(|pos| pos + 1)
                        .unwrap_or(split_at)
                } else {
                    split_at
                };
                let piece = &remaining[..actual_split];
                chunks.push(make_chunk(
                    tenant_id,
                    document_id,
                    chunk_index,
                    piece.trim(),
                    meta,
                ));
                chunk_index += 1;
                remaining = &remaining[actual_split..];
            }
        } else {
            if !current_buf.is_empty() {
                current_buf.push_str("\n\n");
            }
            current_buf.push_str(trimmed);
        }
    }

    if !current_buf.is_empty() {
        chunks.push(make_chunk(
            tenant_id,
            document_id,
            chunk_index,
            &current_buf,
            meta,
        ));
    }

    if chunks.is_empty() {
        chunks.push(make_chunk(tenant_id, document_id, 0, text.trim(), meta));
    }

    chunks
}

fn make_chunk(
    tenant_id: &str,
    document_id: &str,
    index: i64,
    text: &str,
    meta: &ChunkMeta,
) -> Chunk {
    Chunk {
        id: Uuid::new_v4().to_string(),
        tenant_id: tenant_id.to_string(),
        document_id: document_id.to_string(),
        chunk_index: index,
        chunk_text: text.to_string(),
        document_title: meta.document_title.clone(),
        document_url: meta.document_url.clone(),
        section: meta.section.clone(),
        page_number: None,
        published_at: meta.published_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> ChunkMeta {
        ChunkMeta::default()
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = chunk_text("T", "doc1", "Hello, world!", 700, &meta());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].chunk_text, "Hello, world!");
    }

    #[test]
    fn test_empty_text() {
        let chunks = chunk_text("T", "doc1", "", 700, &meta());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
    }

    #[test]
    fn test_multiple_paragraphs_under_limit() {
        let text = "First paragraph.\n\nSecond paragraph.\n\nThird paragraph.";
        let chunks = chunk_text("T", "doc1", text, 700, &meta());
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].chunk_text.contains("First paragraph."));
        assert!(chunks[0].chunk_text.contains("Third paragraph."));
    }

    #[test]
    fn test_multiple_paragraphs_exceed_limit() {
        let text = "This is paragraph one.\n\nThis is paragraph two.\n\nThis is paragraph three.";
        let chunks = chunk_text("T", "doc1", text, 5, &meta());
        assert!(chunks.len() > 1);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64);
        }
    }

    #[test]
    fn test_chunk_indices_contiguous() {
        let text = (0..50)
            .map(|i| format!("Paragraph number {}.", i))
            .collect::<Vec<_>>()
            .join("\n\n");
        let chunks = chunk_text("T", "doc1", &text, 10, &meta());
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64, "Index mismatch at position {}", i);
        }
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha\n\nBeta\n\nGamma\n\nDelta";
        let c1 = chunk_text("T", "doc1", text, 5, &meta());
        let c2 = chunk_text("T", "doc1", text, 5, &meta());
        assert_eq!(c1.len(), c2.len());
        for (a, b) in c1.iter().zip(c2.iter()) {
            assert_eq!(a.chunk_text, b.chunk_text);
            assert_eq!(a.chunk_index, b.chunk_index);
        }
    }
}
