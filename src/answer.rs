//! Answer Composer (C8).
//!
//! Checks the answer cache (C3), runs retrieval when there's a miss, streams
//! the model's response as Server-Sent Events, and persists usage (C12) and a
//! fresh cache entry (C3) once the stream closes. Event ordering:
//! `data-confidence` → `data-sources` → `data-response-id` → `text-start` →
//! `text-delta`* → `text-end` → an optional final `data-sources`.

use std::convert::Infallible;
use std::sync::Arc;

use axum::response::sse::{Event, Sse};
use futures_util::stream::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

use crate::config::{Config, TenantConfig};
use crate::confidence::{self, Confidence};
use crate::embedding_client::EmbeddingClient;
use crate::errors::AnswerError;
use crate::models::{ChatMessage, RetrievedChunk, SourceRef};
use crate::query_router;
use crate::{answer_cache, hybrid_search, usage};

pub struct AnswerDeps {
    pub pool: sqlx::SqlitePool,
    pub embedding_client: Arc<EmbeddingClient>,
    pub config: Config,
}

/// Composes an answer to the conversation's latest user turn for `tenant_id`,
/// returning an SSE response whose body streams until the answer is fully
/// generated (or served from cache). Fire-and-forget usage/cache writes
/// happen after the body channel closes and never block it.
pub async fn compose(
    deps: Arc<AnswerDeps>,
    tenant_id: String,
    messages: Vec<ChatMessage>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AnswerError> {
    let question = messages
        .iter()
        .rev()
        .find(|m| m.role == "user")
        .map(|m| m.content.clone())
        .ok_or_else(|| AnswerError::InvalidInput("messages must include a user turn".to_string()))?;

    if question.trim().is_empty() {
        return Err(AnswerError::InvalidInput("question must not be empty".to_string()));
    }

    let has_prior_assistant_turn = messages.iter().any(|m| m.role == "assistant");

    let (tx, rx) = mpsc::channel::<Event>(64);

    tokio::spawn(async move {
        if let Err(e) = run(deps, tenant_id, question, has_prior_assistant_turn, tx).await {
            tracing::error!(error = %e, "answer composition failed");
        }
    });

    Ok(Sse::new(ReceiverStream::new(rx).map(Ok)))
}

async fn run(
    deps: Arc<AnswerDeps>,
    tenant_id: String,
    question: String,
    has_prior_assistant_turn: bool,
    tx: mpsc::Sender<Event>,
) -> Result<(), AnswerError> {
    if let Some(cached) = answer_cache::get(&deps.pool, &tenant_id, &question)
        .await
        .map_err(AnswerError::Store)?
    {
        emit_cached(&tx, &cached).await;
        return Ok(());
    }

    let router_config = &deps.config.llm;
    let decomposition = query_router::decompose(router_config, &question).await;
    let primary = decomposition
        .sub_queries
        .first()
        .cloned()
        .unwrap_or_else(|| query_router::SubQuery {
            query: question.clone(),
            intent: "factual".to_string(),
            source_hint: vec!["any".to_string()],
            priority: 0,
        });

    let rewritten = query_router::rewrite(router_config, &primary.query)
        .await
        .unwrap_or_else(|| primary.query.clone());

    let intent = query_router::intent_of(&primary);
    let retrieval_config = query_router::retrieval_config_for(intent);

    let retrieved = hybrid_search::search(
        &deps.pool,
        &deps.embedding_client,
        &tenant_id,
        &rewritten,
        retrieval_config,
    )
    .await?;

    if retrieved.is_empty() {
        emit_fallback(&tx, deps.config.tenant(&tenant_id)).await;
        return Ok(());
    }

    let similarities: Vec<f32> = retrieved.iter().map(|r| r.similarity).collect();
    let confidence = confidence::score(&similarities, Default::default());
    let sources: Vec<SourceRef> = retrieved.iter().map(|r| r.source.clone()).collect();
    let response_id = Uuid::new_v4().to_string();

    emit_event(&tx, "data-confidence", &confidence).await;
    emit_event(&tx, "data-sources", &sources).await;
    emit_event(&tx, "data-response-id", &serde_json::json!({ "responseId": response_id })).await;
    send_event(&tx, Event::default().event("text-start").data("")).await;

    let system_prompt = build_system_prompt(&retrieved, deps.config.tenant(&tenant_id), has_prior_assistant_turn);
    let (llm_tx, mut llm_rx) = mpsc::channel::<String>(64);

    let llm_config = deps.config.llm.clone();
    let question_for_llm = question.clone();
    let llm_task = tokio::spawn(async move {
        crate::llm_client::stream_complete(&llm_config, &system_prompt, &question_for_llm, llm_tx).await
    });

    let mut accumulated = String::new();
    while let Some(delta) = llm_rx.recv().await {
        accumulated.push_str(&delta);
        send_event(
            &tx,
            Event::default()
                .event("text-delta")
                .data(serde_json::json!({ "delta": delta }).to_string()),
        )
        .await;
    }

    let llm_result = llm_task.await.map_err(|e| AnswerError::InvalidInput(e.to_string()))?;

    let (full_text, token_usage) = match llm_result {
        Ok(result) => result,
        Err(e) => {
            tracing::error!(error = %e, "LLM generation failed mid-stream");
            (accumulated, None)
        }
    };

    let (displayed_text, used_source_ids) = parse_used_sources(&full_text);

    send_event(&tx, Event::default().event("text-end").data("")).await;

    let used_sources: Vec<SourceRef> = match &used_source_ids {
        None => sources.clone(),
        Some(ids) => sources
            .iter()
            .filter(|s| ids.iter().any(|id| id.eq_ignore_ascii_case(&s.source_id)))
            .cloned()
            .collect(),
    };

    if used_source_ids.is_some() {
        emit_event(&tx, "data-sources", &used_sources).await;
    }

    if let Some(token_usage) = token_usage {
        let _ = usage::record(
            &deps.pool,
            &tenant_id,
            "/answer",
            deps.config.llm.model.as_deref().unwrap_or("unknown"),
            token_usage.prompt_tokens,
            token_usage.completion_tokens,
        )
        .await;
    }

    let ttl = deps.config.cache.answer_cache_ttl_secs;
    let _ = answer_cache::put(&deps.pool, &tenant_id, &question, &displayed_text, &used_sources, ttl).await;

    Ok(())
}

/// Builds the system prompt, including a disclaimer only on the first turn of
/// a conversation — a returning user who already has an assistant reply in
/// their history has seen it once and doesn't need it repeated every turn.
fn build_system_prompt(retrieved: &[RetrievedChunk], tenant: Option<&TenantConfig>, has_prior_assistant_turn: bool) -> String {
    let mut prompt = String::from(
        "You are a municipal information assistant. Answer only from the numbered sources below. \
         Cite sources inline using their bracketed id, e.g. [S1]. \
         If the sources do not answer the question, say so plainly. \
         End your response with a line: USED_SOURCES: <comma-separated source ids you actually cited, or NONE>.\n\n",
    );

    if let Some(tenant) = tenant {
        prompt.push_str(&format!("You serve residents of {}.\n\n", tenant.name));
    }

    if !has_prior_assistant_turn {
        prompt.push_str(
            "This is informational only and does not replace official municipal records; \
             residents should confirm time-sensitive details directly with the relevant department.\n\n",
        );
    }

    for (i, chunk) in retrieved.iter().enumerate() {
        prompt.push_str(&format!("[S{}] {}\n", i + 1, chunk.chunk_text));
    }

    prompt
}

/// Parses the `USED_SOURCES: ...` trailer, returning the displayed text with
/// the marker stripped and the referenced source ids (uppercased, order
/// preserved). Distinguishes three cases: no marker at all (`None`, keep the
/// full candidate set), `USED_SOURCES: NONE` (`Some(vec![])`, filter to
/// nothing), and a comma-separated id list (`Some(ids)`, filter to those ids).
fn parse_used_sources(full_text: &str) -> (String, Option<Vec<String>>) {
    let marker = full_text
        .lines()
        .enumerate()
        .rev()
        .find(|(_, line)| line.to_uppercase().trim_start().starts_with("USED_SOURCES:"));

    let Some((idx, line)) = marker else {
        return (full_text.to_string(), None);
    };

    let ids_part = line
        .splitn(2, ':')
        .nth(1)
        .unwrap_or("")
        .trim();

    let ids: Vec<String> = if ids_part.eq_ignore_ascii_case("NONE") || ids_part.is_empty() {
        Vec::new()
    } else {
        ids_part
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect()
    };

    let displayed = full_text
        .lines()
        .enumerate()
        .filter(|(i, _)| *i != idx)
        .map(|(_, l)| l)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string();

    (displayed, Some(ids))
}

async fn emit_cached(tx: &mpsc::Sender<Event>, cached: &crate::models::CachedAnswer) {
    let confidence = confidence::cache_hit();
    let response_id = Uuid::new_v4().to_string();

    emit_event(tx, "data-confidence", &confidence).await;
    emit_event(tx, "data-sources", &cached.sources).await;
    emit_event(tx, "data-response-id", &serde_json::json!({ "responseId": response_id })).await;
    send_event(tx, Event::default().event("text-start").data("")).await;
    send_event(
        tx,
        Event::default()
            .event("text-delta")
            .data(serde_json::json!({ "delta": cached.answer_text }).to_string()),
    )
    .await;
    send_event(tx, Event::default().event("text-end").data("")).await;
}

async fn emit_fallback(tx: &mpsc::Sender<Event>, tenant: Option<&TenantConfig>) {
    let confidence = confidence::score(&[], Default::default());
    let response_id = Uuid::new_v4().to_string();

    let mut message = "I couldn't find anything in our records to answer that.".to_string();
    if let Some(tenant) = tenant {
        if let Some(phone) = &tenant.phone {
            message.push_str(&format!(" Please call {phone} for assistance."));
        } else if let Some(url) = &tenant.fallback_url {
            message.push_str(&format!(" You can find more information at {url}."));
        }
    }

    emit_event(tx, "data-confidence", &confidence).await;
    emit_event(tx, "data-sources", &Vec::<SourceRef>::new()).await;
    emit_event(tx, "data-response-id", &serde_json::json!({ "responseId": response_id })).await;
    send_event(tx, Event::default().event("text-start").data("")).await;
    send_event(
        tx,
        Event::default()
            .event("text-delta")
            .data(serde_json::json!({ "delta": message }).to_string()),
    )
    .await;
    send_event(tx, Event::default().event("text-end").data("")).await;
}

async fn emit_event<T: serde::Serialize>(tx: &mpsc::Sender<Event>, name: &'static str, payload: &T) {
    let data = serde_json::to_string(payload).unwrap_or_else(|_| "{}".to_string());
    send_event(tx, Event::default().event(name).data(data)).await;
}

async fn send_event(tx: &mpsc::Sender<Event>, event: Event) {
    let _ = tx.send(event).await;
}

#[allow(dead_code)]
fn confidence_reason(confidence: &Confidence) -> &str {
    &confidence.reason
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disclaimer_appears_only_without_prior_assistant_turn() {
        let first_turn = build_system_prompt(&[], None, false);
        let later_turn = build_system_prompt(&[], None, true);
        assert!(first_turn.contains("does not replace official municipal records"));
        assert!(!later_turn.contains("does not replace official municipal records"));
    }

    #[test]
    fn parses_used_sources_and_strips_marker() {
        let text = "The office opens at 9am [S1].\nUSED_SOURCES: s1";
        let (displayed, ids) = parse_used_sources(text);
        assert_eq!(displayed, "The office opens at 9am [S1].");
        assert_eq!(ids, Some(vec!["S1".to_string()]));
    }

    #[test]
    fn none_marker_yields_empty_filtered_sources() {
        let text = "I'm not sure.\nUSED_SOURCES: NONE";
        let (_, ids) = parse_used_sources(text);
        assert_eq!(ids, Some(Vec::new()));
    }

    #[test]
    fn missing_marker_keeps_full_candidate_set() {
        let text = "Just an answer with no marker.";
        let (displayed, ids) = parse_used_sources(text);
        assert_eq!(displayed, text);
        assert_eq!(ids, None);
    }
}
