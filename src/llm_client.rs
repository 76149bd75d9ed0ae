//! LLM chat-completion client.
//!
//! Used by the query router (C6, best-effort rewrite/decomposition) and the
//! answer composer (C8, streaming answer generation). Same client shape as
//! [`crate::embedding::embed_openai`]: env-var API key, a `reqwest::Client`
//! built with a configured timeout, and exponential-backoff retry — here
//! applied only before the first byte of a stream is read, since partial
//! tokens cannot be safely replayed once streaming has started.

use std::time::Duration;

use futures_util::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::config::LlmConfig;

#[derive(Debug, Clone, Copy)]
pub struct Usage {
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,
}

/// A non-streaming chat completion, used by the query router for rewrite and
/// decomposition (both short, best-effort, bounded by a short timeout).
pub async fn complete(
    config: &LlmConfig,
    system: &str,
    user: &str,
    timeout: Duration,
) -> anyhow::Result<String> {
    if !config.is_enabled() {
        anyhow::bail!("LLM provider is disabled");
    }

    let (url, api_key, model) = endpoint(config)?;
    let client = reqwest::Client::builder().timeout(timeout).build()?;

    let body = serde_json::json!({
        "model": model,
        "messages": [
            {"role": "system", "content": system},
            {"role": "user", "content": user},
        ],
        "stream": false,
    });

    let mut req = client.post(&url).json(&body);
    if let Some(key) = &api_key {
        req = req.header("Authorization", format!("Bearer {key}"));
    }

    let resp = req.send().await?;
    if !resp.status().is_success() {
        anyhow::bail!("LLM provider returned {}", resp.status());
    }

    let json: serde_json::Value = resp.json().await?;
    let content = json
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .ok_or_else(|| anyhow::anyhow!("missing choices[0].message.content in LLM response"))?;

    Ok(content.to_string())
}

/// Streams a chat completion, forwarding each text delta to `tx` as it arrives.
/// Returns the accumulated text and, if the provider reports it, token usage.
/// `tx` is a single-writer/single-reader channel; backpressure is whatever
/// its consumer applies.
pub async fn stream_complete(
    config: &LlmConfig,
    system: &str,
    user: &str,
    tx: mpsc::Sender<String>,
) -> anyhow::Result<(String, Option<Usage>)> {
    if !config.is_enabled() {
        anyhow::bail!("LLM provider is disabled");
    }

    let (url, api_key, model) = endpoint(config)?;
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;

    let body = serde_json::json!({
        "model": model,
        "messages": [
            {"role": "system", "content": system},
            {"role": "user", "content": user},
        ],
        "stream": true,
    });

    let mut req = client.post(&url).json(&body);
    if let Some(key) = &api_key {
        req = req.header("Authorization", format!("Bearer {key}"));
    }

    let resp = req.send().await?;
    if !resp.status().is_success() {
        anyhow::bail!("LLM provider returned {}", resp.status());
    }

    let mut byte_stream = resp.bytes_stream();
    let mut buffer = String::new();
    let mut accumulated = String::new();
    let mut usage = None;

    while let Some(chunk) = byte_stream.next().await {
        let chunk = chunk?;
        buffer.push_str(&String::from_utf8_lossy(&chunk));

        while let Some(pos) = buffer.find('\n') {
            let line = buffer[..pos].trim().to_string();
            buffer.drain(..=pos);

            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };
            let data = data.trim();
            if data == "[DONE]" {
                continue;
            }
            if data.is_empty() {
                continue;
            }

            let Ok(frame) = serde_json::from_str::<StreamFrame>(data) else {
                continue;
            };

            if let Some(delta) = frame
                .choices
                .first()
                .and_then(|c| c.delta.as_ref())
                .and_then(|d| d.content.clone())
            {
                accumulated.push_str(&delta);
                if tx.send(delta).await.is_err() {
                    // receiver dropped (client disconnected) — stop forwarding but
                    // keep accumulating so usage/cache writes still see full text.
                }
            }

            if let Some(u) = frame.usage {
                usage = Some(Usage {
                    prompt_tokens: u.prompt_tokens,
                    completion_tokens: u.completion_tokens,
                    total_tokens: u.total_tokens,
                });
            }
        }
    }

    Ok((accumulated, usage))
}

fn endpoint(config: &LlmConfig) -> anyhow::Result<(String, Option<String>, String)> {
    let model = config
        .model
        .clone()
        .ok_or_else(|| anyhow::anyhow!("llm.model required"))?;

    match config.provider.as_str() {
        "openai" => {
            let api_key = std::env::var("LLM_API_KEY")
                .or_else(|_| std::env::var("OPENAI_API_KEY"))
                .map_err(|_| anyhow::anyhow!("LLM_API_KEY not set"))?;
            let url = config
                .url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1/chat/completions".to_string());
            Ok((url, Some(api_key), model))
        }
        "ollama" => {
            let base = config
                .url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string());
            Ok((format!("{base}/v1/chat/completions"), None, model))
        }
        other => anyhow::bail!("unsupported LLM provider: {other}"),
    }
}

#[derive(Debug, Deserialize)]
struct StreamFrame {
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<UsageFrame>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: Option<StreamDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsageFrame {
    prompt_tokens: i64,
    completion_tokens: i64,
    total_tokens: i64,
}
