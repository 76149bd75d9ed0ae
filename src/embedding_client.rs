//! Embedding Client (C2).
//!
//! Wraps [`crate::embedding::embed_texts`] with batching by `B`, input
//! trimming/validation, and cache-assisted single-text embeds through
//! [`EmbeddingCache`] (C1). Batches bypass the cache to avoid partial-hit
//! reassembly complexity.

use std::sync::Arc;

use crate::config::EmbeddingConfig;
use crate::embedding::{self, EmbeddingProvider};
use crate::embedding_cache::EmbeddingCache;
use crate::errors::EmbeddingError;

pub struct EmbeddingClient {
    config: EmbeddingConfig,
    provider: Box<dyn EmbeddingProvider>,
    cache: Arc<EmbeddingCache>,
}

impl EmbeddingClient {
    pub fn new(config: EmbeddingConfig, cache: Arc<EmbeddingCache>) -> anyhow::Result<Self> {
        let provider = embedding::create_provider(&config)?;
        Ok(Self {
            config,
            provider,
            cache,
        })
    }

    pub fn dims(&self) -> usize {
        self.provider.dims()
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    /// Embeds a single text, checking (and populating) the embedding cache.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }

        if let Some(cached) = self.cache.get(trimmed) {
            return Ok(cached);
        }

        let vectors = self.embed_provider(&[trimmed.to_string()]).await?;
        let vector = vectors.into_iter().next().ok_or_else(|| {
            EmbeddingError::InvalidResponse("provider returned no vectors".to_string())
        })?;

        self.cache.put(trimmed, vector.clone());
        Ok(vector)
    }

    /// Embeds a batch of texts, splitting into provider-sized chunks and
    /// reassembling in input order. Bypasses the embedding cache.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let trimmed: Vec<String> = texts
            .iter()
            .map(|t| t.trim().to_string())
            .collect();

        if trimmed.iter().any(|t| t.is_empty()) {
            return Err(EmbeddingError::EmptyInput);
        }

        let batch_size = self.config.batch_size.max(1);
        let mut results = Vec::with_capacity(trimmed.len());

        for chunk in trimmed.chunks(batch_size) {
            let embedded = self.embed_provider(chunk).await?;
            results.extend(embedded);
        }

        Ok(results)
    }

    async fn embed_provider(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if !self.config.is_enabled() {
            return Err(EmbeddingError::ProviderDisabled);
        }
        embedding::embed_texts(self.provider.as_ref(), &self.config, texts)
            .await
            .map_err(|e| EmbeddingError::Http(e.to_string()))
    }
}
