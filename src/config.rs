//! Configuration parsing and validation.
//!
//! `muniqa` is configured via a TOML file (default: `config/muniqa.toml`). The
//! config defines database paths, chunking parameters, embedding/LLM provider
//! settings, retrieval tuning, the embedding/answer cache sizing, the cron bearer
//! secret, and per-tenant defaults. `SourceConfig` rows (one per connector
//! instance) live in the database, not in this file — see [`crate::models::SourceConfig`].

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub geography: GeographyConfig,
    #[serde(default)]
    pub tenants: Vec<TenantConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    pub max_tokens: usize,
    #[serde(default = "default_overlap")]
    pub overlap_tokens: usize,
}

fn default_overlap() -> usize {
    0
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f32,
    #[serde(default = "default_candidate_multiplier")]
    pub candidate_multiplier: i64,
    #[serde(default = "default_final_limit")]
    pub final_limit: i64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            min_similarity: default_min_similarity(),
            candidate_multiplier: default_candidate_multiplier(),
            final_limit: default_final_limit(),
        }
    }
}

fn default_min_similarity() -> f32 {
    0.30
}
fn default_candidate_multiplier() -> i64 {
    3
}
fn default_final_limit() -> i64 {
    12
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            batch_size: 100,
            max_retries: 5,
            timeout_secs: 30,
            url: None,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    100
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

/// LLM (chat completion) provider settings for query rewrite/decomposition (C6)
/// and the answer composer (C8).
#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_rewrite_timeout_secs")]
    pub rewrite_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            url: None,
            timeout_secs: 30,
            rewrite_timeout_secs: 2,
        }
    }
}

fn default_llm_provider() -> String {
    "disabled".to_string()
}
fn default_llm_timeout_secs() -> u64 {
    30
}
fn default_rewrite_timeout_secs() -> u64 {
    2
}

impl LlmConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
    /// Bearer token required on the `/cron` endpoint. Read from config or the
    /// `MUNIQA_CRON_SECRET` environment variable (env wins if both are set).
    #[serde(default)]
    pub cron_secret: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_embedding_cache_size")]
    pub embedding_cache_size: usize,
    #[serde(default = "default_embedding_cache_ttl_secs")]
    pub embedding_cache_ttl_secs: u64,
    #[serde(default = "default_answer_cache_ttl_secs")]
    pub answer_cache_ttl_secs: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            embedding_cache_size: default_embedding_cache_size(),
            embedding_cache_ttl_secs: default_embedding_cache_ttl_secs(),
            answer_cache_ttl_secs: default_answer_cache_ttl_secs(),
        }
    }
}

fn default_embedding_cache_size() -> usize {
    1000
}
fn default_embedding_cache_ttl_secs() -> u64 {
    30 * 60
}
fn default_answer_cache_ttl_secs() -> i64 {
    7 * 24 * 60 * 60
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeographyConfig {
    #[serde(default = "default_staleness_horizon_days")]
    pub staleness_horizon_days: i64,
    #[serde(default = "default_ical_days_ahead")]
    pub ical_days_ahead: i64,
}

impl Default for GeographyConfig {
    fn default() -> Self {
        Self {
            staleness_horizon_days: default_staleness_horizon_days(),
            ical_days_ahead: default_ical_days_ahead(),
        }
    }
}

fn default_staleness_horizon_days() -> i64 {
    90
}
fn default_ical_days_ahead() -> i64 {
    90
}

/// Administratively-configured display and geographic-scope attributes for one
/// tenant (municipality). Drives the answer composer's fallback text and the
/// geographic relevance filter.
#[derive(Debug, Deserialize, Clone)]
pub struct TenantConfig {
    pub tenant_id: String,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub fallback_url: Option<String>,
    #[serde(default)]
    pub locality_name: Option<String>,
    #[serde(default)]
    pub neighboring_localities: Vec<String>,
    #[serde(default)]
    pub state_abbreviation: Option<String>,
}

impl Config {
    pub fn tenant(&self, tenant_id: &str) -> Option<&TenantConfig> {
        self.tenants.iter().find(|t| t.tenant_id == tenant_id)
    }

    pub fn cron_secret(&self) -> Option<String> {
        std::env::var("MUNIQA_CRON_SECRET")
            .ok()
            .or_else(|| self.server.cron_secret.clone())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.chunking.max_tokens == 0 {
        anyhow::bail!("chunking.max_tokens must be > 0");
    }

    if config.retrieval.final_limit < 1 {
        anyhow::bail!("retrieval.final_limit must be >= 1");
    }

    if !(0.0..=1.0).contains(&config.retrieval.min_similarity) {
        anyhow::bail!("retrieval.min_similarity must be in [0.0, 1.0]");
    }

    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" | "local" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
            other
        ),
    }

    match config.llm.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown LLM provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }

    Ok(config)
}
