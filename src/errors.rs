//! Typed errors at library boundaries.
//!
//! Most of this crate propagates everything through `anyhow`. Callers of the
//! embedding client, connector framework, and answer pipeline additionally need
//! to distinguish error *kinds* — degrade vs. propagate — so those boundaries
//! define small `thiserror` enums instead. Call sites that don't care about the
//! kind still convert to `anyhow::Error` via `#[from]`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding provider is disabled")]
    ProviderDisabled,
    #[error("embedding provider request failed: {0}")]
    Http(String),
    #[error("embedding provider returned an invalid response: {0}")]
    InvalidResponse(String),
    #[error("empty input after trimming")]
    EmptyInput,
}

#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("fetch timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("fetch failed: {0}")]
    Http(String),
    #[error("failed to parse feed content: {0}")]
    Parse(String),
}

#[derive(Debug, Error)]
pub enum AnswerError {
    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),
    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}
