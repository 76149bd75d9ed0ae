//! HTTP server.
//!
//! Exposes the tenant-scoped Q&A and ingestion surface over JSON/SSE.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/answer` | Streams a generated answer (SSE) |
//! | `POST` | `/search` | Raw ranked retrieval results |
//! | `GET`  | `/content` | Paginated normalized content listing |
//! | `GET`/`POST` | `/cron` | Runs the composite monitor→ingest cron, bearer-gated |
//! | `GET`  | `/health` | Health check |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "question must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `unauthorized` (401), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted; this server is meant to
//! sit behind a gateway that applies tenant-level access control.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use crate::answer::{self, AnswerDeps};
use crate::config::Config;
use crate::content_api::{self, ContentPage, ContentQuery};
use crate::cron;
use crate::db;
use crate::embedding_client::EmbeddingClient;
use crate::errors::AnswerError;
use crate::models::{CachedAnswer, ChatMessage};
use crate::search_api::{self, SearchResult};

#[derive(Clone)]
struct AppState {
    pool: sqlx::SqlitePool,
    config: Arc<Config>,
    embedding_client: Arc<EmbeddingClient>,
}

/// Starts the HTTP server. Binds to `[server].bind` and runs until the
/// process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let pool = db::connect(config).await?;

    let embedding_cache = Arc::new(crate::embedding_cache::EmbeddingCache::new(
        config.cache.embedding_cache_size,
        std::time::Duration::from_secs(config.cache.embedding_cache_ttl_secs),
    ));
    let embedding_client = Arc::new(EmbeddingClient::new(config.embedding.clone(), embedding_cache)?);

    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        embedding_client,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/answer", post(handle_answer))
        .route("/search", post(handle_search))
        .route("/content", get(handle_content))
        .route("/cron", get(handle_cron).post(handle_cron))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state);

    tracing::info!(bind = %bind_addr, "server listening");

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<AnswerError> for AppError {
    fn from(e: AnswerError) -> Self {
        match e {
            AnswerError::InvalidInput(msg) => bad_request(msg),
            other => internal_error(other.to_string()),
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        internal_error(e.to_string())
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn unauthorized(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::UNAUTHORIZED,
        code: "unauthorized".to_string(),
        message: message.into(),
    }
}

fn internal_error(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

/// Resolves the tenant to serve: the request's `tenant_id` if given and
/// non-empty, or the sole configured tenant when exactly one exists.
fn resolve_tenant_id(config: &Config, provided: Option<String>) -> Result<String, AppError> {
    if let Some(id) = provided {
        if !id.trim().is_empty() {
            return Ok(id);
        }
    }
    match config.tenants.as_slice() {
        [only] => Ok(only.tenant_id.clone()),
        _ => Err(bad_request("tenant_id is required")),
    }
}

// ============ POST /answer ============

#[derive(Deserialize)]
struct AnswerRequest {
    messages: Vec<ChatMessage>,
    #[serde(default)]
    tenant_id: Option<String>,
}

const VALID_ROLES: &[&str] = &["user", "assistant", "system"];

async fn handle_answer(
    State(state): State<AppState>,
    Json(req): Json<AnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    if req.messages.is_empty() {
        return Err(bad_request("messages must not be empty"));
    }
    if let Some(bad_role) = req.messages.iter().find(|m| !VALID_ROLES.contains(&m.role.as_str())) {
        return Err(bad_request(format!("invalid message role '{}'", bad_role.role)));
    }

    let tenant_id = resolve_tenant_id(&state.config, req.tenant_id)?;

    let deps = Arc::new(AnswerDeps {
        pool: state.pool.clone(),
        embedding_client: state.embedding_client.clone(),
        config: (*state.config).clone(),
    });

    let sse = answer::compose(deps, tenant_id, req.messages).await?;
    Ok(sse)
}

// ============ POST /search ============

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(default)]
    tenant_id: Option<String>,
    #[serde(default)]
    limit: Option<i64>,
    #[serde(default)]
    min_similarity: Option<f32>,
}

#[derive(Serialize)]
struct SearchResponse {
    results: Vec<SearchResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cached_answer: Option<CachedAnswer>,
    timing_ms: u128,
}

async fn handle_search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    if req.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }

    let tenant_id = resolve_tenant_id(&state.config, req.tenant_id)?;
    let min_similarity = req.min_similarity.unwrap_or(state.config.retrieval.min_similarity);
    let limit = req.limit.unwrap_or(search_api::DEFAULT_LIMIT);

    let started = std::time::Instant::now();

    let results = search_api::search(&state.pool, &state.embedding_client, &tenant_id, &req.query, min_similarity, limit)
        .await?;
    let cached_answer = crate::answer_cache::get(&state.pool, &tenant_id, &req.query).await?;

    Ok(Json(SearchResponse {
        results,
        cached_answer,
        timing_ms: started.elapsed().as_millis(),
    }))
}

// ============ GET /content ============

#[derive(Deserialize)]
struct ContentParams {
    tenant_id: String,
    #[serde(flatten)]
    query: ContentQuery,
}

async fn handle_content(
    State(state): State<AppState>,
    Query(params): Query<ContentParams>,
) -> Result<Json<ContentPage>, AppError> {
    let page = content_api::list(&state.pool, &params.tenant_id, &params.query).await?;
    Ok(Json(page))
}

// ============ GET|POST /cron ============

#[derive(Deserialize)]
struct CronParams {
    tenant_id: String,
}

async fn handle_cron(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<CronParams>,
) -> Result<Json<cron::CronReport>, AppError> {
    if let Some(expected) = state.config.cron_secret() {
        let provided = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        if provided != Some(expected.as_str()) {
            return Err(unauthorized("missing or invalid bearer token"));
        }
    }

    let report = cron::run(
        &state.pool,
        &state.config,
        Some(state.embedding_client.clone()),
        &params.tenant_id,
    )
    .await;

    Ok(Json(report))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
