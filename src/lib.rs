//! # muniqa
//!
//! **Tenant-scoped retrieval-augmented Q&A for municipal information, with an
//! ingestion connector runtime that keeps it fed.**
//!
//! `muniqa` answers resident questions ("when is trash pickup", "how do I
//! renew a business license") by retrieving passages from documents and
//! content items scoped to one municipality (tenant), then asking an LLM to
//! compose a cited answer over them. A separate, always-running ingestion
//! side keeps those documents and content items current by polling RSS/Atom
//! feeds, iCalendar feeds, and scraped web pages on a schedule, and flags
//! drift on already-ingested pages via lightweight HTTP HEAD checks.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌────────────────┐   ┌───────────┐
//! │ Connectors   │──▶│ Ingestion       │──▶│  SQLite    │
//! │ RSS/iCal/Web │   │ Runner + Embed  │   │ Vec BLOBs  │
//! └──────────────┘   └────────────────┘   └─────┬─────┘
//!         ▲                                     │
//!         │ Change Monitor (HEAD/ETag)          │
//!         └─────────────────────────────────────┤
//!                                                ▼
//!                      ┌─────────────────────────────────┐
//!                      │ Query Router → Hybrid Search →    │
//!                      │ Confidence Scorer → Answer Composer│
//!                      └─────────────────┬───────────────┘
//!                                        ▼
//!                                 ┌──────────────┐
//!                                 │ HTTP (axum)  │
//!                                 │ /answer SSE  │
//!                                 └──────────────┘
//! ```
//!
//! ## Data Flow
//!
//! 1. **Connectors** ([`connectors`]) fetch raw items from a tenant's
//!    configured sources (RSS/Atom, iCalendar, generic web scrape).
//! 2. The **ingestion runner** ([`ingestion_runner`]) filters items by
//!    geographic relevance ([`geography`]), deduplicates by content hash, and
//!    stores normalized [`models::ContentItem`]s.
//! 3. Embeddable items are chunked ([`chunk`]) and embedded via the
//!    **embedding client** ([`embedding_client`], backed by [`embedding`] and
//!    cached by [`embedding_cache`]), with vectors stored as BLOBs.
//! 4. The **change monitor** ([`change_monitor`]) periodically re-checks
//!    already-ingested documents for drift without re-downloading them.
//! 5. A question reaches the **query router** ([`query_router`]), which
//!    expands synonyms, optionally rewrites and decomposes the query via an
//!    LLM, and resolves per-intent retrieval tuning.
//! 6. **Hybrid search** ([`hybrid_search`]) retrieves and reranks candidate
//!    chunks combining semantic similarity, lexical overlap, recency, and
//!    source authority.
//! 7. The **confidence scorer** ([`confidence`]) bands the result set, and the
//!    **answer composer** ([`answer`]) streams a cited answer over
//!    Server-Sent Events, consulting and refreshing the **answer cache**
//!    ([`answer_cache`]) and recording **usage** ([`usage`]).
//! 8. Everything is exposed over HTTP ([`server`]) and a CLI (`muniqa`).
//!
//! ## Quick Start
//!
//! ```bash
//! muniqa init                        # create database, run migrations
//! muniqa ingest --tenant springfield  # run all due connectors once
//! muniqa monitor --tenant springfield # check tracked documents for drift
//! muniqa serve                       # start the HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`models`] | Core data types shared across ingestion, retrieval, and answering |
//! | [`db`] | SQLite connection pool with WAL mode |
//! | [`migrate`] | Database schema migrations (idempotent) |
//! | [`errors`] | Typed error enums at library boundaries |
//! | [`logging`] | Structured logging setup |
//! | [`chunk`] | Paragraph-boundary text chunker |
//! | [`embedding`] | Embedding provider trait and implementations, vector utilities |
//! | [`embedding_cache`] | FIFO/TTL cache for single-text embeddings (C1) |
//! | [`embedding_client`] | Batching, validated, cache-assisted embedding client (C2) |
//! | [`vector_search`] | Brute-force cosine-similarity vector search (C4) |
//! | [`hybrid_search`] | Retrieval + rerank combining semantic/lexical/recency/authority (C5) |
//! | [`answer_cache`] | Per-tenant cached answers with TTL expiry (C3) |
//! | [`query_router`] | Synonym expansion, LLM rewrite/decomposition, intent routing (C6) |
//! | [`confidence`] | Confidence banding over retrieved similarities (C7) |
//! | [`answer`] | Streaming answer composition over SSE (C8) |
//! | [`llm_client`] | Chat completion client: non-streaming and streaming |
//! | [`connectors`] | Connector trait and dispatch (RSS/Atom, iCalendar, web scrape) (C9) |
//! | [`geography`] | Geographic relevance filtering for ingested content |
//! | [`ingestion_runner`] | Per-connector fetch → filter → dedup → embed runner (C10) |
//! | [`change_monitor`] | HTTP HEAD/ETag drift detection for tracked documents (C11) |
//! | [`usage`] | Sampled token usage and cost recording (C12) |
//! | [`search_api`] | `/search` endpoint logic |
//! | [`content_api`] | `/content` endpoint logic |
//! | [`cron`] | Composite monitor → ingest scheduled run |
//! | [`server`] | HTTP server (axum) with CORS |
//!
//! ## Configuration
//!
//! `muniqa` is configured via a TOML file (default: `config/muniqa.toml`). See
//! [`config`] for all available options and [`config::load_config`] for
//! validation rules.

pub mod answer;
pub mod answer_cache;
pub mod change_monitor;
pub mod chunk;
pub mod config;
pub mod confidence;
pub mod connectors;
pub mod content_api;
pub mod cron;
pub mod db;
pub mod embedding;
pub mod embedding_cache;
pub mod embedding_client;
pub mod errors;
pub mod geography;
pub mod hybrid_search;
pub mod ingestion_runner;
pub mod llm_client;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod query_router;
pub mod search_api;
pub mod server;
pub mod usage;
pub mod vector_search;
