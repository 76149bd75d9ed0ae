//! `muniqa` CLI.
//!
//! Subcommands mirror the HTTP surface for operators: `init` runs
//! migrations, `ingest`/`monitor` drive the connector runtime outside the
//! `/cron` schedule, `serve` starts the HTTP server, and `cache` inspects or
//! clears the in-process embedding cache via its own short-lived instance.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use muniqa::config;
use muniqa::db;
use muniqa::embedding_cache::EmbeddingCache;
use muniqa::embedding_client::EmbeddingClient;
use muniqa::{change_monitor, ingestion_runner, logging, migrate, server};

#[derive(Parser)]
#[command(
    name = "muniqa",
    about = "Tenant-scoped retrieval-augmented Q&A for municipal information",
    version
)]
struct Cli {
    /// Path to configuration file
    #[arg(long, global = true, default_value = "./config/muniqa.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema
    Init,

    /// Run all enabled, due connectors
    Ingest {
        /// Only run sources for this tenant
        #[arg(long)]
        tenant: Option<String>,

        /// Only run sources on this schedule (5min | 15min | hourly | daily | weekly)
        #[arg(long)]
        schedule: Option<String>,

        /// Run due sources regardless of their last run time
        #[arg(long)]
        force: bool,
    },

    /// Check tracked documents for drift
    Monitor {
        /// Tenant to check
        #[arg(long)]
        tenant: String,
    },

    /// Start the HTTP server
    Serve,

    /// Inspect or clear the embedding cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Print current embedding cache size/capacity/TTL
    Stats,
    /// Clear the embedding cache
    Clear,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest {
            tenant,
            schedule,
            force,
        } => {
            let pool = db::connect(&cfg).await?;
            let embedding_client = build_embedding_client(&cfg)?;
            let options = ingestion_runner::RunOptions {
                tenant_id: tenant,
                schedule,
                force,
            };
            let results = ingestion_runner::run(&pool, &cfg, embedding_client, options).await?;
            for result in &results {
                println!(
                    "{}: fetched={} stored={} duplicate={} out_of_scope={} error={:?}",
                    result.source_id,
                    result.fetched,
                    result.stored,
                    result.skipped_duplicate,
                    result.skipped_out_of_scope,
                    result.error
                );
            }
        }
        Commands::Monitor { tenant } => {
            let pool = db::connect(&cfg).await?;
            let report = change_monitor::run(&pool, &cfg, &tenant, "cli").await?;
            println!(
                "checked={} changed={} new={} errors={} duration_ms={}",
                report.checked,
                report.changed.len(),
                report.new_count,
                report.errors,
                report.duration_ms
            );
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Cache { action } => {
            let cache = EmbeddingCache::new(
                cfg.cache.embedding_cache_size,
                std::time::Duration::from_secs(cfg.cache.embedding_cache_ttl_secs),
            );
            match action {
                CacheAction::Stats => {
                    let stats = cache.stats();
                    println!(
                        "size={} max_size={} ttl_secs={}",
                        stats.size, stats.max_size, stats.ttl_secs
                    );
                }
                CacheAction::Clear => {
                    cache.clear();
                    println!("Embedding cache cleared.");
                }
            }
        }
    }

    Ok(())
}

fn build_embedding_client(cfg: &config::Config) -> anyhow::Result<Option<Arc<EmbeddingClient>>> {
    if !cfg.embedding.is_enabled() {
        return Ok(None);
    }
    let cache = Arc::new(EmbeddingCache::new(
        cfg.cache.embedding_cache_size,
        std::time::Duration::from_secs(cfg.cache.embedding_cache_ttl_secs),
    ));
    Ok(Some(Arc::new(EmbeddingClient::new(cfg.embedding.clone(), cache)?)))
}
