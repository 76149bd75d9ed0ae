//! Composite cron run (`/cron` endpoint, `muniqa monitor`/`muniqa ingest`
//! combined).
//!
//! Runs three steps in sequence — change monitor, connector ingestion,
//! article generation — each under its own timeout, with a short cooldown
//! between steps. A step's failure is recorded but does not block the next
//! step from running. Article generation (content authoring) is out of scope
//! (see Non-goals), so its step is a reserved no-op that still reports a
//! result, keeping the three-step ordering/timeout contract observable even
//! though step 3 does no work.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use sqlx::SqlitePool;

use crate::change_monitor;
use crate::config::Config;
use crate::embedding_client::EmbeddingClient;
use crate::ingestion_runner::{self, RunOptions};

const MONITOR_TIMEOUT: Duration = Duration::from_secs(90);
const INGEST_TIMEOUT: Duration = Duration::from_secs(120);
const INTER_STEP_COOLDOWN: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    pub step: &'static str,
    pub status: &'static str, // ok | timeout | error | skipped
    pub detail: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct CronReport {
    pub tenant_id: String,
    pub steps: Vec<StepResult>,
}

pub async fn run(
    pool: &SqlitePool,
    config: &Config,
    embedding_client: Option<Arc<EmbeddingClient>>,
    tenant_id: &str,
) -> CronReport {
    let mut steps = Vec::with_capacity(3);

    steps.push(run_monitor_step(pool, config, tenant_id).await);
    tokio::time::sleep(INTER_STEP_COOLDOWN).await;

    steps.push(run_ingest_step(pool, config, embedding_client, tenant_id).await);
    tokio::time::sleep(INTER_STEP_COOLDOWN).await;

    steps.push(StepResult {
        step: "article-generation",
        status: "skipped",
        detail: serde_json::json!({ "reason": "out of scope" }),
    });

    CronReport {
        tenant_id: tenant_id.to_string(),
        steps,
    }
}

async fn run_monitor_step(pool: &SqlitePool, config: &Config, tenant_id: &str) -> StepResult {
    match tokio::time::timeout(
        MONITOR_TIMEOUT,
        change_monitor::run(pool, config, tenant_id, "cron"),
    )
    .await
    {
        Ok(Ok(report)) => StepResult {
            step: "monitor",
            status: "ok",
            detail: serde_json::to_value(report).unwrap_or_default(),
        },
        Ok(Err(e)) => StepResult {
            step: "monitor",
            status: "error",
            detail: serde_json::json!({ "error": e.to_string() }),
        },
        Err(_) => StepResult {
            step: "monitor",
            status: "timeout",
            detail: serde_json::json!({ "timeoutSecs": MONITOR_TIMEOUT.as_secs() }),
        },
    }
}

async fn run_ingest_step(
    pool: &SqlitePool,
    config: &Config,
    embedding_client: Option<Arc<EmbeddingClient>>,
    tenant_id: &str,
) -> StepResult {
    let options = RunOptions {
        tenant_id: Some(tenant_id.to_string()),
        schedule: None,
        force: false,
    };

    match tokio::time::timeout(
        INGEST_TIMEOUT,
        ingestion_runner::run(pool, config, embedding_client, options),
    )
    .await
    {
        Ok(Ok(results)) => StepResult {
            step: "ingest",
            status: "ok",
            detail: serde_json::to_value(results).unwrap_or_default(),
        },
        Ok(Err(e)) => StepResult {
            step: "ingest",
            status: "error",
            detail: serde_json::json!({ "error": e.to_string() }),
        },
        Err(_) => StepResult {
            step: "ingest",
            status: "timeout",
            detail: serde_json::json!({ "timeoutSecs": INGEST_TIMEOUT.as_secs() }),
        },
    }
}
