//! Cost / Usage Recorder (C12).
//!
//! Usage-table writes with a static per-model price map for estimated cost.
//! `/answer` calls are low-volume relative to embedding calls and are
//! recorded in full via [`record`]; high-volume embedding usage goes through
//! [`record_sampled`], which applies a 5% sample rate to keep write volume
//! down on busy tenants while still giving operators a representative cost
//! signal.

use chrono::Utc;
use rand::Rng;
use sqlx::SqlitePool;
use uuid::Uuid;

const DEFAULT_SAMPLE_RATE: f64 = 0.05;

/// (model prefix, cost per 1K prompt tokens USD, cost per 1K completion tokens USD)
const PRICE_TABLE: &[(&str, f64, f64)] = &[
    ("gpt-4o", 0.0025, 0.010),
    ("gpt-4", 0.03, 0.06),
    ("gpt-3.5", 0.0005, 0.0015),
    ("llama", 0.0, 0.0),
];

fn price_for(model: &str) -> (f64, f64) {
    PRICE_TABLE
        .iter()
        .find(|(prefix, _, _)| model.starts_with(prefix))
        .map(|(_, p, c)| (*p, *c))
        .unwrap_or((0.0, 0.0))
}

fn estimate_cost(model: &str, prompt_tokens: i64, completion_tokens: i64) -> f64 {
    let (prompt_price, completion_price) = price_for(model);
    (prompt_tokens as f64 / 1000.0) * prompt_price + (completion_tokens as f64 / 1000.0) * completion_price
}

/// Records one usage row unconditionally.
pub async fn record(
    pool: &SqlitePool,
    tenant_id: &str,
    endpoint: &str,
    model: &str,
    prompt_tokens: i64,
    completion_tokens: i64,
) -> Result<(), sqlx::Error> {
    let total_tokens = prompt_tokens + completion_tokens;
    let estimated_cost = estimate_cost(model, prompt_tokens, completion_tokens);
    let id = Uuid::new_v4().to_string();

    sqlx::query(
        "INSERT INTO usage (id, tenant_id, endpoint, model, prompt_tokens, completion_tokens, total_tokens, estimated_cost_usd, recorded_at, metadata_json)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(tenant_id)
    .bind(endpoint)
    .bind(model)
    .bind(prompt_tokens)
    .bind(completion_tokens)
    .bind(total_tokens)
    .bind(estimated_cost)
    .bind(Utc::now())
    .bind("{}")
    .execute(pool)
    .await?;

    Ok(())
}

/// Records a usage row subject to `DEFAULT_SAMPLE_RATE`, for high-volume
/// embedding calls. A no-op (not an error) when the sample is skipped.
pub async fn record_sampled(
    pool: &SqlitePool,
    tenant_id: &str,
    endpoint: &str,
    model: &str,
    prompt_tokens: i64,
    completion_tokens: i64,
) -> Result<(), sqlx::Error> {
    if !rand::thread_rng().gen_bool(DEFAULT_SAMPLE_RATE) {
        return Ok(());
    }
    record(pool, tenant_id, endpoint, model, prompt_tokens, completion_tokens).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_table_falls_back_to_zero_for_unknown_models() {
        assert_eq!(price_for("some-unlisted-model"), (0.0, 0.0));
    }

    #[test]
    fn cost_estimate_scales_with_tokens() {
        let small = estimate_cost("gpt-4o", 1000, 0);
        let large = estimate_cost("gpt-4o", 2000, 0);
        assert!(large > small);
    }

}
