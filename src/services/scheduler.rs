//! Delivery pacing and the background campaign tick.
//!
//! Pacing keeps sends jittered so the relay never sees a perfectly
//! periodic stream; the tick loop is the external trigger that keeps
//! `advance` being called until every running campaign drains.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::config::Config;
use crate::services::delivery_service;
use crate::smtp::SmtpConnector;

/// Uniform random delay in `[min_ms, max_ms]`, both ends inclusive.
pub fn next_delay_ms(min_ms: u64, max_ms: u64) -> u64 {
    if min_ms >= max_ms {
        return min_ms;
    }
    rand::rng().random_range(min_ms..=max_ms)
}

/// Clamp caller-supplied delay bounds into the global safety envelope.
/// Returns `None` when the bounds are unusable even after clamping.
pub fn clamp_delay_bounds(
    min_ms: u64,
    max_ms: u64,
    floor_ms: u64,
    ceiling_ms: u64,
) -> Option<(u64, u64)> {
    if min_ms > max_ms {
        return None;
    }
    let min = min_ms.clamp(floor_ms, ceiling_ms);
    let max = max_ms.clamp(floor_ms, ceiling_ms);
    (min <= max).then_some((min, max))
}

/// Checked before every send: sending itself can be slow, so waiting to
/// check only afterwards could blow far past the budget.
pub fn time_budget_exceeded(started_at: Instant, budget: Duration) -> bool {
    started_at.elapsed() >= budget
}

/// Spawn the campaign tick loop. Every tick it advances each running
/// campaign that is due; the per-campaign lease makes an overlap with a
/// manual advance harmless.
pub fn start(pool: SqlitePool, config: Arc<Config>) {
    tokio::spawn(async move {
        info!("campaign scheduler started, tick every {}s", config.tick_secs);
        loop {
            let tick_start = Instant::now();
            match due_campaigns(&pool).await {
                Ok(ids) => {
                    for id in ids {
                        let pool = pool.clone();
                        let config = config.clone();
                        tokio::spawn(async move {
                            match delivery_service::advance(&pool, &config, &SmtpConnector, &id)
                                .await
                            {
                                Ok(outcome) if outcome.completed => {
                                    info!(campaign = %id, "campaign completed");
                                }
                                Ok(_) => {}
                                Err(e) => {
                                    warn!(campaign = %id, error = %e, "tick advance failed");
                                }
                            }
                        });
                    }
                }
                Err(e) => warn!(error = %e, "scheduler: listing due campaigns failed"),
            }
            let elapsed = tick_start.elapsed();
            let sleep = Duration::from_secs(config.tick_secs).saturating_sub(elapsed);
            tokio::time::sleep(sleep.max(Duration::from_millis(250))).await;
        }
    });
}

async fn due_campaigns(pool: &SqlitePool) -> Result<Vec<String>, sqlx::Error> {
    let now = chrono::Utc::now().timestamp_millis();
    sqlx::query_scalar(
        "SELECT id FROM campaigns
         WHERE status = 'running' AND (next_email_at IS NULL OR next_email_at <= ?)",
    )
    .bind(now)
    .fetch_all(pool)
    .await
}
