//! The resumable batch processor.
//!
//! `advance` is the engine's only forward-progress primitive: an external
//! trigger (HTTP call or scheduler tick) invokes it, it processes at most
//! one bounded batch within its wall-clock budget, and everything it
//! learned lives in the store by the time it returns. The hosting process
//! may die between any two recipients; the next invocation picks up from
//! the rows.

use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Result};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::bounce;
use crate::config::Config;
use crate::db::queries;
use crate::models::bounce::BounceKind;
use crate::models::campaign::CampaignStatus;
use crate::services::{governor, lease, scheduler, secrets};
use crate::smtp::{RelayConnector, RelayMessage};
use crate::template;
use crate::token;

/// Recipient/campaign error text is persisted; keep it bounded.
const MAX_ERROR_LEN: usize = 500;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AdvanceOutcome {
    pub sent: u32,
    pub failed: u32,
    pub completed: bool,
}

/// Advance one campaign by at most one batch. Safe to call repeatedly and
/// from overlapping triggers: the lease serializes runs, and a run that
/// fails to acquire it returns immediately having touched nothing.
pub async fn advance(
    pool: &SqlitePool,
    config: &Config,
    connector: &dyn RelayConnector,
    campaign_id: &str,
) -> Result<AdvanceOutcome> {
    let holder = Uuid::new_v4().to_string();
    if !lease::acquire(pool, campaign_id, &holder, config.lease_ttl_ms).await? {
        tracing::debug!(campaign = %campaign_id, "another run holds the lease");
        return Ok(AdvanceOutcome::default());
    }

    let result = run_batch(pool, config, connector, campaign_id).await;

    if let Err(e) = lease::release(pool, campaign_id, &holder).await {
        // Expiry will clean it up; the next run is delayed, not wrong.
        tracing::warn!(campaign = %campaign_id, error = %e, "lease release failed");
    }

    match result {
        Ok(outcome) => Ok(outcome),
        Err(e) => {
            // Processing fault, not a delivery failure: park the campaign
            // in `error`. Recipients stay pending so a resume can retry.
            let message = truncate(&e.to_string());
            if let Err(mark) = queries::mark_errored(pool, campaign_id, &message).await {
                tracing::warn!(campaign = %campaign_id, error = %mark, "could not record error state");
            }
            Err(e)
        }
    }
}

async fn run_batch(
    pool: &SqlitePool,
    config: &Config,
    connector: &dyn RelayConnector,
    campaign_id: &str,
) -> Result<AdvanceOutcome> {
    let started = Instant::now();
    let budget = Duration::from_millis(config.invocation_budget_ms);

    let campaign = queries::fetch_campaign(pool, campaign_id)
        .await?
        .ok_or_else(|| anyhow!("campaign {campaign_id} not found"))?;
    if campaign.status != CampaignStatus::Running {
        tracing::debug!(campaign = %campaign_id, status = campaign.status.as_str(), "not running, nothing to do");
        return Ok(AdvanceOutcome::default());
    }

    let Some(relay_config) = secrets::resolve(&campaign).await else {
        bail!("relay credentials unavailable");
    };
    let relay = connector
        .connect(&relay_config)
        .await
        .map_err(|e| anyhow!("relay unreachable: {}", e.message))?;

    let batch = queries::fetch_pending_batch(pool, campaign_id, config.batch_size as i64).await?;
    if batch.is_empty() {
        let completed = complete(pool, campaign_id).await?;
        return Ok(AdvanceOutcome {
            completed,
            ..AdvanceOutcome::default()
        });
    }

    let mut outcome = AdvanceOutcome::default();
    let batch_len = batch.len();

    for (i, recipient) in batch.into_iter().enumerate() {
        // Cancellation is cooperative: a pause/stop committed elsewhere is
        // honored here, before the next send.
        match queries::fetch_status(pool, campaign_id).await? {
            Some(CampaignStatus::Running) => {}
            status => {
                tracing::info!(
                    campaign = %campaign_id,
                    status = status.map_or("gone", |s| s.as_str()),
                    "campaign left running, stopping batch"
                );
                return Ok(outcome);
            }
        }
        // Budget is checked before the send; sending can itself be slow.
        if scheduler::time_budget_exceeded(started, budget) {
            tracing::info!(campaign = %campaign_id, "invocation budget exhausted");
            break;
        }
        let rate_key = format!("send-rate:{}", campaign.owner_id);
        let rate = governor::check_rate(
            pool,
            &rate_key,
            config.send_rate_limit,
            config.send_rate_window_ms,
        )
        .await?;
        if !rate.allowed {
            tracing::info!(campaign = %campaign_id, "send rate ceiling reached, deferring batch");
            break;
        }

        let vars = recipient.variables_map();
        let subject = template::personalize(&campaign.subject_template, &vars);
        let mut html = template::personalize(&campaign.body_template, &vars);

        if campaign.track_opens {
            let tracking_token = token::mint(
                config.tracking_secret.as_bytes(),
                campaign_id,
                &recipient.email,
                &campaign.owner_id,
            );
            queries::set_recipient_token(pool, &recipient.id, &tracking_token).await?;
            html.push_str(&open_pixel(&config.tracking_base_url, &tracking_token));
        }

        let message = RelayMessage {
            from_address: campaign.from_address.clone(),
            from_name: campaign.from_name.clone(),
            to: recipient.email.clone(),
            subject,
            html,
            text: None,
        };

        let now = chrono::Utc::now().timestamp();
        match relay.send(&message).await {
            Ok(_receipt) => {
                // The guard can lose to a concurrent run that beat us to
                // this row; then the counter must not move either.
                if queries::mark_recipient_sent(pool, &recipient.id, now).await? {
                    queries::increment_sent(pool, campaign_id).await?;
                    outcome.sent += 1;
                }
            }
            Err(err) => {
                let classification = bounce::classify(&err.message, err.code);
                let reason = truncate(&err.message);
                if queries::mark_recipient_failed(pool, &recipient.id, &reason, now).await? {
                    queries::increment_failed(pool, campaign_id).await?;
                    outcome.failed += 1;
                }
                if classification.kind == BounceKind::Hard {
                    queries::upsert_bounce(
                        pool,
                        &campaign.owner_id,
                        &recipient.email,
                        classification.kind,
                        &reason,
                        Some(campaign_id),
                        now,
                    )
                    .await?;
                }
                tracing::warn!(
                    campaign = %campaign_id,
                    recipient = %recipient.email,
                    kind = classification.kind.as_str(),
                    "delivery failed"
                );
            }
        }

        let delay_ms = scheduler::next_delay_ms(
            campaign.delay_min_ms.max(0) as u64,
            campaign.delay_max_ms.max(0) as u64,
        );
        queries::set_next_email_at(
            pool,
            campaign_id,
            chrono::Utc::now().timestamp_millis() + delay_ms as i64,
        )
        .await?;

        let last_in_batch = i + 1 == batch_len;
        if !last_in_batch && !scheduler::time_budget_exceeded(started, budget) {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
    }

    if queries::count_pending(pool, campaign_id).await? == 0 {
        outcome.completed = complete(pool, campaign_id).await?;
    }
    Ok(outcome)
}

/// `running -> completed`, plus the mandatory credential erasure.
async fn complete(pool: &SqlitePool, campaign_id: &str) -> Result<bool> {
    let now = chrono::Utc::now().timestamp();
    if queries::mark_completed(pool, campaign_id, now).await? {
        secrets::erase(pool, campaign_id).await?;
        tracing::info!(campaign = %campaign_id, "no pending recipients remain");
        return Ok(true);
    }
    Ok(false)
}

fn open_pixel(base_url: &str, tracking_token: &str) -> String {
    format!(
        r#"<img src="{}/track/open/{}" width="1" height="1" alt="" style="display:none">"#,
        base_url.trim_end_matches('/'),
        tracking_token
    )
}

fn truncate(text: &str) -> String {
    text.chars().take(MAX_ERROR_LEN).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_is_char_safe() {
        let long = "é".repeat(MAX_ERROR_LEN + 50);
        let cut = truncate(&long);
        assert_eq!(cut.chars().count(), MAX_ERROR_LEN);
    }

    #[test]
    fn open_pixel_embeds_token_once() {
        let html = open_pixel("http://x.test/", "tok.sig");
        assert!(html.contains("http://x.test/track/open/tok.sig"));
        assert!(!html.contains("//track"));
    }
}
