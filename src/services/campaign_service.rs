//! Campaign lifecycle operations. Every transition is a guarded UPDATE in
//! `db::queries`, so two racing callers cannot both win a transition.

use std::collections::HashMap;

use sqlx::SqlitePool;
use thiserror::Error;
use uuid::Uuid;

use crate::config::Config;
use crate::db::queries;
use crate::models::campaign::{Campaign, CampaignStatus};
use crate::services::{governor, scheduler, secrets};
use crate::smtp::{RelayConfig, RelayConnector};
use crate::token;

#[derive(Debug, Error)]
pub enum CampaignError {
    #[error("campaign not found")]
    NotFound,
    #[error("campaign is {0}, transition rejected")]
    InvalidState(&'static str),
    #[error("concurrent campaign limit reached for this owner")]
    RateLimited,
    #[error("invalid delay bounds: {0}")]
    InvalidDelayBounds(String),
    #[error("relay verification failed: {0}")]
    RelayUnverified(String),
    #[error("campaign has no recipients")]
    NoRecipients,
    #[error(transparent)]
    Store(#[from] sqlx::Error),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub struct NewRecipient {
    pub email: String,
    pub variables: HashMap<String, serde_json::Value>,
}

pub struct NewCampaign {
    pub owner_id: String,
    pub subject_template: String,
    pub body_template: String,
    pub from_address: String,
    pub from_name: Option<String>,
    pub track_opens: bool,
    pub delay_min_ms: u64,
    pub delay_max_ms: u64,
    pub recipients: Vec<NewRecipient>,
}

#[derive(Debug)]
pub struct CreateOutcome {
    pub campaign_id: String,
    pub total: i64,
    /// Recipients dropped because the owner already unsubscribed or
    /// hard-bounced them.
    pub skipped: usize,
}

/// Create the campaign and its full recipient set in one transaction.
/// Partial recipient sets are not a thing: either everything lands or
/// nothing does.
pub async fn create(
    pool: &SqlitePool,
    config: &Config,
    spec: NewCampaign,
) -> Result<CreateOutcome, CampaignError> {
    if spec.recipients.is_empty() {
        return Err(CampaignError::NoRecipients);
    }
    let (delay_min, delay_max) = scheduler::clamp_delay_bounds(
        spec.delay_min_ms,
        spec.delay_max_ms,
        config.delay_floor_ms,
        config.delay_ceiling_ms,
    )
    .ok_or_else(|| {
        CampaignError::InvalidDelayBounds(format!(
            "min {} must not exceed max {}",
            spec.delay_min_ms, spec.delay_max_ms
        ))
    })?;

    if !governor::try_acquire_campaign_slot(
        pool,
        &spec.owner_id,
        config.max_campaigns_per_owner,
        None,
    )
    .await?
    {
        return Err(CampaignError::RateLimited);
    }

    let suppressed: Vec<String> = queries::suppressed_addresses(pool, &spec.owner_id)
        .await?
        .into_iter()
        .map(|e| e.to_lowercase())
        .collect();

    let mut kept = Vec::with_capacity(spec.recipients.len());
    let mut skipped = 0usize;
    for recipient in spec.recipients {
        if suppressed.contains(&recipient.email.trim().to_lowercase()) {
            skipped += 1;
        } else {
            kept.push(recipient);
        }
    }

    let campaign = Campaign {
        id: Uuid::new_v4().to_string(),
        owner_id: spec.owner_id,
        status: CampaignStatus::Queued,
        total_count: kept.len() as i64,
        sent_count: 0,
        failed_count: 0,
        delay_min_ms: delay_min as i64,
        delay_max_ms: delay_max as i64,
        subject_template: spec.subject_template,
        body_template: spec.body_template,
        from_address: spec.from_address,
        from_name: spec.from_name,
        track_opens: spec.track_opens,
        relay_snapshot: None,
        next_email_at: None,
        error_message: None,
        created_at: chrono::Utc::now().timestamp(),
        started_at: None,
        paused_at: None,
        completed_at: None,
    };

    let mut tx = pool.begin().await?;
    queries::insert_campaign(&mut tx, &campaign).await?;
    for (i, recipient) in kept.iter().enumerate() {
        let variables = serde_json::to_string(&recipient.variables)
            .map_err(|e| CampaignError::Internal(e.into()))?;
        queries::insert_recipient(
            &mut tx,
            &Uuid::new_v4().to_string(),
            &campaign.id,
            recipient.email.trim(),
            &variables,
            &token::hash_email(&recipient.email),
            i as i64,
        )
        .await?;
    }
    tx.commit().await?;

    tracing::info!(
        campaign = %campaign.id,
        total = campaign.total_count,
        skipped,
        "campaign created"
    );
    Ok(CreateOutcome {
        campaign_id: campaign.id,
        total: campaign.total_count,
        skipped,
    })
}

/// `start`: `queued -> running`. Commits only after the relay probe
/// succeeds and the owner is under the concurrency ceiling.
pub async fn start(
    pool: &SqlitePool,
    config: &Config,
    connector: &dyn RelayConnector,
    campaign_id: &str,
    relay: RelayConfig,
) -> Result<(), CampaignError> {
    let campaign = queries::fetch_campaign(pool, campaign_id)
        .await?
        .ok_or(CampaignError::NotFound)?;
    if campaign.status != CampaignStatus::Queued {
        return Err(CampaignError::InvalidState(campaign.status.as_str()));
    }

    // Bounds were clamped at creation, but the envelope may have tightened
    // since; re-validate against the one in force right now.
    let (delay_min, delay_max) = scheduler::clamp_delay_bounds(
        campaign.delay_min_ms.max(0) as u64,
        campaign.delay_max_ms.max(0) as u64,
        config.delay_floor_ms,
        config.delay_ceiling_ms,
    )
    .ok_or_else(|| CampaignError::InvalidDelayBounds("stored bounds are unusable".into()))?;
    if (delay_min as i64, delay_max as i64) != (campaign.delay_min_ms, campaign.delay_max_ms) {
        queries::set_delay_bounds(pool, campaign_id, delay_min as i64, delay_max as i64).await?;
    }

    if !governor::try_acquire_campaign_slot(
        pool,
        &campaign.owner_id,
        config.max_campaigns_per_owner,
        Some(campaign_id),
    )
    .await?
    {
        return Err(CampaignError::RateLimited);
    }

    verify_relay(connector, &relay).await?;
    secrets::stash(pool, campaign_id, &relay).await?;

    let now = chrono::Utc::now().timestamp();
    if !queries::mark_started(pool, campaign_id, now).await? {
        return Err(CampaignError::InvalidState("not queued"));
    }
    tracing::info!(campaign = %campaign_id, "campaign started");
    Ok(())
}

/// `pause`: only from `running`. The in-flight batch notices on its next
/// status re-read and stops without touching further recipients.
pub async fn pause(pool: &SqlitePool, campaign_id: &str) -> Result<(), CampaignError> {
    let now = chrono::Utc::now().timestamp();
    if queries::mark_paused(pool, campaign_id, now).await? {
        tracing::info!(campaign = %campaign_id, "campaign paused");
        return Ok(());
    }
    Err(transition_rejection(pool, campaign_id).await?)
}

/// `resume`: from `paused`, or from `error` as the operator recovery
/// path. Credentials must be supplied again, they are not guaranteed to
/// have survived the pause.
pub async fn resume(
    pool: &SqlitePool,
    connector: &dyn RelayConnector,
    campaign_id: &str,
    relay: RelayConfig,
) -> Result<(), CampaignError> {
    let campaign = queries::fetch_campaign(pool, campaign_id)
        .await?
        .ok_or(CampaignError::NotFound)?;
    if !matches!(
        campaign.status,
        CampaignStatus::Paused | CampaignStatus::Error
    ) {
        return Err(CampaignError::InvalidState(campaign.status.as_str()));
    }

    verify_relay(connector, &relay).await?;
    secrets::stash(pool, campaign_id, &relay).await?;

    if !queries::mark_resumed(pool, campaign_id).await? {
        return Err(transition_rejection(pool, campaign_id).await?);
    }
    tracing::info!(campaign = %campaign_id, "campaign resumed");
    Ok(())
}

/// `stop`: from any non-terminal state. Remaining pending recipients are
/// cancelled and the credential stash is erased; there is no way back.
pub async fn stop(pool: &SqlitePool, campaign_id: &str) -> Result<(), CampaignError> {
    let now = chrono::Utc::now().timestamp();
    if !queries::mark_stopped(pool, campaign_id, now).await? {
        return Err(transition_rejection(pool, campaign_id).await?);
    }
    let cancelled = queries::cancel_pending(pool, campaign_id).await?;
    secrets::erase(pool, campaign_id).await?;
    tracing::info!(campaign = %campaign_id, cancelled, "campaign stopped");
    Ok(())
}

pub async fn snapshot(pool: &SqlitePool, campaign_id: &str) -> Result<Campaign, CampaignError> {
    queries::fetch_campaign(pool, campaign_id)
        .await?
        .ok_or(CampaignError::NotFound)
}

async fn verify_relay(
    connector: &dyn RelayConnector,
    relay: &RelayConfig,
) -> Result<(), CampaignError> {
    let relay = connector
        .connect(relay)
        .await
        .map_err(|e| CampaignError::RelayUnverified(e.message.clone()))?;
    relay
        .verify()
        .await
        .map_err(|e| CampaignError::RelayUnverified(e.message))
}

/// A guarded transition affected no rows: work out why for the caller.
async fn transition_rejection(
    pool: &SqlitePool,
    campaign_id: &str,
) -> Result<CampaignError, sqlx::Error> {
    Ok(match queries::fetch_status(pool, campaign_id).await? {
        None => CampaignError::NotFound,
        Some(status) => CampaignError::InvalidState(status.as_str()),
    })
}
