//! Row-level queries shared by the campaign and delivery services.
//! Everything here returns `sqlx::Error`; policy lives in the services.

use sqlx::{sqlite::SqlitePool, SqliteConnection};

use crate::models::bounce::BounceKind;
use crate::models::campaign::{Campaign, CampaignStatus};
use crate::models::recipient::CampaignRecipient;

pub async fn insert_campaign(
    conn: &mut SqliteConnection,
    campaign: &Campaign,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO campaigns (
            id, owner_id, status, total_count, sent_count, failed_count,
            delay_min_ms, delay_max_ms, subject_template, body_template,
            from_address, from_name, track_opens, created_at
        ) VALUES (?, ?, ?, ?, 0, 0, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&campaign.id)
    .bind(&campaign.owner_id)
    .bind(campaign.status.as_str())
    .bind(campaign.total_count)
    .bind(campaign.delay_min_ms)
    .bind(campaign.delay_max_ms)
    .bind(&campaign.subject_template)
    .bind(&campaign.body_template)
    .bind(&campaign.from_address)
    .bind(&campaign.from_name)
    .bind(campaign.track_opens)
    .bind(campaign.created_at)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn insert_recipient(
    conn: &mut SqliteConnection,
    id: &str,
    campaign_id: &str,
    email: &str,
    variables_json: &str,
    email_hash: &str,
    sort_order: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO campaign_recipients
            (id, campaign_id, email, variables, email_hash, status, sort_order)
        VALUES (?, ?, ?, ?, ?, 'pending', ?)
        "#,
    )
    .bind(id)
    .bind(campaign_id)
    .bind(email)
    .bind(variables_json)
    .bind(email_hash)
    .bind(sort_order)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn set_delay_bounds(
    pool: &SqlitePool,
    id: &str,
    min_ms: i64,
    max_ms: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE campaigns SET delay_min_ms = ?, delay_max_ms = ? WHERE id = ?")
        .bind(min_ms)
        .bind(max_ms)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn fetch_campaign(
    pool: &SqlitePool,
    id: &str,
) -> Result<Option<Campaign>, sqlx::Error> {
    sqlx::query_as::<_, Campaign>("SELECT * FROM campaigns WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn fetch_campaigns_for_owner(
    pool: &SqlitePool,
    owner_id: &str,
) -> Result<Vec<Campaign>, sqlx::Error> {
    sqlx::query_as::<_, Campaign>(
        "SELECT * FROM campaigns WHERE owner_id = ? ORDER BY created_at DESC",
    )
    .bind(owner_id)
    .fetch_all(pool)
    .await
}

pub async fn fetch_status(
    pool: &SqlitePool,
    id: &str,
) -> Result<Option<CampaignStatus>, sqlx::Error> {
    let status: Option<String> =
        sqlx::query_scalar("SELECT status FROM campaigns WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?;
    Ok(status.as_deref().and_then(CampaignStatus::from_str))
}

/// `queued -> running`. Returns false if the campaign was not `queued`.
pub async fn mark_started(pool: &SqlitePool, id: &str, now: i64) -> Result<bool, sqlx::Error> {
    let res = sqlx::query(
        "UPDATE campaigns SET status = 'running', started_at = ?, error_message = NULL
         WHERE id = ? AND status = 'queued'",
    )
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(res.rows_affected() > 0)
}

/// `paused -> running`, also the recovery path out of `error`.
pub async fn mark_resumed(pool: &SqlitePool, id: &str) -> Result<bool, sqlx::Error> {
    let res = sqlx::query(
        "UPDATE campaigns SET status = 'running', paused_at = NULL, error_message = NULL
         WHERE id = ? AND status IN ('paused', 'error')",
    )
    .bind(id)
    .execute(pool)
    .await?;
    Ok(res.rows_affected() > 0)
}

/// `running -> paused`.
pub async fn mark_paused(pool: &SqlitePool, id: &str, now: i64) -> Result<bool, sqlx::Error> {
    let res = sqlx::query(
        "UPDATE campaigns SET status = 'paused', paused_at = ?
         WHERE id = ? AND status = 'running'",
    )
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(res.rows_affected() > 0)
}

/// Any non-terminal state -> `stopped`. `error` counts as stoppable since
/// it is still resumable.
pub async fn mark_stopped(pool: &SqlitePool, id: &str, now: i64) -> Result<bool, sqlx::Error> {
    let res = sqlx::query(
        "UPDATE campaigns SET status = 'stopped', completed_at = ?, relay_snapshot = NULL
         WHERE id = ? AND status IN ('queued', 'running', 'paused', 'error')",
    )
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(res.rows_affected() > 0)
}

/// `running -> completed`; clears the credential snapshot.
pub async fn mark_completed(pool: &SqlitePool, id: &str, now: i64) -> Result<bool, sqlx::Error> {
    let res = sqlx::query(
        "UPDATE campaigns
         SET status = 'completed', completed_at = ?, next_email_at = NULL,
             relay_snapshot = NULL
         WHERE id = ? AND status = 'running'",
    )
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(res.rows_affected() > 0)
}

/// `running -> error`. Recipients stay `pending` so a later resume can retry.
pub async fn mark_errored(
    pool: &SqlitePool,
    id: &str,
    message: &str,
) -> Result<bool, sqlx::Error> {
    let res = sqlx::query(
        "UPDATE campaigns SET status = 'error', error_message = ?
         WHERE id = ? AND status = 'running'",
    )
    .bind(message)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(res.rows_affected() > 0)
}

pub async fn fetch_pending_batch(
    pool: &SqlitePool,
    campaign_id: &str,
    limit: i64,
) -> Result<Vec<CampaignRecipient>, sqlx::Error> {
    sqlx::query_as::<_, CampaignRecipient>(
        "SELECT * FROM campaign_recipients
         WHERE campaign_id = ? AND status = 'pending'
         ORDER BY sort_order, id
         LIMIT ?",
    )
    .bind(campaign_id)
    .bind(limit)
    .fetch_all(pool)
    .await
}

pub async fn count_pending(pool: &SqlitePool, campaign_id: &str) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT COUNT(*) FROM campaign_recipients WHERE campaign_id = ? AND status = 'pending'",
    )
    .bind(campaign_id)
    .fetch_one(pool)
    .await
}

/// Guarded `pending -> sent`; false means some other run got there first.
pub async fn mark_recipient_sent(
    pool: &SqlitePool,
    recipient_id: &str,
    now: i64,
) -> Result<bool, sqlx::Error> {
    let res = sqlx::query(
        "UPDATE campaign_recipients SET status = 'sent', sent_at = ?
         WHERE id = ? AND status = 'pending'",
    )
    .bind(now)
    .bind(recipient_id)
    .execute(pool)
    .await?;
    Ok(res.rows_affected() > 0)
}

/// Guarded `pending -> failed`.
pub async fn mark_recipient_failed(
    pool: &SqlitePool,
    recipient_id: &str,
    error_message: &str,
    now: i64,
) -> Result<bool, sqlx::Error> {
    let res = sqlx::query(
        "UPDATE campaign_recipients SET status = 'failed', failed_at = ?, error_message = ?
         WHERE id = ? AND status = 'pending'",
    )
    .bind(now)
    .bind(error_message)
    .bind(recipient_id)
    .execute(pool)
    .await?;
    Ok(res.rows_affected() > 0)
}

/// `stop` side effect: every remaining pending recipient is cancelled.
pub async fn cancel_pending(pool: &SqlitePool, campaign_id: &str) -> Result<u64, sqlx::Error> {
    let res = sqlx::query(
        "UPDATE campaign_recipients SET status = 'cancelled'
         WHERE campaign_id = ? AND status = 'pending'",
    )
    .bind(campaign_id)
    .execute(pool)
    .await?;
    Ok(res.rows_affected())
}

pub async fn set_recipient_token(
    pool: &SqlitePool,
    recipient_id: &str,
    token: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE campaign_recipients SET tracking_token = ? WHERE id = ?")
        .bind(token)
        .bind(recipient_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn increment_sent(pool: &SqlitePool, campaign_id: &str) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE campaigns SET sent_count = sent_count + 1 WHERE id = ?")
        .bind(campaign_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn increment_failed(pool: &SqlitePool, campaign_id: &str) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE campaigns SET failed_count = failed_count + 1 WHERE id = ?")
        .bind(campaign_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn set_next_email_at(
    pool: &SqlitePool,
    campaign_id: &str,
    at_ms: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE campaigns SET next_email_at = ? WHERE id = ?")
        .bind(at_ms)
        .bind(campaign_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn set_relay_snapshot(
    pool: &SqlitePool,
    campaign_id: &str,
    snapshot_json: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE campaigns SET relay_snapshot = ? WHERE id = ?")
        .bind(snapshot_json)
        .bind(campaign_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn clear_relay_snapshot(
    pool: &SqlitePool,
    campaign_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE campaigns SET relay_snapshot = NULL WHERE id = ?")
        .bind(campaign_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// One live bounce record per (owner, address); newer bounces overwrite.
pub async fn upsert_bounce(
    pool: &SqlitePool,
    owner_id: &str,
    email: &str,
    kind: BounceKind,
    reason: &str,
    campaign_id: Option<&str>,
    now: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO bounce_records (owner_id, email, kind, reason, campaign_id, bounced_at)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(owner_id, email) DO UPDATE SET
            kind = excluded.kind,
            reason = excluded.reason,
            campaign_id = excluded.campaign_id,
            bounced_at = excluded.bounced_at
        "#,
    )
    .bind(owner_id)
    .bind(email)
    .bind(kind.as_str())
    .bind(reason)
    .bind(campaign_id)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}

/// Addresses the owner must not be mailed again: unsubscribed or hard-bounced.
pub async fn suppressed_addresses(
    pool: &SqlitePool,
    owner_id: &str,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT email FROM unsubscribes WHERE owner_id = ?
         UNION
         SELECT email FROM bounce_records WHERE owner_id = ? AND kind = 'hard'",
    )
    .bind(owner_id)
    .bind(owner_id)
    .fetch_all(pool)
    .await
}

pub async fn count_active_for_owner(
    pool: &SqlitePool,
    owner_id: &str,
    exclude_campaign: Option<&str>,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT COUNT(*) FROM campaigns
         WHERE owner_id = ? AND status IN ('queued', 'running') AND id != ?",
    )
    .bind(owner_id)
    .bind(exclude_campaign.unwrap_or(""))
    .fetch_one(pool)
    .await
}

pub async fn recipient_by_hash(
    pool: &SqlitePool,
    campaign_id: &str,
    email_hash: &str,
) -> Result<Option<CampaignRecipient>, sqlx::Error> {
    sqlx::query_as::<_, CampaignRecipient>(
        "SELECT * FROM campaign_recipients WHERE campaign_id = ? AND email_hash = ?",
    )
    .bind(campaign_id)
    .bind(email_hash)
    .fetch_optional(pool)
    .await
}
