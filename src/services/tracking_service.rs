//! Recording of opens, clicks and unsubscribes from verified tokens.
//!
//! Callers hand in an already-verified payload; everything here is
//! best-effort bookkeeping. A recipient row that has since disappeared
//! just means the event is recorded without a row stamp.

use anyhow::Result;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::queries;
use crate::token::TokenPayload;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Open,
    Click,
    Unsubscribe,
}

impl EventKind {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Click => "click",
            Self::Unsubscribe => "unsubscribe",
        }
    }
}

pub async fn record_open(pool: &SqlitePool, payload: &TokenPayload) -> Result<()> {
    record_event(pool, payload, EventKind::Open, None).await?;
    stamp_first(pool, payload, "opened_at").await?;
    Ok(())
}

pub async fn record_click(pool: &SqlitePool, payload: &TokenPayload, url: &str) -> Result<()> {
    record_event(pool, payload, EventKind::Click, Some(url)).await?;
    stamp_first(pool, payload, "clicked_at").await?;
    Ok(())
}

/// Unsubscribe applies owner-wide: future campaigns for this owner skip
/// the address at creation time.
pub async fn record_unsubscribe(pool: &SqlitePool, payload: &TokenPayload) -> Result<()> {
    record_event(pool, payload, EventKind::Unsubscribe, None).await?;
    let Some(recipient) = queries::recipient_by_hash(pool, &payload.c, &payload.e).await? else {
        return Ok(());
    };
    sqlx::query(
        "INSERT INTO unsubscribes (owner_id, email, created_at) VALUES (?, ?, ?)
         ON CONFLICT(owner_id, email) DO NOTHING",
    )
    .bind(&payload.u)
    .bind(recipient.email.to_lowercase())
    .bind(chrono::Utc::now().timestamp())
    .execute(pool)
    .await?;
    tracing::info!(campaign = %payload.c, "recipient unsubscribed");
    Ok(())
}

async fn record_event(
    pool: &SqlitePool,
    payload: &TokenPayload,
    kind: EventKind,
    url: Option<&str>,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO tracking_events (id, campaign_id, email_hash, kind, url, created_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(&payload.c)
    .bind(&payload.e)
    .bind(kind.as_str())
    .bind(url)
    .bind(chrono::Utc::now().timestamp())
    .execute(pool)
    .await?;
    Ok(())
}

/// Stamp opened_at/clicked_at on the recipient row, first event only.
async fn stamp_first(pool: &SqlitePool, payload: &TokenPayload, column: &str) -> Result<()> {
    // `column` is one of two literals above, never caller input.
    let sql = format!(
        "UPDATE campaign_recipients SET {column} = ?
         WHERE campaign_id = ? AND email_hash = ? AND {column} IS NULL"
    );
    sqlx::query(&sql)
        .bind(chrono::Utc::now().timestamp())
        .bind(&payload.c)
        .bind(&payload.e)
        .execute(pool)
        .await?;
    Ok(())
}
