//! Per-campaign processing lease.
//!
//! "status is running" does not serialize overlapping triggers (a cron
//! tick can fire while a manual advance is mid-flight), so every batch
//! run must hold this lease. The store is the shared database, which all
//! engine instances already see; expiry handles crashed holders.

use sqlx::SqlitePool;

fn lease_key(campaign_id: &str) -> String {
    format!("campaign-lease:{campaign_id}")
}

/// Try to take the campaign's lease. Atomic: the insert only overwrites a
/// row whose previous lease has expired, so exactly one concurrent caller
/// wins.
pub async fn acquire(
    pool: &SqlitePool,
    campaign_id: &str,
    holder: &str,
    ttl_ms: u64,
) -> Result<bool, sqlx::Error> {
    let now = chrono::Utc::now().timestamp_millis();
    let res = sqlx::query(
        r#"
        INSERT INTO kv_leases (key, holder, expires_at) VALUES (?, ?, ?)
        ON CONFLICT(key) DO UPDATE SET
            holder = excluded.holder,
            expires_at = excluded.expires_at
        WHERE kv_leases.expires_at <= ?
        "#,
    )
    .bind(lease_key(campaign_id))
    .bind(holder)
    .bind(now + ttl_ms as i64)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(res.rows_affected() > 0)
}

/// Release only our own lease; a holder that lost it to expiry must not
/// clobber the new owner's.
pub async fn release(
    pool: &SqlitePool,
    campaign_id: &str,
    holder: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM kv_leases WHERE key = ? AND holder = ?")
        .bind(lease_key(campaign_id))
        .bind(holder)
        .execute(pool)
        .await?;
    Ok(())
}
