//! Concurrency and send-rate ceilings, backed by the shared store so they
//! hold across every engine instance, not just this process.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::db::queries;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub remaining: u32,
    /// Unix millis at which the oldest counted hit falls out of the window.
    pub reset_at: i64,
}

/// Can this owner have one more queued/running campaign?
pub async fn try_acquire_campaign_slot(
    pool: &SqlitePool,
    owner_id: &str,
    max_per_owner: u32,
    exclude_campaign: Option<&str>,
) -> Result<bool> {
    let active = queries::count_active_for_owner(pool, owner_id, exclude_campaign).await?;
    Ok(active < max_per_owner as i64)
}

/// Sliding-window rate check over the shared `rate_hits` table. Counts a
/// hit only when allowed, so denied calls never consume budget.
pub async fn check_rate(
    pool: &SqlitePool,
    key: &str,
    limit: u32,
    window_ms: u64,
) -> Result<RateDecision> {
    let now = chrono::Utc::now().timestamp_millis();
    let window_start = now - window_ms as i64;

    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM rate_hits WHERE key = ? AND hit_at <= ?")
        .bind(key)
        .bind(window_start)
        .execute(&mut *tx)
        .await?;
    let used: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM rate_hits WHERE key = ?")
        .bind(key)
        .fetch_one(&mut *tx)
        .await?;
    let allowed = used < limit as i64;
    if allowed {
        sqlx::query("INSERT INTO rate_hits (key, hit_at) VALUES (?, ?)")
            .bind(key)
            .bind(now)
            .execute(&mut *tx)
            .await?;
    }
    let oldest: Option<i64> = sqlx::query_scalar("SELECT MIN(hit_at) FROM rate_hits WHERE key = ?")
        .bind(key)
        .fetch_one(&mut *tx)
        .await?;
    tx.commit().await?;

    let used_after = used + i64::from(allowed);
    Ok(RateDecision {
        allowed,
        remaining: (limit as i64 - used_after).max(0) as u32,
        reset_at: oldest.map_or(now + window_ms as i64, |o| o + window_ms as i64),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[tokio::test]
    async fn rate_window_fills_and_denies() {
        let pool = db::connect_for_tests().await;
        for i in 0..3 {
            let d = check_rate(&pool, "owner:send", 3, 60_000).await.unwrap();
            assert!(d.allowed, "hit {i} should be allowed");
            assert_eq!(d.remaining, 2 - i);
        }
        let denied = check_rate(&pool, "owner:send", 3, 60_000).await.unwrap();
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
        assert!(denied.reset_at > 0);
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let pool = db::connect_for_tests().await;
        let _ = check_rate(&pool, "a", 1, 60_000).await.unwrap();
        assert!(!check_rate(&pool, "a", 1, 60_000).await.unwrap().allowed);
        assert!(check_rate(&pool, "b", 1, 60_000).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn expired_hits_fall_out_of_the_window() {
        let pool = db::connect_for_tests().await;
        assert!(check_rate(&pool, "k", 1, 0).await.unwrap().allowed);
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        // Window 0: the previous hit has already aged out.
        assert!(check_rate(&pool, "k", 1, 0).await.unwrap().allowed);
    }
}
