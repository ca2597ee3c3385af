//! Relay credential stash.
//!
//! Fast path: an in-process cache keyed by campaign, filled at
//! start/resume so same-process ticks never touch the durable store.
//! Degraded mode (cross-process invocation, restart): the credentials are
//! also written to the campaign row's `relay_snapshot` column, clearly a
//! fallback and erased the moment the campaign reaches a terminal state —
//! secrets never outlive one campaign.

use std::collections::HashMap;

use anyhow::Result;
use once_cell::sync::Lazy;
use sqlx::SqlitePool;
use tokio::sync::RwLock;

use crate::db::queries;
use crate::models::campaign::Campaign;
use crate::smtp::RelayConfig;

static RELAY_CACHE: Lazy<RwLock<HashMap<String, RelayConfig>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Store credentials for a live campaign: cache plus durable fallback.
pub async fn stash(pool: &SqlitePool, campaign_id: &str, config: &RelayConfig) -> Result<()> {
    {
        let mut cache = RELAY_CACHE.write().await;
        cache.insert(campaign_id.to_string(), config.clone());
    }
    let snapshot = serde_json::to_string(config)?;
    queries::set_relay_snapshot(pool, campaign_id, &snapshot).await?;
    Ok(())
}

/// Resolve credentials for a batch run: cache first, snapshot second.
pub async fn resolve(campaign: &Campaign) -> Option<RelayConfig> {
    {
        let cache = RELAY_CACHE.read().await;
        if let Some(config) = cache.get(&campaign.id) {
            return Some(config.clone());
        }
    }
    let snapshot = campaign.relay_snapshot.as_deref()?;
    match serde_json::from_str::<RelayConfig>(snapshot) {
        Ok(config) => {
            tracing::debug!(campaign = %campaign.id, "relay credentials from durable fallback");
            Some(config)
        }
        Err(e) => {
            tracing::warn!(campaign = %campaign.id, error = %e, "corrupt relay snapshot");
            None
        }
    }
}

/// Mandatory erasure on completion/stop: cache entry and durable snapshot.
pub async fn erase(pool: &SqlitePool, campaign_id: &str) -> Result<()> {
    {
        let mut cache = RELAY_CACHE.write().await;
        cache.remove(campaign_id);
    }
    queries::clear_relay_snapshot(pool, campaign_id).await?;
    Ok(())
}
