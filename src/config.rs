use std::env;

/// Runtime configuration, read once from the environment at startup.
///
/// Everything has a default so a bare `cargo run` works against a local
/// sqlite file; production deployments override via env / .env.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    /// Signing key for tracking tokens. Comes from the deployment's secret
    /// store; the fallback value is for local development only.
    pub tracking_secret: String,
    /// Public base URL used when embedding tracking pixels and links.
    pub tracking_base_url: String,
    /// Max recipients attempted per `advance` invocation.
    pub batch_size: u32,
    /// Wall-clock budget for one `advance` invocation, in milliseconds.
    pub invocation_budget_ms: u64,
    /// TTL of the per-campaign processing lease, in milliseconds. Must
    /// comfortably exceed the invocation budget so a live run never loses
    /// its lease mid-batch.
    pub lease_ttl_ms: u64,
    /// Global safety envelope for per-campaign delay bounds.
    pub delay_floor_ms: u64,
    pub delay_ceiling_ms: u64,
    /// Max simultaneously queued/running campaigns per owner.
    pub max_campaigns_per_owner: u32,
    /// Sends allowed per owner within the rate window.
    pub send_rate_limit: u32,
    pub send_rate_window_ms: u64,
    /// Background tick interval for the campaign scheduler.
    pub tick_secs: u64,
}

impl Config {
    pub fn from_env() -> Self {
        let port = env_parse("PORT", 8080u16);
        Config {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://sendora_hub.db".into()),
            port,
            tracking_secret: env::var("TRACKING_SECRET").unwrap_or_else(|_| {
                tracing::warn!("TRACKING_SECRET not set, using development key");
                "sendora-dev-tracking-key".into()
            }),
            tracking_base_url: env::var("TRACKING_BASE_URL")
                .unwrap_or_else(|_| format!("http://localhost:{port}")),
            batch_size: env_parse("BATCH_SIZE", 10),
            invocation_budget_ms: env_parse("INVOCATION_BUDGET_MS", 50_000),
            lease_ttl_ms: env_parse("LEASE_TTL_MS", 120_000),
            delay_floor_ms: env_parse("DELAY_FLOOR_MS", 1_000),
            delay_ceiling_ms: env_parse("DELAY_CEILING_MS", 900_000),
            max_campaigns_per_owner: env_parse("MAX_CAMPAIGNS_PER_OWNER", 3),
            send_rate_limit: env_parse("SEND_RATE_LIMIT", 60),
            send_rate_window_ms: env_parse("SEND_RATE_WINDOW_MS", 60_000),
            tick_secs: env_parse("SCHEDULER_TICK_SECS", 30),
        }
    }

    /// A config suitable for tests: tight budgets, no artificial delays.
    pub fn for_tests() -> Self {
        Config {
            database_url: "sqlite::memory:".into(),
            port: 0,
            tracking_secret: "test-tracking-key".into(),
            tracking_base_url: "http://localhost:0".into(),
            batch_size: 3,
            invocation_budget_ms: 30_000,
            lease_ttl_ms: 10_000,
            delay_floor_ms: 0,
            delay_ceiling_ms: 900_000,
            max_campaigns_per_owner: 3,
            send_rate_limit: 10_000,
            send_rate_window_ms: 60_000,
            tick_secs: 1,
        }
    }
}

fn env_parse<T: std::str::FromStr + Copy>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
