pub mod queries;

use anyhow::Result;
use sqlx::SqlitePool;

/// sqlx expects `sqlite://path` or `sqlite::memory:`; accept bare paths too.
pub fn normalize_sqlite_url(raw: &str) -> String {
    if raw.starts_with("sqlite:") {
        raw.to_string()
    } else {
        format!("sqlite://{raw}")
    }
}

pub async fn connect(database_url: &str) -> Result<SqlitePool> {
    let url = normalize_sqlite_url(database_url);
    // File-based sqlite fails to open a missing file on some setups.
    if let Some(path) = url.strip_prefix("sqlite://") {
        if !path.is_empty() && path != ":memory:" && !std::path::Path::new(path).exists() {
            if let Some(parent) = std::path::Path::new(path).parent() {
                std::fs::create_dir_all(parent).ok();
            }
            std::fs::File::create(path).ok();
        }
    }
    let pool = SqlitePool::connect(&url).await?;
    Ok(pool)
}

/// Idempotent schema setup; safe to run on every start.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS campaigns (
            id               TEXT PRIMARY KEY,
            owner_id         TEXT NOT NULL,
            status           TEXT NOT NULL DEFAULT 'queued',
            total_count      INTEGER NOT NULL DEFAULT 0,
            sent_count       INTEGER NOT NULL DEFAULT 0,
            failed_count     INTEGER NOT NULL DEFAULT 0,
            delay_min_ms     INTEGER NOT NULL,
            delay_max_ms     INTEGER NOT NULL,
            subject_template TEXT NOT NULL,
            body_template    TEXT NOT NULL,
            from_address     TEXT NOT NULL,
            from_name        TEXT,
            track_opens      INTEGER NOT NULL DEFAULT 0,
            relay_snapshot   TEXT,
            next_email_at    INTEGER,
            error_message    TEXT,
            created_at       INTEGER NOT NULL,
            started_at       INTEGER,
            paused_at        INTEGER,
            completed_at     INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS campaign_recipients (
            id            TEXT PRIMARY KEY,
            campaign_id   TEXT NOT NULL,
            email         TEXT NOT NULL,
            variables     TEXT NOT NULL DEFAULT '{}',
            email_hash    TEXT NOT NULL,
            status        TEXT NOT NULL DEFAULT 'pending',
            sort_order    INTEGER NOT NULL,
            tracking_token TEXT,
            sent_at       INTEGER,
            failed_at     INTEGER,
            opened_at     INTEGER,
            clicked_at    INTEGER,
            error_message TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_recipients_pending
         ON campaign_recipients (campaign_id, status, sort_order)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_recipients_hash
         ON campaign_recipients (campaign_id, email_hash)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS bounce_records (
            owner_id    TEXT NOT NULL,
            email       TEXT NOT NULL,
            kind        TEXT NOT NULL,
            reason      TEXT NOT NULL,
            campaign_id TEXT,
            bounced_at  INTEGER NOT NULL,
            PRIMARY KEY (owner_id, email)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tracking_events (
            id          TEXT PRIMARY KEY,
            campaign_id TEXT NOT NULL,
            email_hash  TEXT NOT NULL,
            kind        TEXT NOT NULL,
            url         TEXT,
            created_at  INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS unsubscribes (
            owner_id   TEXT NOT NULL,
            email      TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            PRIMARY KEY (owner_id, email)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS kv_leases (
            key        TEXT PRIMARY KEY,
            holder     TEXT NOT NULL,
            expires_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS rate_hits (
            key    TEXT NOT NULL,
            hit_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_rate_hits ON rate_hits (key, hit_at)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Fresh in-memory pool with schema, for tests. Single connection: each
/// sqlite `:memory:` connection is its own database.
pub async fn connect_for_tests() -> SqlitePool {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    run_migrations(&pool).await.expect("migrations");
    pool
}
