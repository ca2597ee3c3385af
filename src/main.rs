use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use sendora_hub::config::Config;
use sendora_hub::{db, routes, services, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,sendora_hub=debug")),
        )
        .init();

    let config = Arc::new(Config::from_env());

    let pool = db::connect(&config.database_url).await?;
    db::run_migrations(&pool).await?;

    // The external trigger that keeps running campaigns advancing.
    services::scheduler::start(pool.clone(), config.clone());

    let state = AppState {
        pool,
        config: config.clone(),
    };
    let app = routes::router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("sendora-hub listening on {addr}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
