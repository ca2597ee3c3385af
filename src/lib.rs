pub mod bounce;
pub mod config;
pub mod db;
pub mod models;
pub mod routes;
pub mod services;
pub mod smtp;
pub mod template;
pub mod token;

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::config::Config;

/// Shared application state handed to every route handler.
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Arc<Config>,
}

impl axum::extract::FromRef<AppState> for SqlitePool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

impl axum::extract::FromRef<AppState> for Arc<Config> {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}
