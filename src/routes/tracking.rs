/// Open/click/unsubscribe endpoints. These are hit by mail clients and
/// link scanners, so they always answer 200-ish regardless of token
/// validity: an invalid token simply means "no tracking data".
use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{Html, IntoResponse, Redirect},
};
use sqlx::SqlitePool;

use crate::config::Config;
use crate::services::tracking_service;
use crate::token;

/// Transparent 1x1 GIF.
static PIXEL_GIF: [u8; 43] = [
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00,
    0x00, 0xFF, 0xFF, 0xFF, 0x21, 0xF9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2C, 0x00, 0x00,
    0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x44, 0x01, 0x00, 0x3B,
];

/// GET /track/open/:token - open pixel
pub async fn open_pixel(
    State(pool): State<SqlitePool>,
    State(config): State<Arc<Config>>,
    Path(raw_token): Path<String>,
) -> impl IntoResponse {
    if let Some(payload) = token::verify(config.tracking_secret.as_bytes(), &raw_token) {
        if let Err(e) = tracking_service::record_open(&pool, &payload).await {
            tracing::warn!(campaign = %payload.c, error = %e, "open not recorded");
        }
    }
    ([(header::CONTENT_TYPE, "image/gif")], PIXEL_GIF.as_slice())
}

/// GET /track/click/:token?url= - click-through redirect
pub async fn click(
    State(pool): State<SqlitePool>,
    State(config): State<Arc<Config>>,
    Path(raw_token): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let url = params
        .get("url")
        .filter(|u| u.starts_with("http://") || u.starts_with("https://"))
        .cloned()
        .unwrap_or_else(|| "/".to_string());

    if let Some(payload) = token::verify(config.tracking_secret.as_bytes(), &raw_token) {
        if let Err(e) = tracking_service::record_click(&pool, &payload, &url).await {
            tracing::warn!(campaign = %payload.c, error = %e, "click not recorded");
        }
    }
    Redirect::temporary(&url)
}

/// GET /unsubscribe/:token
pub async fn unsubscribe(
    State(pool): State<SqlitePool>,
    State(config): State<Arc<Config>>,
    Path(raw_token): Path<String>,
) -> impl IntoResponse {
    if let Some(payload) = token::verify(config.tracking_secret.as_bytes(), &raw_token) {
        if let Err(e) = tracking_service::record_unsubscribe(&pool, &payload).await {
            tracing::warn!(campaign = %payload.c, error = %e, "unsubscribe not recorded");
        }
    }
    Html("<html><body><p>You have been unsubscribed.</p></body></html>")
}
