/// Campaign management endpoints. Thin wrappers: parse, call the service,
/// map the service error onto a status code.
use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::models::campaign::Campaign;
use crate::services::campaign_service::{
    self, CampaignError, NewCampaign, NewRecipient,
};
use crate::services::delivery_service;
use crate::smtp::{RelayConfig, SmtpConnector};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct RecipientInput {
    pub email: String,
    #[serde(default)]
    pub variables: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct CreateCampaignRequest {
    pub owner_id: String,
    pub subject: String,
    pub body: String,
    pub from_address: String,
    pub from_name: Option<String>,
    #[serde(default)]
    pub track_opens: bool,
    pub delay_min_ms: u64,
    pub delay_max_ms: u64,
    pub recipients: Vec<RecipientInput>,
}

#[derive(Debug, Serialize)]
pub struct CreateCampaignResponse {
    pub success: bool,
    pub campaign_id: String,
    pub total: i64,
    pub skipped: usize,
}

/// POST /campaigns - create a campaign with its full recipient list
pub async fn create_campaign(
    State(state): State<AppState>,
    Json(req): Json<CreateCampaignRequest>,
) -> impl IntoResponse {
    let spec = NewCampaign {
        owner_id: req.owner_id,
        subject_template: req.subject,
        body_template: req.body,
        from_address: req.from_address,
        from_name: req.from_name,
        track_opens: req.track_opens,
        delay_min_ms: req.delay_min_ms,
        delay_max_ms: req.delay_max_ms,
        recipients: req
            .recipients
            .into_iter()
            .map(|r| NewRecipient {
                email: r.email,
                variables: r.variables,
            })
            .collect(),
    };
    match campaign_service::create(&state.pool, &state.config, spec).await {
        Ok(outcome) => (
            StatusCode::CREATED,
            Json(CreateCampaignResponse {
                success: true,
                campaign_id: outcome.campaign_id,
                total: outcome.total,
                skipped: outcome.skipped,
            }),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct RelayConfigRequest {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl From<RelayConfigRequest> for RelayConfig {
    fn from(req: RelayConfigRequest) -> Self {
        RelayConfig {
            host: req.host,
            port: req.port,
            username: req.username,
            password: req.password,
        }
    }
}

/// POST /campaigns/:id/start - probe the relay and begin sending
pub async fn start_campaign(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<RelayConfigRequest>,
) -> impl IntoResponse {
    match campaign_service::start(&state.pool, &state.config, &SmtpConnector, &id, req.into())
        .await
    {
        Ok(()) => ok_response("campaign started"),
        Err(e) => error_response(e),
    }
}

/// POST /campaigns/:id/pause
pub async fn pause_campaign(
    State(pool): State<SqlitePool>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match campaign_service::pause(&pool, &id).await {
        Ok(()) => ok_response("campaign paused"),
        Err(e) => error_response(e),
    }
}

/// POST /campaigns/:id/resume - credentials must be supplied again
pub async fn resume_campaign(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<RelayConfigRequest>,
) -> impl IntoResponse {
    match campaign_service::resume(&state.pool, &SmtpConnector, &id, req.into()).await {
        Ok(()) => ok_response("campaign resumed"),
        Err(e) => error_response(e),
    }
}

/// POST /campaigns/:id/stop - terminal; cancels all pending recipients
pub async fn stop_campaign(
    State(pool): State<SqlitePool>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match campaign_service::stop(&pool, &id).await {
        Ok(()) => ok_response("campaign stopped"),
        Err(e) => error_response(e),
    }
}

#[derive(Debug, Serialize)]
pub struct AdvanceResponse {
    pub success: bool,
    pub sent: u32,
    pub failed: u32,
    pub completed: bool,
}

/// POST /campaigns/:id/advance - run one batch now
pub async fn advance_campaign(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match delivery_service::advance(&state.pool, &state.config, &SmtpConnector, &id).await {
        Ok(outcome) => Json(AdvanceResponse {
            success: true,
            sent: outcome.sent,
            failed: outcome.failed,
            completed: outcome.completed,
        })
        .into_response(),
        Err(e) => {
            tracing::error!(campaign = %id, error = %e, "advance failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorBody {
                    success: false,
                    message: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CampaignResponse {
    pub id: String,
    pub owner_id: String,
    pub status: String,
    pub total_count: i64,
    pub sent_count: i64,
    pub failed_count: i64,
    pub delay_min_ms: i64,
    pub delay_max_ms: i64,
    pub track_opens: bool,
    pub next_email_at: Option<i64>,
    pub error_message: Option<String>,
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub paused_at: Option<i64>,
    pub completed_at: Option<i64>,
}

impl From<Campaign> for CampaignResponse {
    fn from(c: Campaign) -> Self {
        CampaignResponse {
            id: c.id,
            owner_id: c.owner_id,
            status: c.status.as_str().to_string(),
            total_count: c.total_count,
            sent_count: c.sent_count,
            failed_count: c.failed_count,
            delay_min_ms: c.delay_min_ms,
            delay_max_ms: c.delay_max_ms,
            track_opens: c.track_opens,
            next_email_at: c.next_email_at,
            error_message: c.error_message,
            created_at: c.created_at,
            started_at: c.started_at,
            paused_at: c.paused_at,
            completed_at: c.completed_at,
        }
    }
}

/// GET /campaigns/:id - status snapshot for polling UIs
pub async fn get_campaign(
    State(pool): State<SqlitePool>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match campaign_service::snapshot(&pool, &id).await {
        Ok(campaign) => Json(CampaignResponse::from(campaign)).into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub owner_id: String,
}

/// GET /campaigns?owner_id= - owner's campaigns, newest first
pub async fn list_campaigns(
    State(pool): State<SqlitePool>,
    Query(query): Query<ListQuery>,
) -> impl IntoResponse {
    match crate::db::queries::fetch_campaigns_for_owner(&pool, &query.owner_id).await {
        Ok(campaigns) => Json(
            campaigns
                .into_iter()
                .map(CampaignResponse::from)
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "listing campaigns failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[derive(Debug, Serialize)]
struct OkBody {
    success: bool,
    message: &'static str,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    message: String,
}

fn ok_response(message: &'static str) -> axum::response::Response {
    Json(OkBody {
        success: true,
        message,
    })
    .into_response()
}

fn error_response(e: CampaignError) -> axum::response::Response {
    let status = match &e {
        CampaignError::NotFound => StatusCode::NOT_FOUND,
        CampaignError::InvalidState(_) => StatusCode::CONFLICT,
        CampaignError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        CampaignError::InvalidDelayBounds(_) | CampaignError::NoRecipients => {
            StatusCode::BAD_REQUEST
        }
        CampaignError::RelayUnverified(_) => StatusCode::BAD_GATEWAY,
        CampaignError::Store(_) | CampaignError::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    if status.is_server_error() {
        tracing::error!(error = %e, "campaign operation failed");
    }
    (
        status,
        Json(ErrorBody {
            success: false,
            message: e.to_string(),
        }),
    )
        .into_response()
}
