pub mod campaigns;
pub mod tracking;

use axum::{
    routing::{get, post},
    Router,
};

use crate::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route(
            "/campaigns",
            post(campaigns::create_campaign).get(campaigns::list_campaigns),
        )
        .route("/campaigns/:id", get(campaigns::get_campaign))
        .route("/campaigns/:id/start", post(campaigns::start_campaign))
        .route("/campaigns/:id/pause", post(campaigns::pause_campaign))
        .route("/campaigns/:id/resume", post(campaigns::resume_campaign))
        .route("/campaigns/:id/stop", post(campaigns::stop_campaign))
        .route("/campaigns/:id/advance", post(campaigns::advance_campaign))
        .route("/track/open/:token", get(tracking::open_pixel))
        .route("/track/click/:token", get(tracking::click))
        .route("/unsubscribe/:token", get(tracking::unsubscribe))
        .with_state(state)
}
