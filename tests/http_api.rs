//! Route-level tests: the axum router wired to an in-memory store,
//! driven with `tower::ServiceExt::oneshot`.

mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use common::{create_campaign, test_config, test_pool};
use sendora_hub::{routes, AppState};

async fn app() -> (axum::Router, AppState) {
    let state = AppState {
        pool: test_pool().await,
        config: Arc::new(test_config()),
    };
    (routes::router(state.clone()), state)
}

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn healthz_responds() {
    let (app, _) = app().await;
    let response = app
        .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn create_and_poll_a_campaign() {
    let (app, _) = app().await;

    let create = json_request(
        "POST",
        "/campaigns",
        serde_json::json!({
            "owner_id": "owner-http",
            "subject": "Hi {{firstName}}",
            "body": "<p>Hello {{name}}</p>",
            "from_address": "news@sender.example",
            "from_name": "Newsroom",
            "delay_min_ms": 0,
            "delay_max_ms": 0,
            "recipients": [
                {"email": "a@example.com", "variables": {"name": "Ada L"}},
                {"email": "b@example.com"}
            ]
        }),
    );
    let response = app.clone().oneshot(create).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = json_body(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["total"], 2);
    let id = body["campaign_id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(
            Request::get(format!("/campaigns/{id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let snapshot = json_body(response).await;
    assert_eq!(snapshot["status"], "queued");
    assert_eq!(snapshot["total_count"], 2);
    assert_eq!(snapshot["sent_count"], 0);

    let response = app
        .oneshot(
            Request::get("/campaigns?owner_id=owner-http")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let list = json_body(response).await;
    assert_eq!(list.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn create_rejects_crossed_delay_bounds() {
    let (app, _) = app().await;
    let response = app
        .oneshot(json_request(
            "POST",
            "/campaigns",
            serde_json::json!({
                "owner_id": "owner-bad",
                "subject": "s",
                "body": "b",
                "from_address": "news@sender.example",
                "delay_min_ms": 9000,
                "delay_max_ms": 100,
                "recipients": [{"email": "a@example.com"}]
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn lifecycle_violations_map_to_conflict() {
    let (app, state) = app().await;
    let id = create_campaign(&state.pool, &state.config, "owner-conflict", 1, false).await;

    // Pausing a queued campaign is an invalid transition.
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/campaigns/{id}/pause"),
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // Unknown campaigns are 404.
    let response = app
        .oneshot(json_request(
            "POST",
            "/campaigns/no-such-id/stop",
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn tracking_endpoints_never_error_on_invalid_tokens() {
    let (app, _) = app().await;

    let response = app
        .clone()
        .oneshot(
            Request::get("/track/open/definitely-not-a-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "image/gif",
        "an invalid token still gets the pixel"
    );

    let response = app
        .clone()
        .oneshot(
            Request::get("/track/click/garbage?url=https://example.com/page")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(
        response.headers()[header::LOCATION],
        "https://example.com/page"
    );

    // Non-http schemes are not followed.
    let response = app
        .clone()
        .oneshot(
            Request::get("/track/click/garbage?url=javascript:alert(1)")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.headers()[header::LOCATION], "/");

    let response = app
        .oneshot(
            Request::get("/unsubscribe/not-a-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn open_tracking_records_an_event() {
    let (app, state) = app().await;
    let id = create_campaign(&state.pool, &state.config, "owner-pixel", 1, true).await;

    let token = sendora_hub::token::mint(
        state.config.tracking_secret.as_bytes(),
        &id,
        "recipient0@example.com",
        "owner-pixel",
    );
    let response = app
        .oneshot(
            Request::get(format!("/track/open/{token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let events: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM tracking_events WHERE campaign_id = ?")
            .bind(&id)
            .fetch_one(&state.pool)
            .await
            .unwrap();
    assert_eq!(events, 1);

    let opened: Option<i64> = sqlx::query_scalar(
        "SELECT opened_at FROM campaign_recipients WHERE campaign_id = ?",
    )
    .bind(&id)
    .fetch_one(&state.pool)
    .await
    .unwrap();
    assert!(opened.is_some(), "first open stamps the recipient row");
}
