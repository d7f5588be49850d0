//! Integration tests for the HTTP control surface.
//!
//! The router runs against the in-memory store and a scripted channel, so no
//! database or bot token is needed.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use dice_baccarat::{
    GameConfig, MemoryStore, RoomManager, effects::channel::testing::MockChannel,
};
use dice_server::api::{AppState, create_router, request_id::REQUEST_ID_HEADER};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt; // For `oneshot` method

struct TestServer {
    app: axum::Router,
    store: Arc<MemoryStore>,
    channel: MockChannel,
}

fn create_test_server() -> TestServer {
    let store = Arc::new(MemoryStore::new());
    let channel = MockChannel::new();
    let manager = RoomManager::new(
        GameConfig::default(),
        store.clone(),
        Arc::new(channel.clone()),
    );

    let app = create_router(AppState {
        manager: Arc::new(manager),
        database: None,
    });

    TestServer {
        app,
        store,
        channel,
    }
}

async fn send(app: &axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder().method("POST").uri(uri);
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

fn bet(participant: i64, class: &str, amount: i64) -> Option<Value> {
    Some(json!({
        "participant": participant,
        "display_name": format!("user{participant}"),
        "class": class,
        "amount": amount,
    }))
}

// ============================================================================
// Health Check Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_health_check_endpoint() {
    let server = create_test_server();

    let (status, body) = send(&server.app, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"], "in_memory");
    assert_eq!(body["active_rooms"], 0);
}

#[tokio::test(start_paused = true)]
async fn test_request_id_is_echoed() {
    let server = create_test_server();

    let request = Request::builder()
        .uri("/health")
        .header(REQUEST_ID_HEADER, "abc-123")
        .body(Body::empty())
        .unwrap();
    let response = server.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.headers()[REQUEST_ID_HEADER], "abc-123");

    let response = server.app.clone().oneshot(get("/health")).await.unwrap();
    assert!(response.headers().contains_key(REQUEST_ID_HEADER));
}

// ============================================================================
// Round Lifecycle Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_start_bet_and_status() {
    let server = create_test_server();

    let (status, body) = send(&server.app, post("/api/v1/rooms/-1001/start", None)).await;
    assert_eq!(status, StatusCode::CREATED);
    let round_id = body["round_id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &server.app,
        post("/api/v1/rooms/-1001/bets", bet(7, "banker", 100)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["round_id"], round_id.as_str());
    assert_eq!(body["class"], "side_a");
    assert_eq!(body["class_stake"], 100);
    assert_eq!(body["total_stake"], 100);

    let (status, body) = send(&server.app, get("/api/v1/rooms/-1001")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["phase"], "Betting");
    assert_eq!(body["round_id"], round_id.as_str());
    assert_eq!(body["bets"]["7"]["display_name"], "user7");
}

#[tokio::test(start_paused = true)]
async fn test_close_accepts_and_round_finishes() {
    let server = create_test_server();

    send(&server.app, post("/api/v1/rooms/5/start", None)).await;
    send(&server.app, post("/api/v1/rooms/5/bets", bet(1, "tie", 10))).await;

    let (status, _) = send(&server.app, post("/api/v1/rooms/5/close", None)).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    tokio::time::sleep(std::time::Duration::from_secs(120)).await;
    let (_, body) = send(&server.app, get("/api/v1/rooms/5")).await;
    assert_eq!(body["phase"], "Finished");
    assert!(body["outcome"].is_object());
    assert_eq!(server.store.history().await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stop_reports_whether_round_ran() {
    let server = create_test_server();

    send(&server.app, post("/api/v1/rooms/9/start", None)).await;
    let (status, body) = send(&server.app, post("/api/v1/rooms/9/stop", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stopped"], true);

    let (_, body) = send(&server.app, post("/api/v1/rooms/9/stop", None)).await;
    assert_eq!(body["stopped"], false);

    let (_, body) = send(&server.app, get("/api/v1/rooms/9")).await;
    assert!(body["phase"].is_null());
}

#[tokio::test(start_paused = true)]
async fn test_auto_repeat_toggle() {
    let server = create_test_server();

    let (status, body) = send(
        &server.app,
        post("/api/v1/rooms/3/auto-repeat", Some(json!({"enabled": true}))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["auto_repeat"], true);
    assert!(body["started"].is_string());

    let (_, body) = send(
        &server.app,
        post("/api/v1/rooms/3/auto-repeat", Some(json!({"enabled": false}))),
    )
    .await;
    assert_eq!(body["auto_repeat"], false);
    assert!(body["started"].is_null());

    let (_, body) = send(&server.app, get("/api/v1/rooms/3")).await;
    assert_eq!(body["auto_repeat"], false);
    assert_eq!(body["phase"], "Betting");
}

// ============================================================================
// Error Mapping Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_validation_errors_are_bad_request() {
    let server = create_test_server();
    send(&server.app, post("/api/v1/rooms/1/start", None)).await;

    let (status, body) = send(
        &server.app,
        post("/api/v1/rooms/1/bets", bet(1, "dragon", 10)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "validation");
    assert!(body["error"].as_str().unwrap().contains("dragon"));

    let (status, body) = send(&server.app, post("/api/v1/rooms/1/bets", bet(1, "tie", -5))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "validation");

    send(&server.app, post("/api/v1/rooms/1/bets", bet(1, "tie", 5))).await;
    let (status, body) = send(
        &server.app,
        post("/api/v1/rooms/1/bets", bet(1, "tie", i64::MAX)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "validation");
    let (status, _) = send(&server.app, get("/api/v1/rooms/1")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &server.app,
        post(
            "/api/v1/rooms/1/bets",
            Some(json!({"participant": 1, "display_name": "  ", "class": "tie", "amount": 5})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "validation");
}

#[tokio::test(start_paused = true)]
async fn test_state_conflicts_are_409() {
    let server = create_test_server();

    let (status, body) = send(&server.app, post("/api/v1/rooms/2/bets", bet(1, "tie", 5))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "state_conflict");

    send(&server.app, post("/api/v1/rooms/2/start", None)).await;
    let (status, body) = send(&server.app, post("/api/v1/rooms/2/start", None)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("already in progress"));
}

#[tokio::test(start_paused = true)]
async fn test_store_failure_is_internal() {
    let server = create_test_server();
    send(&server.app, post("/api/v1/rooms/4/start", None)).await;

    server.store.set_unavailable(true);
    let (status, body) = send(&server.app, post("/api/v1/rooms/4/bets", bet(1, "player", 5))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["kind"], "internal");
}

#[tokio::test(start_paused = true)]
async fn test_malformed_room_id_is_rejected() {
    let server = create_test_server();

    let response = server
        .app
        .clone()
        .oneshot(get("/api/v1/rooms/not-a-number"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(server.channel.texts().is_empty());
}
