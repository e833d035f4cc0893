//! Integration Tests for API Endpoints
//!
//! Tests full request/response cycle through the router, including the
//! route guard and the realtime bridge.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use taskdesk_sync::{
    api::create_router,
    backend::{BackendError, DataService, MemoryBackend, Row},
    cache::{CacheConfig, QueryClient, RetryPolicy},
    guard::{Role, Session},
    realtime::{BridgeConfig, RealtimeBridge},
    AppState,
};
use tokio_test::assert_ok;
use tower::ServiceExt;

// == Helper Functions ==

fn cache_config() -> CacheConfig {
    CacheConfig {
        stale_time: Duration::from_secs(60),
        retry: RetryPolicy::none(),
        ..CacheConfig::default()
    }
}

fn create_test_state() -> (AppState, Arc<MemoryBackend>) {
    let backend = Arc::new(MemoryBackend::new());
    let state = AppState::new(backend.clone(), QueryClient::new(cache_config()));
    (state, backend)
}

fn create_test_app() -> Router {
    create_router(create_test_state().0)
}

fn row(value: Value) -> Row {
    value.as_object().cloned().unwrap()
}

async fn body_to_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_with_session(uri: &str, cookie_value: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::COOKIE, format!("session={}", cookie_value))
        .body(Body::empty())
        .unwrap()
}

fn location(response: &axum::response::Response) -> &str {
    response.headers()[header::LOCATION].to_str().unwrap()
}

// == Voucher Endpoint Tests ==

#[tokio::test]
async fn test_voucher_first_in_branch() {
    let app = create_test_app();

    let response = app
        .oneshot(post_json("/api/voucher", json!({"branch": "north", "type": "cash_out"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["voucher_no"], json!("P001"));
    assert_eq!(json["type"], json!("cash_out"));
}

#[tokio::test]
async fn test_voucher_increments_latest() {
    let (state, backend) = create_test_state();
    backend
        .seed(
            "cash_transactions",
            vec![
                row(json!({"branch": "north", "voucher_no": "P041", "created_at": "2024-03-01T09:00:00Z"})),
                row(json!({"branch": "north", "voucher_no": "P042", "created_at": "2024-03-02T09:00:00Z"})),
                row(json!({"branch": "north", "voucher_no": "R007", "created_at": "2024-03-03T09:00:00Z"})),
            ],
        )
        .await;
    let app = create_router(state);

    let response = app
        .clone()
        .oneshot(post_json("/api/voucher", json!({"branch": "north", "type": "cash_out"})))
        .await
        .unwrap();
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["voucher_no"], json!("P043"));

    let response = app
        .oneshot(post_json("/api/voucher", json!({"branch": "north", "type": "cash_in"})))
        .await
        .unwrap();
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["voucher_no"], json!("R008"));
}

#[tokio::test]
async fn test_voucher_validation_errors() {
    let app = create_test_app();

    for body in [
        json!({"type": "cash_out"}),
        json!({"branch": "north"}),
        json!({"branch": "north", "type": "refund"}),
        json!({"branch": "   ", "type": "cash_in"}),
    ] {
        let response = app
            .clone()
            .oneshot(post_json("/api/voucher", body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_to_json(response.into_body()).await;
        assert!(json["error"].is_string());
    }
}

#[tokio::test]
async fn test_voucher_malformed_body_returns_json_error() {
    let app = create_test_app();

    let wrong_type = app
        .clone()
        .oneshot(post_json("/api/voucher", json!({"branch": 5, "type": "cash_out"})))
        .await
        .unwrap();
    assert_eq!(wrong_type.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        wrong_type.headers()[header::CONTENT_TYPE],
        "application/json"
    );
    let json = body_to_json(wrong_type.into_body()).await;
    assert!(json["error"].is_string());

    let not_json = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/voucher")
                .header("content-type", "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(not_json.status(), StatusCode::BAD_REQUEST);
    let json = body_to_json(not_json.into_body()).await;
    assert!(json["error"].is_string());
}

#[tokio::test]
async fn test_voucher_corrupt_sequence_is_internal_error() {
    let (state, backend) = create_test_state();
    backend
        .seed(
            "cash_transactions",
            vec![row(json!({"branch": "north", "voucher_no": "PX1"}))],
        )
        .await;

    let response = create_router(state)
        .oneshot(post_json("/api/voucher", json!({"branch": "north", "type": "cash_out"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

// == Table Endpoint Tests ==

#[tokio::test]
async fn test_table_read_is_cached() {
    let (state, backend) = create_test_state();
    backend.seed("teams", vec![row(json!({"id": 1, "name": "core"}))]).await;
    let app = create_router(state);

    let first = app.clone().oneshot(get("/api/tables/teams")).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    let first = body_to_json(first.into_body()).await;
    assert_eq!(first["source"], json!("network"));

    let second = app.oneshot(get("/api/tables/teams")).await.unwrap();
    let second = body_to_json(second.into_body()).await;
    assert_eq!(second["source"], json!("cache"));
    assert_eq!(second["data"], first["data"]);
    assert_eq!(backend.read_count(), 1);
}

#[tokio::test]
async fn test_table_read_falls_back_to_stale_value() {
    let (state, backend) = create_test_state();
    backend.seed("staff", vec![row(json!({"id": 1, "name": "Ida"}))]).await;
    let app = create_router(state);

    app.clone().oneshot(get("/api/tables/staff")).await.unwrap();

    let response = app
        .clone()
        .oneshot(post_json("/api/cache/invalidate", json!({"namespace": "staff"})))
        .await
        .unwrap();
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["invalidated"], json!(1));

    backend.fail_next_select(BackendError::server("upstream timeout")).await;
    let response = app.oneshot(get("/api/tables/staff")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["stale"], json!(true));
    assert_eq!(json["data"][0]["name"], json!("Ida"));
    assert!(json["error"].as_str().unwrap().contains("upstream timeout"));
}

#[tokio::test]
async fn test_table_read_failure_without_value() {
    let (state, backend) = create_test_state();
    backend.fail_next_select(BackendError::server("upstream timeout")).await;

    let response = create_router(state)
        .oneshot(get("/api/tables/tasks"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_table_insert_then_read() {
    let app = create_test_app();

    let response = app
        .clone()
        .oneshot(post_json("/api/tables/tasks", json!({"title": "Restock"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let stored = body_to_json(response.into_body()).await;
    assert!(stored["id"].is_i64());

    let response = app.oneshot(get("/api/tables/tasks")).await.unwrap();
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["data"][0]["title"], json!("Restock"));
}

#[tokio::test]
async fn test_table_insert_rejects_non_object() {
    let app = create_test_app();

    let response = app
        .oneshot(post_json("/api/tables/tasks", json!(["not", "a", "row"])))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// == Cache Endpoint Tests ==

#[tokio::test]
async fn test_invalidate_unknown_namespace_is_noop() {
    let app = create_test_app();

    let response = app
        .oneshot(post_json("/api/cache/invalidate", json!({"namespace": "nothing"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["invalidated"], json!(0));
}

#[tokio::test]
async fn test_stats_endpoint() {
    let app = create_test_app();

    app.clone().oneshot(get("/api/tables/teams")).await.unwrap();
    app.clone().oneshot(get("/api/tables/teams")).await.unwrap();

    let response = app.oneshot(get("/api/cache/stats")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["hits"], json!(1));
    assert_eq!(json["misses"], json!(1));
    assert_eq!(json["total_entries"], json!(1));
    assert!((json["hit_rate"].as_f64().unwrap() - 0.5).abs() < 0.001);
}

// == Realtime Tests ==

#[tokio::test]
async fn test_change_from_other_session_refreshes_reads() {
    let (state, backend) = create_test_state();
    let bridge = RealtimeBridge::start(backend.clone(), state.client.clone(), BridgeConfig::default())
        .await
        .unwrap();
    let app = create_router(state.with_realtime(bridge.monitor()));

    let response = app.clone().oneshot(get("/api/tables/tasks")).await.unwrap();
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["data"], json!([]));

    // Another session writes straight to the backend.
    assert_ok!(backend.insert("tasks", row(json!({"title": "Count till"}))).await);

    let mut refreshed = Value::Null;
    for _ in 0..100 {
        let response = app.clone().oneshot(get("/api/tables/tasks")).await.unwrap();
        refreshed = body_to_json(response.into_body()).await;
        if refreshed["data"].as_array().is_some_and(|rows| !rows.is_empty()) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(refreshed["data"][0]["title"], json!("Count till"));

    let response = app.oneshot(get("/api/realtime/status")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let status = body_to_json(response.into_body()).await;
    assert_eq!(status["connection"], json!("connected"));
    assert!(status["events_received"].as_u64().unwrap() >= 1);

    bridge.shutdown().await;
}

#[tokio::test]
async fn test_realtime_status_unavailable_without_bridge() {
    let app = create_test_app();

    let response = app.oneshot(get("/api/realtime/status")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

// == Notification Tests ==

#[tokio::test]
async fn test_notification_accepted() {
    let app = create_test_app();

    let response = app
        .oneshot(post_json(
            "/api/notifications",
            json!({"kind": "new_request", "payload": {"request_id": 12}}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
}

#[tokio::test]
async fn test_notification_unknown_kind_rejected() {
    let app = create_test_app();

    let response = app
        .oneshot(post_json("/api/notifications", json!({"kind": "digest"})))
        .await
        .unwrap();

    assert!(response.status().is_client_error());
}

// == Route Guard Tests ==

#[tokio::test]
async fn test_admin_on_staff_page_redirects_to_admin_home() {
    let app = create_test_app();
    let cookie = Session::new(Role::Admin, "Ana", Some("1".into())).to_cookie_value();

    let response = app
        .oneshot(get_with_session("/staff/dashboard", &cookie))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&response), "/admin/dashboard");
}

#[tokio::test]
async fn test_staff_on_admin_page_redirects_to_staff_home() {
    let app = create_test_app();
    let cookie = Session::new(Role::Staff, "Ida", Some("9".into())).to_cookie_value();

    let response = app
        .oneshot(get_with_session("/admin/cash-book", &cookie))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&response), "/staff/dashboard");
}

#[tokio::test]
async fn test_no_session_redirects_to_login() {
    let app = create_test_app();

    let response = app.oneshot(get("/admin/reports")).await.unwrap();

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&response), "/login");
}

#[tokio::test]
async fn test_malformed_cookie_redirects_to_login() {
    let app = create_test_app();

    let response = app
        .oneshot(get_with_session("/admin/reports", "%7Bnot-json"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&response), "/login");
}

#[tokio::test]
async fn test_login_redirect_target_is_served() {
    let app = create_test_app();

    let response = app.clone().oneshot(get("/admin/reports")).await.unwrap();
    let target = location(&response).to_string();

    let response = app.oneshot(get(&target)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["path"], json!("/login"));
}

#[tokio::test]
async fn test_signed_in_login_redirects_home() {
    let app = create_test_app();
    let cookie = Session::new(Role::Admin, "Ana", Some("1".into())).to_cookie_value();

    let response = app
        .oneshot(get_with_session("/login", &cookie))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&response), "/admin/dashboard");
}

#[tokio::test]
async fn test_own_page_echoes_session() {
    let app = create_test_app();
    let cookie = Session::new(Role::Staff, "Ida", Some("9".into())).to_cookie_value();

    let response = app
        .oneshot(get_with_session("/staff/tasks", &cookie))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["name"], json!("Ida"));
    assert_eq!(json["role"], json!("staff"));
    assert_eq!(json["path"], json!("/staff/tasks"));
}

// == HEALTH Endpoint Tests ==

#[tokio::test]
async fn test_health_endpoint() {
    let app = create_test_app();

    let response = app.oneshot(get("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["status"], json!("healthy"));
    assert!(json["timestamp"].is_string());
}
