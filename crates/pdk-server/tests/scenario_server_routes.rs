//! In-process scenario tests for pdk-server HTTP endpoints.
//!
//! The router is driven via `tower::ServiceExt::oneshot`, with no TCP socket.
//! The pool is constructed lazily, so every route exercised here must fail
//! or succeed *before* touching the database: auth rejection, request
//! validation, and engine-local reads.

use std::sync::Arc;

use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use pdk_config::{Config, RunMode};
use pdk_server::{auth, routes, state::AppState};
use tower::ServiceExt; // oneshot

const TEST_SECRET: &str = "test-secret";

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn test_config() -> Config {
    Config {
        port: 0,
        jwt_secret: TEST_SECRET.to_string(),
        database_url: "postgres://localhost/unreachable".to_string(),
        upstream_market_url: "http://127.0.0.1:9".to_string(),
        run_mode: RunMode::Production,
        default_symbol: "SPY".to_string(),
        engine_tick_secs: 60,
    }
}

/// Build a fresh in-process router. The pool never connects unless a
/// handler actually queries it.
fn make_router() -> axum::Router {
    let config = test_config();
    let pool = sqlx::postgres::PgPoolOptions::new()
        .connect_lazy(&config.database_url)
        .expect("lazy pool");
    routes::build_router(Arc::new(AppState::new(&config, pool)))
}

fn bearer() -> String {
    format!("Bearer {}", auth::issue_token(TEST_SECRET, 1, 3600))
}

async fn call(router: axum::Router, req: Request<axum::body::Body>) -> (StatusCode, bytes::Bytes) {
    let resp = router.oneshot(req).await.expect("oneshot failed");
    let status = resp.status();
    let body = resp
        .into_body()
        .collect()
        .await
        .expect("body collect failed")
        .to_bytes();
    (status, body)
}

fn parse_json(b: bytes::Bytes) -> serde_json::Value {
    serde_json::from_slice(&b).expect("body is not valid JSON")
}

fn get(uri: &str) -> Request<axum::body::Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap()
}

fn authed_json(method: &str, uri: &str, body: serde_json::Value) -> Request<axum::body::Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", bearer())
        .header("content-type", "application/json")
        .body(axum::body::Body::from(body.to_string()))
        .unwrap()
}

fn authed_get(uri: &str) -> Request<axum::body::Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header("authorization", bearer())
        .body(axum::body::Body::empty())
        .unwrap()
}

// ---------------------------------------------------------------------------
// /health
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_is_public_and_ok() {
    let (status, body) = call(make_router(), get("/health")).await;
    assert_eq!(status, StatusCode::OK);

    let json = parse_json(body);
    assert_eq!(json["ok"], true);
    assert_eq!(json["service"], "pdk-server");
}

// ---------------------------------------------------------------------------
// Authorization
// ---------------------------------------------------------------------------

#[tokio::test]
async fn core_routes_require_bearer_token() {
    for uri in [
        "/algorithms",
        "/paper-trading/account",
        "/paper-trading/positions",
        "/stocks/quote/AAPL",
    ] {
        let (status, body) = call(make_router(), get(uri)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "expected 401 for {uri}");
        assert!(parse_json(body)["error"].is_string());
    }
}

#[tokio::test]
async fn garbage_token_is_rejected() {
    let req = Request::builder()
        .method("GET")
        .uri("/algorithms")
        .header("authorization", "Bearer not.a.jwt")
        .body(axum::body::Body::empty())
        .unwrap();
    let (status, _) = call(make_router(), req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn token_signed_with_wrong_secret_is_rejected() {
    let token = auth::issue_token("other-secret", 1, 3600);
    let req = Request::builder()
        .method("GET")
        .uri("/algorithms")
        .header("authorization", format!("Bearer {token}"))
        .body(axum::body::Body::empty())
        .unwrap();
    let (status, _) = call(make_router(), req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// ---------------------------------------------------------------------------
// Request validation (fails before any DB/upstream access)
// ---------------------------------------------------------------------------

#[tokio::test]
async fn order_with_non_positive_quantity_is_400() {
    let req = authed_json(
        "POST",
        "/paper-trading/orders",
        serde_json::json!({"symbol": "AAPL", "side": "buy", "quantity": 0}),
    );
    let (status, body) = call(make_router(), req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(parse_json(body)["error"]
        .as_str()
        .unwrap()
        .contains("quantity"));
}

#[tokio::test]
async fn order_with_unknown_side_is_400() {
    let req = authed_json(
        "POST",
        "/paper-trading/orders",
        serde_json::json!({"symbol": "AAPL", "side": "hold", "quantity": 1}),
    );
    let (status, _) = call(make_router(), req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn history_with_bad_range_is_400() {
    let (status, body) = call(make_router(), authed_get("/stocks/history/AAPL?range=9d")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(parse_json(body)["error"].as_str().unwrap().contains("range"));
}

#[tokio::test]
async fn empty_quote_batch_is_400() {
    let req = authed_json("POST", "/stocks/quotes", serde_json::json!({"symbols": []}));
    let (status, _) = call(make_router(), req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn algorithm_with_blank_name_is_400() {
    let req = authed_json("POST", "/algorithms", serde_json::json!({"name": "   "}));
    let (status, _) = call(make_router(), req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn rule_with_unknown_operator_is_400() {
    let req = authed_json(
        "POST",
        "/algorithms/1/rules",
        serde_json::json!({
            "rule_type": "entry",
            "condition_field": "price",
            "condition_operator": "<>",
            "condition_value": "100",
            "action": "buy:10"
        }),
    );
    let (status, _) = call(make_router(), req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn rule_with_malformed_action_is_400() {
    let req = authed_json(
        "POST",
        "/algorithms/1/rules",
        serde_json::json!({
            "rule_type": "entry",
            "condition_field": "price",
            "condition_operator": ">",
            "condition_value": "100",
            "action": "buy10"
        }),
    );
    let (status, _) = call(make_router(), req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn backtest_with_malformed_date_is_400() {
    let req = authed_json(
        "POST",
        "/backtest/run",
        serde_json::json!({
            "algorithmId": 1,
            "symbol": "AAPL",
            "startDate": "01/02/2024",
            "endDate": "2024-03-01"
        }),
    );
    let (status, body) = call(make_router(), req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(parse_json(body)["error"].as_str().unwrap().contains("startDate"));
}

#[tokio::test]
async fn backtest_with_reversed_dates_is_400() {
    let req = authed_json(
        "POST",
        "/backtest/run",
        serde_json::json!({
            "algorithmId": 1,
            "symbol": "AAPL",
            "startDate": "2024-03-01",
            "endDate": "2024-01-01"
        }),
    );
    let (status, _) = call(make_router(), req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ---------------------------------------------------------------------------
// Engine-local reads
// ---------------------------------------------------------------------------

#[tokio::test]
async fn running_algorithms_starts_empty() {
    let (status, body) = call(make_router(), authed_get("/paper-trading/algorithms/running")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parse_json(body)["running"], serde_json::json!([]));
}
