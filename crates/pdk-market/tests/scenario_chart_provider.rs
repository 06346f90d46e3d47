//! Scenario tests for the chart provider against a mocked upstream.
//!
//! No real network: `httpmock` serves the chart payload shape locally.

use httpmock::prelude::*;
use pdk_config::RunMode;
use pdk_market::{Interval, MarketDataService, MarketError, Range};

fn chart_body(symbol: &str, price: f64) -> serde_json::Value {
    serde_json::json!({
        "chart": {
            "result": [{
                "meta": {
                    "symbol": symbol,
                    "regularMarketPrice": price,
                    "chartPreviousClose": price - 2.0,
                    "regularMarketTime": 1_700_000_000
                },
                "timestamp": [1_699_999_800, 1_699_999_900, 1_700_000_000],
                "indicators": {"quote": [{
                    "open":   [price - 1.0, price - 0.5, price - 0.2],
                    "high":   [price + 0.5, price + 0.7, price + 0.3],
                    "low":    [price - 1.5, price - 1.0, price - 0.6],
                    "close":  [price - 0.8, price - 0.3, price],
                    "volume": [1000, 2000, 1500]
                }]}
            }],
            "error": null
        }
    })
}

#[tokio::test]
async fn quote_fetch_decodes_upstream_shape() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/chart/AAPL")
                .query_param("range", "1d");
            then.status(200).json_body(chart_body("AAPL", 150.0));
        })
        .await;

    let svc = MarketDataService::new(server.base_url(), RunMode::Production);
    let q = svc.get_quote("aapl").await.expect("quote should decode");

    mock.assert_async().await;
    assert_eq!(q.symbol, "AAPL");
    assert!((q.price - 150.0).abs() < 1e-9);
    assert!((q.change - 2.0).abs() < 1e-9);
    assert_eq!(q.volume, 4500);
}

#[tokio::test]
async fn second_quote_read_is_served_from_cache() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/chart/MSFT");
            then.status(200).json_body(chart_body("MSFT", 300.0));
        })
        .await;

    let svc = MarketDataService::new(server.base_url(), RunMode::Production);
    let a = svc.get_quote("MSFT").await.unwrap();
    let b = svc.get_quote("MSFT").await.unwrap();

    assert_eq!(a, b);
    // 60 s TTL: the upstream must have been hit exactly once.
    mock.assert_hits_async(1).await;
}

#[tokio::test]
async fn historical_bars_ascending() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/chart/AAPL")
                .query_param("range", "3mo")
                .query_param("interval", "1d");
            then.status(200).json_body(chart_body("AAPL", 150.0));
        })
        .await;

    let svc = MarketDataService::new(server.base_url(), RunMode::Production);
    let bars = svc
        .get_historical("AAPL", Range::Mo3, Interval::D1)
        .await
        .unwrap();

    assert_eq!(bars.len(), 3);
    assert!(bars.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
}

#[tokio::test]
async fn production_mode_surfaces_upstream_failure() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/chart/AAPL");
            then.status(502).body("bad gateway");
        })
        .await;

    let svc = MarketDataService::new(server.base_url(), RunMode::Production);
    let err = svc.get_quote("AAPL").await.unwrap_err();
    assert!(matches!(err, MarketError::Upstream { status: 502, .. }));
}

#[tokio::test]
async fn development_mode_degrades_to_synthetic() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/chart/AAPL");
            then.status(500).body("boom");
        })
        .await;

    let svc = MarketDataService::new(server.base_url(), RunMode::Development);
    let q = svc.get_quote("AAPL").await.expect("dev mode must degrade");
    assert_eq!(q.symbol, "AAPL");
    assert!(q.price > 0.0);
}

#[tokio::test]
async fn multi_quote_fan_out_omits_failures() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/chart/AAPL");
            then.status(200).json_body(chart_body("AAPL", 150.0));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/chart/BROKEN");
            then.status(500).body("boom");
        })
        .await;

    let svc = MarketDataService::new(server.base_url(), RunMode::Production);
    let quotes = svc
        .get_multiple_quotes(&["AAPL".to_string(), "BROKEN".to_string()])
        .await;

    assert_eq!(quotes.len(), 1);
    assert!(quotes.contains_key("AAPL"));
    assert!(!quotes.contains_key("BROKEN"));
}
