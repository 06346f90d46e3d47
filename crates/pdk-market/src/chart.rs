//! Upstream chart API client.
//!
//! Wire contract: `GET {base}/chart/{symbol}?interval=&range=` returning
//!
//! ```text
//! { chart: { result: [ { meta: { symbol, regularMarketPrice,
//!     chartPreviousClose, regularMarketTime },
//!     timestamp: [unix...],
//!     indicators: { quote: [ { open: [...], high: [...], low: [...],
//!                              close: [...], volume: [...] } ] } } ] } }
//! ```
//!
//! Bars whose close is null are dropped; output is ascending by timestamp.

use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::error::MarketError;
use crate::types::{Bar, Interval, Quote, Range};

const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Response shape
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChartResult {
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: ChartIndicators,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    symbol: String,
    regular_market_price: Option<f64>,
    chart_previous_close: Option<f64>,
    regular_market_time: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<ChartQuoteArrays>,
}

#[derive(Debug, Default, Deserialize)]
struct ChartQuoteArrays {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<i64>>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Thin HTTP client for the chart endpoint.
#[derive(Clone, Debug)]
pub struct ChartClient {
    http: reqwest::Client,
    base_url: String,
}

impl ChartClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(UPSTREAM_TIMEOUT)
            .build()
            .expect("reqwest client construction must not fail");
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    fn chart_url(&self, symbol: &str) -> String {
        format!("{}/chart/{}", self.base_url.trim_end_matches('/'), symbol)
    }

    pub(crate) async fn fetch(
        &self,
        symbol: &str,
        range: Range,
        interval: Interval,
    ) -> Result<ChartResult, MarketError> {
        let url = self.chart_url(symbol);
        debug!(symbol, range = range.as_str(), interval = interval.as_str(), "chart fetch");

        let resp = self
            .http
            .get(&url)
            .query(&[("interval", interval.as_str()), ("range", range.as_str())])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(MarketError::Upstream {
                status: status.as_u16(),
                message: truncate(&message, 200),
            });
        }

        let body: ChartEnvelope = resp
            .json()
            .await
            .map_err(|e| MarketError::Decode(e.to_string()))?;

        if let Some(err) = body.chart.error {
            if !err.is_null() {
                return Err(MarketError::Upstream {
                    status: status.as_u16(),
                    message: err.to_string(),
                });
            }
        }

        body.chart
            .result
            .and_then(|mut r| if r.is_empty() { None } else { Some(r.remove(0)) })
            .ok_or_else(|| MarketError::NoData {
                symbol: symbol.to_string(),
            })
    }

    /// Fetch the latest quote for a symbol.
    ///
    /// The open/high/low/volume fields summarize the day's quote arrays
    /// (first open, max high, min low, summed volume).
    pub async fn get_quote(&self, symbol: &str) -> Result<Quote, MarketError> {
        let result = self.fetch(symbol, Range::D1, Interval::M5).await?;
        quote_from_result(symbol, &result)
    }

    /// Fetch historical bars, ascending by timestamp, null-close bars dropped.
    pub async fn get_historical(
        &self,
        symbol: &str,
        range: Range,
        interval: Interval,
    ) -> Result<Vec<Bar>, MarketError> {
        let result = self.fetch(symbol, range, interval).await?;
        let bars = bars_from_result(&result);
        if bars.is_empty() {
            return Err(MarketError::NoData {
                symbol: symbol.to_string(),
            });
        }
        Ok(bars)
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() > max {
        format!("{}...", &s[..max])
    } else {
        s.to_string()
    }
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

fn quote_from_result(symbol: &str, result: &ChartResult) -> Result<Quote, MarketError> {
    let price = result
        .meta
        .regular_market_price
        .ok_or_else(|| MarketError::NoData {
            symbol: symbol.to_string(),
        })?;
    let previous_close = result.meta.chart_previous_close.unwrap_or(price);

    let arrays = result.indicators.quote.first();
    let open = arrays
        .and_then(|a| a.open.iter().flatten().next().copied())
        .unwrap_or(price);
    let high = arrays
        .map(|a| a.high.iter().flatten().fold(f64::MIN, |m, v| m.max(*v)))
        .filter(|v| v.is_finite() && *v != f64::MIN)
        .unwrap_or(price);
    let low = arrays
        .map(|a| a.low.iter().flatten().fold(f64::MAX, |m, v| m.min(*v)))
        .filter(|v| v.is_finite() && *v != f64::MAX)
        .unwrap_or(price);
    let volume = arrays
        .map(|a| a.volume.iter().flatten().sum())
        .unwrap_or(0);

    let timestamp = result
        .meta
        .regular_market_time
        .or_else(|| result.timestamp.last().copied())
        .unwrap_or(0);

    Ok(Quote {
        symbol: result.meta.symbol.clone(),
        price,
        previous_close,
        open,
        high,
        low,
        volume,
        timestamp,
        change: 0.0,
        change_percent: 0.0,
    }
    .with_change())
}

fn bars_from_result(result: &ChartResult) -> Vec<Bar> {
    let Some(arrays) = result.indicators.quote.first() else {
        return Vec::new();
    };

    let mut bars: Vec<Bar> = Vec::with_capacity(result.timestamp.len());
    for (i, ts) in result.timestamp.iter().enumerate() {
        // Null closes mark halted/partial samples; drop them.
        let Some(close) = arrays.close.get(i).copied().flatten() else {
            continue;
        };
        bars.push(Bar {
            timestamp: *ts,
            open: arrays.open.get(i).copied().flatten().unwrap_or(close),
            high: arrays.high.get(i).copied().flatten().unwrap_or(close),
            low: arrays.low.get(i).copied().flatten().unwrap_or(close),
            close,
            volume: arrays.volume.get(i).copied().flatten().unwrap_or(0),
        });
    }

    bars.sort_by_key(|b| b.timestamp);
    bars
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_result(json: serde_json::Value) -> ChartResult {
        serde_json::from_value(json).expect("valid chart result")
    }

    #[test]
    fn bars_drop_null_closes_and_sort_ascending() {
        let result = sample_result(serde_json::json!({
            "meta": {"symbol": "AAPL", "regularMarketPrice": 150.0,
                     "chartPreviousClose": 148.0, "regularMarketTime": 1_700_000_300},
            "timestamp": [1_700_000_200, 1_700_000_000, 1_700_000_100],
            "indicators": {"quote": [{
                "open":   [149.0, 147.0, null],
                "high":   [151.0, 148.5, null],
                "low":    [148.0, 146.0, null],
                "close":  [150.0, 147.5, null],
                "volume": [1000, 2000, null]
            }]}
        }));

        let bars = bars_from_result(&result);
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].timestamp, 1_700_000_000);
        assert_eq!(bars[1].timestamp, 1_700_000_200);
        assert!((bars[0].close - 147.5).abs() < 1e-9);
    }

    #[test]
    fn quote_summarizes_day_arrays() {
        let result = sample_result(serde_json::json!({
            "meta": {"symbol": "AAPL", "regularMarketPrice": 150.0,
                     "chartPreviousClose": 148.0, "regularMarketTime": 1_700_000_300},
            "timestamp": [1_700_000_000, 1_700_000_100],
            "indicators": {"quote": [{
                "open":   [149.0, 150.0],
                "high":   [151.0, 150.5],
                "low":    [148.0, 149.5],
                "close":  [150.0, 150.2],
                "volume": [1000, 2000]
            }]}
        }));

        let q = quote_from_result("AAPL", &result).unwrap();
        assert_eq!(q.symbol, "AAPL");
        assert!((q.open - 149.0).abs() < 1e-9);
        assert!((q.high - 151.0).abs() < 1e-9);
        assert!((q.low - 148.0).abs() < 1e-9);
        assert_eq!(q.volume, 3000);
        assert!((q.change - 2.0).abs() < 1e-9);
    }

    #[test]
    fn quote_without_market_price_is_no_data() {
        let result = sample_result(serde_json::json!({
            "meta": {"symbol": "ZZZZ"},
            "timestamp": [],
            "indicators": {"quote": []}
        }));
        assert!(matches!(
            quote_from_result("ZZZZ", &result),
            Err(MarketError::NoData { .. })
        ));
    }
}
