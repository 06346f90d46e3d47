//! The market data service consumed by the engines and the HTTP layer.
//!
//! Wraps the chart client with per-operation TTL caches and the
//! development-mode synthetic fallback. Quote fan-out is concurrent; partial
//! failures drop the symbol from the result map rather than failing the
//! batch.

use std::collections::BTreeMap;
use std::time::Duration;

use futures_util::future::join_all;
use pdk_config::RunMode;
use tracing::warn;

use crate::cache::TtlCache;
use crate::chart::ChartClient;
use crate::error::MarketError;
use crate::synthetic;
use crate::types::{Bar, Interval, Quote, Range};

const QUOTE_TTL: Duration = Duration::from_secs(60);
const HISTORY_TTL: Duration = Duration::from_secs(3600);

pub struct MarketDataService {
    client: ChartClient,
    mode: RunMode,
    quotes: TtlCache<Quote>,
    history: TtlCache<Vec<Bar>>,
}

impl MarketDataService {
    pub fn new(upstream_base_url: impl Into<String>, mode: RunMode) -> Self {
        Self {
            client: ChartClient::new(upstream_base_url),
            mode,
            quotes: TtlCache::new(QUOTE_TTL),
            history: TtlCache::new(HISTORY_TTL),
        }
    }

    /// Latest quote for one symbol, cached for 60 s.
    pub async fn get_quote(&self, symbol: &str) -> Result<Quote, MarketError> {
        let symbol = normalize(symbol);
        let key = format!("quote:{symbol}");
        if let Some(hit) = self.quotes.get(&key).await {
            return Ok(hit);
        }

        match self.client.get_quote(&symbol).await {
            Ok(q) => {
                self.quotes.insert(key, q.clone()).await;
                Ok(q)
            }
            Err(e) if self.mode.is_development() => {
                warn!(symbol = %symbol, error = %e, "upstream quote failed; using synthetic data");
                let q = synthetic::synthetic_quote(&symbol, chrono::Utc::now().timestamp());
                self.quotes.insert(key, q.clone()).await;
                Ok(q)
            }
            Err(e) => Err(e),
        }
    }

    /// Historical bars, ascending, cached for one hour.
    pub async fn get_historical(
        &self,
        symbol: &str,
        range: Range,
        interval: Interval,
    ) -> Result<Vec<Bar>, MarketError> {
        let symbol = normalize(symbol);
        let key = format!("hist:{}:{}:{}", symbol, range.as_str(), interval.as_str());
        if let Some(hit) = self.history.get(&key).await {
            return Ok(hit);
        }

        match self.client.get_historical(&symbol, range, interval).await {
            Ok(bars) => {
                self.history.insert(key, bars.clone()).await;
                Ok(bars)
            }
            Err(e) if self.mode.is_development() => {
                warn!(symbol = %symbol, error = %e, "upstream history failed; using synthetic data");
                let bars = synthetic::synthetic_bars(
                    &symbol,
                    range,
                    interval,
                    chrono::Utc::now().timestamp(),
                );
                self.history.insert(key, bars.clone()).await;
                Ok(bars)
            }
            Err(e) => Err(e),
        }
    }

    /// Concurrent quote fan-out. Symbols whose fetch fails are omitted.
    pub async fn get_multiple_quotes(&self, symbols: &[String]) -> BTreeMap<String, Quote> {
        let futures = symbols.iter().map(|s| async move {
            let sym = normalize(s);
            (sym.clone(), self.get_quote(&sym).await)
        });

        let mut out = BTreeMap::new();
        for (symbol, result) in join_all(futures).await {
            match result {
                Ok(q) => {
                    out.insert(symbol, q);
                }
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "quote fetch failed; omitting symbol");
                }
            }
        }
        out
    }
}

fn normalize(symbol: &str) -> String {
    symbol.trim().to_ascii_uppercase()
}
