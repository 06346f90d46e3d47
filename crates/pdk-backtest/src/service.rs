//! Orchestration around the pure replay loop: parameter validation, bar
//! fetching, persistence.
//!
//! The HTTP layer inserts the `running` row, spawns
//! [`run_to_completion`] on a worker task, and returns the id immediately;
//! clients poll the record for completion.

use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{NaiveDate, TimeZone, Utc};
use pdk_ledger::{backtests, Cents};
use pdk_market::{Bar, Interval, MarketDataService, Range};
use pdk_rules::RuleDef;
use sqlx::PgPool;
use tracing::{error, info};

use crate::engine;
use crate::types::BacktestReport;

/// A validated backtest request.
#[derive(Clone, Debug)]
pub struct BacktestParams {
    pub algorithm_id: i64,
    pub symbol: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub initial_capital: Cents,
    pub interval: Interval,
}

/// Request problems the caller must fix (HTTP 400 territory).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ValidationError {
    StartNotBeforeEnd { start: NaiveDate, end: NaiveDate },
    EndInFuture { end: NaiveDate },
    NonPositiveCapital,
    EmptySymbol,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StartNotBeforeEnd { start, end } => {
                write!(f, "start_date {start} must be before end_date {end}")
            }
            Self::EndInFuture { end } => write!(f, "end_date {end} must not be in the future"),
            Self::NonPositiveCapital => write!(f, "initial_capital must be positive"),
            Self::EmptySymbol => write!(f, "symbol must not be empty"),
        }
    }
}

impl std::error::Error for ValidationError {}

pub fn validate_params(params: &BacktestParams) -> Result<(), ValidationError> {
    if params.symbol.trim().is_empty() {
        return Err(ValidationError::EmptySymbol);
    }
    if params.start_date >= params.end_date {
        return Err(ValidationError::StartNotBeforeEnd {
            start: params.start_date,
            end: params.end_date,
        });
    }
    let today = Utc::now().date_naive();
    if params.end_date > today {
        return Err(ValidationError::EndInFuture {
            end: params.end_date,
        });
    }
    if params.initial_capital <= Cents::ZERO {
        return Err(ValidationError::NonPositiveCapital);
    }
    Ok(())
}

/// The smallest standard history bucket covering the requested span.
pub fn range_for(params: &BacktestParams) -> Range {
    let days = (params.end_date - params.start_date).num_days().max(1);
    Range::smallest_covering(days)
}

/// Keep bars whose UTC calendar date falls within [start, end], inclusive.
pub fn filter_bars(bars: &[Bar], start: NaiveDate, end: NaiveDate) -> Vec<Bar> {
    bars.iter()
        .filter(|b| {
            Utc.timestamp_opt(b.timestamp, 0)
                .single()
                .map(|dt| {
                    let d = dt.date_naive();
                    d >= start && d <= end
                })
                .unwrap_or(false)
        })
        .copied()
        .collect()
}

/// Execute a submitted backtest and persist its outcome exactly once.
///
/// Every failure path marks the row `failed` rather than leaving it
/// `running` forever; this function is the worker-task body and never
/// propagates an error to the spawner.
pub async fn run_to_completion(
    pool: PgPool,
    market: Arc<MarketDataService>,
    rules: Vec<RuleDef>,
    params: BacktestParams,
    backtest_id: i64,
) {
    match execute(&market, &rules, &params).await {
        Ok(report) => {
            let results = to_results(&report);
            match results {
                Ok(results) => {
                    if let Err(e) = backtests::complete(&pool, backtest_id, &results).await {
                        error!(backtest_id, error = %format!("{e:#}"), "backtest persist failed");
                    } else {
                        info!(
                            backtest_id,
                            trades = report.metrics.total_trades,
                            "backtest completed"
                        );
                    }
                }
                Err(e) => {
                    let _ = backtests::fail(&pool, backtest_id, &format!("{e:#}")).await;
                }
            }
        }
        Err(e) => {
            error!(backtest_id, error = %format!("{e:#}"), "backtest run failed");
            let _ = backtests::fail(&pool, backtest_id, &format!("{e:#}")).await;
        }
    }
}

async fn execute(
    market: &MarketDataService,
    rules: &[RuleDef],
    params: &BacktestParams,
) -> Result<BacktestReport> {
    let range = range_for(params);
    let bars = market
        .get_historical(&params.symbol, range, params.interval)
        .await
        .with_context(|| format!("historical fetch failed for {}", params.symbol))?;

    let bars = filter_bars(&bars, params.start_date, params.end_date);
    if bars.is_empty() {
        anyhow::bail!(
            "no historical bars for {} between {} and {}",
            params.symbol,
            params.start_date,
            params.end_date
        );
    }

    Ok(engine::run(rules, &bars, params.initial_capital))
}

fn to_results(report: &BacktestReport) -> Result<backtests::BacktestResults> {
    let m = &report.metrics;
    Ok(backtests::BacktestResults {
        final_capital: Cents::from_dollars_f64(m.final_capital)
            .context("final capital out of range")?,
        total_return: Cents::from_dollars_f64(m.total_return)
            .context("total return out of range")?,
        total_return_percent: m.total_return_percent,
        total_trades: m.total_trades,
        winning_trades: m.winning_trades,
        losing_trades: m.losing_trades,
        win_rate: m.win_rate,
        max_drawdown: m.max_drawdown,
        sharpe_ratio: m.sharpe_ratio,
        results_json: serde_json::to_value(report).context("results serialization failed")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(start: &str, end: &str) -> BacktestParams {
        BacktestParams {
            algorithm_id: 1,
            symbol: "AAPL".to_string(),
            start_date: start.parse().unwrap(),
            end_date: end.parse().unwrap(),
            initial_capital: Cents::new(100_000_00),
            interval: Interval::D1,
        }
    }

    #[test]
    fn validates_date_ordering() {
        let p = params("2024-03-01", "2024-01-01");
        assert!(matches!(
            validate_params(&p),
            Err(ValidationError::StartNotBeforeEnd { .. })
        ));
    }

    #[test]
    fn rejects_future_end_date() {
        let mut p = params("2024-01-01", "2024-03-01");
        p.end_date = Utc::now().date_naive() + chrono::Duration::days(7);
        assert!(matches!(
            validate_params(&p),
            Err(ValidationError::EndInFuture { .. })
        ));
    }

    #[test]
    fn rejects_non_positive_capital() {
        let mut p = params("2024-01-01", "2024-03-01");
        p.initial_capital = Cents::ZERO;
        assert_eq!(validate_params(&p), Err(ValidationError::NonPositiveCapital));
    }

    #[test]
    fn accepts_sane_params() {
        assert_eq!(validate_params(&params("2024-01-01", "2024-03-01")), Ok(()));
    }

    #[test]
    fn range_covers_span() {
        assert_eq!(range_for(&params("2024-01-01", "2024-01-03")), Range::D5);
        assert_eq!(range_for(&params("2024-01-01", "2024-02-15")), Range::Mo3);
        assert_eq!(range_for(&params("2023-01-01", "2024-01-01")), Range::Y1);
    }

    #[test]
    fn filter_keeps_inclusive_window() {
        let day = 86_400;
        // 2024-01-01T00:00:00Z = 1704067200
        let base = 1_704_067_200;
        let bars: Vec<Bar> = (0..10)
            .map(|i| Bar {
                timestamp: base + i * day,
                open: 1.0,
                high: 1.0,
                low: 1.0,
                close: 1.0,
                volume: 0,
            })
            .collect();

        let kept = filter_bars(
            &bars,
            "2024-01-03".parse().unwrap(),
            "2024-01-05".parse().unwrap(),
        );
        assert_eq!(kept.len(), 3);
        assert_eq!(kept[0].timestamp, base + 2 * day);
        assert_eq!(kept[2].timestamp, base + 4 * day);
    }
}
