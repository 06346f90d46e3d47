//! Performance metrics over a completed replay.

use pdk_ledger::Cents;

use crate::types::{EquityPoint, Metrics, Trade};

/// Daily risk-free rate: 2% annual over 252 trading days.
const RISK_FREE_DAILY: f64 = 0.02 / 252.0;
const ANNUALIZATION: f64 = 252.0;

pub fn compute_metrics(
    initial_capital: Cents,
    final_capital: Cents,
    trades: &[Trade],
    equity_curve: &[EquityPoint],
) -> Metrics {
    let total_return = final_capital - initial_capital;
    let total_return_percent = if initial_capital.raw() != 0 {
        total_return.raw() as f64 / initial_capital.raw() as f64 * 100.0
    } else {
        0.0
    };

    // Entries and exits pair up; the trade count counts exits.
    let sells: Vec<&Trade> = trades.iter().filter(|t| t.action == "sell").collect();
    let total_trades = sells.len() as i32;
    let wins: Vec<f64> = sells.iter().filter_map(|t| t.pl).filter(|p| *p > 0.0).collect();
    let losses: Vec<f64> = sells.iter().filter_map(|t| t.pl).filter(|p| *p < 0.0).collect();
    let winning_trades = wins.len() as i32;
    let losing_trades = losses.len() as i32;

    let win_rate = if total_trades > 0 {
        winning_trades as f64 / total_trades as f64 * 100.0
    } else {
        0.0
    };

    let avg_win = mean(&wins).unwrap_or(0.0);
    let avg_loss = mean(&losses).map(f64::abs).unwrap_or(0.0);
    let profit_factor = if avg_loss != 0.0 { avg_win / avg_loss } else { 0.0 };

    Metrics {
        initial_capital: initial_capital.to_f64(),
        final_capital: final_capital.to_f64(),
        total_return: total_return.to_f64(),
        total_return_percent,
        total_trades,
        winning_trades,
        losing_trades,
        win_rate,
        avg_win,
        avg_loss,
        profit_factor,
        max_drawdown: max_drawdown(equity_curve),
        sharpe_ratio: sharpe_ratio(equity_curve),
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Largest percentage decline from a running peak of total value.
pub fn max_drawdown(equity_curve: &[EquityPoint]) -> f64 {
    let mut peak = f64::MIN;
    let mut worst = 0.0_f64;
    for point in equity_curve {
        peak = peak.max(point.total_value);
        if peak > 0.0 {
            worst = worst.max((peak - point.total_value) / peak);
        }
    }
    worst * 100.0
}

/// Annualized Sharpe ratio over per-step simple returns of total value.
/// Zero when fewer than two points or zero variance.
pub fn sharpe_ratio(equity_curve: &[EquityPoint]) -> f64 {
    let returns: Vec<f64> = equity_curve
        .windows(2)
        .filter(|w| w[0].total_value != 0.0)
        .map(|w| (w[1].total_value - w[0].total_value) / w[0].total_value)
        .collect();

    if returns.len() < 2 {
        return 0.0;
    }

    let n = returns.len() as f64;
    let mean_return = returns.iter().sum::<f64>() / n;
    let variance = returns
        .iter()
        .map(|r| (r - mean_return).powi(2))
        .sum::<f64>()
        / n;
    let stdev = variance.sqrt();
    if stdev == 0.0 {
        return 0.0;
    }

    (mean_return - RISK_FREE_DAILY) / stdev * ANNUALIZATION.sqrt()
}
