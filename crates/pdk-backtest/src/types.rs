use serde::{Deserialize, Serialize};

/// One executed simulated trade.
///
/// Sells carry the realized P/L of the position they closed; buys carry
/// `pl: None`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// "buy" | "sell"
    pub action: String,
    /// Epoch seconds of the bar that produced the trade.
    pub timestamp: i64,
    /// Fill price in dollars.
    pub price: f64,
    pub quantity: i64,
    /// `price * quantity` in dollars.
    pub value: f64,
    /// Which rule fired (or "End of backtest period" for the forced close).
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pl: Option<f64>,
}

/// One step of the equity curve, appended before the bar's rules run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: i64,
    pub balance: f64,
    pub position_value: f64,
    pub total_value: f64,
}

/// Aggregate performance metrics over a completed run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub initial_capital: f64,
    pub final_capital: f64,
    pub total_return: f64,
    pub total_return_percent: f64,
    /// Number of closed (sell-side) trades.
    pub total_trades: i32,
    pub winning_trades: i32,
    pub losing_trades: i32,
    pub win_rate: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub profit_factor: f64,
    pub max_drawdown: f64,
    pub sharpe_ratio: f64,
}

/// Full result of a run; serialized as the opaque results blob.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BacktestReport {
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
    pub metrics: Metrics,
}
