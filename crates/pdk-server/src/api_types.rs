//! Request and response types for all pdk-server HTTP endpoints.
//!
//! These types are `Serialize`/`Deserialize` so they can be JSON-encoded by
//! Axum and decoded by tests. Money crosses the boundary as two-decimal
//! dollar values; no business logic lives here.

use chrono::{DateTime, Utc};
use pdk_ledger::{Account, Algorithm, BacktestRow, Order, Position, Rule, Transaction};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// /health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// Paper trading
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountResponse {
    pub id: i64,
    pub balance: f64,
    pub initial_balance: f64,
    pub total_value: f64,
    pub created_at: DateTime<Utc>,
}

impl From<&Account> for AccountResponse {
    fn from(a: &Account) -> Self {
        Self {
            id: a.id,
            balance: a.balance.to_f64(),
            initial_balance: a.initial_balance.to_f64(),
            total_value: a.total_value.to_f64(),
            created_at: a.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionResponse {
    pub symbol: String,
    pub quantity: i64,
    pub average_price: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unrealized_pl: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unrealized_pl_percent: Option<f64>,
}

impl From<&Position> for PositionResponse {
    fn from(p: &Position) -> Self {
        Self {
            symbol: p.symbol.clone(),
            quantity: p.quantity,
            average_price: p.avg_price.to_f64(),
            current_price: p.current_price.map(|c| c.to_f64()),
            market_value: p.market_value.map(|c| c.to_f64()),
            unrealized_pl: p.unrealized_pl.map(|c| c.to_f64()),
            unrealized_pl_percent: p.unrealized_pl_percent,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResponse {
    pub id: i64,
    pub symbol: String,
    pub side: String,
    #[serde(rename = "type")]
    pub order_type: String,
    pub quantity: i64,
    pub price: f64,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub algorithm_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filled_at: Option<DateTime<Utc>>,
}

impl From<&Order> for OrderResponse {
    fn from(o: &Order) -> Self {
        Self {
            id: o.id,
            symbol: o.symbol.clone(),
            side: o.side.as_str().to_string(),
            order_type: o.order_type.as_str().to_string(),
            quantity: o.quantity,
            price: o.price.to_f64(),
            status: o.status.as_str().to_string(),
            algorithm_id: o.algorithm_id,
            created_at: o.created_at,
            filled_at: o.filled_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionResponse {
    pub id: i64,
    #[serde(rename = "type")]
    pub tx_type: String,
    pub amount: f64,
    pub balance_after: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&Transaction> for TransactionResponse {
    fn from(t: &Transaction) -> Self {
        Self {
            id: t.id,
            tx_type: t.tx_type.as_str().to_string(),
            amount: t.amount.to_f64(),
            balance_after: t.balance_after.to_f64(),
            symbol: t.symbol.clone(),
            quantity: t.quantity,
            price: t.price.map(|c| c.to_f64()),
            order_id: t.order_id,
            description: t.description.clone(),
            created_at: t.created_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaceOrderRequest {
    pub symbol: String,
    pub side: String,
    pub quantity: i64,
    #[serde(rename = "type", default)]
    pub order_type: Option<String>,
}

/// 201 body for a manual fill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderFilledResponse {
    pub order: OrderSummary,
    pub balance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderSummary {
    pub id: i64,
    pub symbol: String,
    pub side: String,
    pub quantity: i64,
    pub price: f64,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioResponse {
    pub account: AccountResponse,
    pub positions: Vec<PositionResponse>,
    pub recent_orders: Vec<OrderResponse>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StartAlgorithmRequest {
    #[serde(default)]
    pub symbols: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartedResponse {
    pub algorithm_id: i64,
    pub symbols: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_check: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoppedResponse {
    pub algorithm_id: i64,
    pub stopped: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunningResponse {
    pub running: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetResponse {
    pub account: AccountResponse,
}

// ---------------------------------------------------------------------------
// Algorithms & rules
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct CreateAlgorithmRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlgorithmResponse {
    pub id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&Algorithm> for AlgorithmResponse {
    fn from(a: &Algorithm) -> Self {
        Self {
            id: a.id,
            name: a.name.clone(),
            description: a.description.clone(),
            is_active: a.is_active,
            created_at: a.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlgorithmWithRulesResponse {
    #[serde(flatten)]
    pub algorithm: AlgorithmResponse,
    pub rules: Vec<RuleResponse>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuleRequest {
    pub rule_type: String,
    pub condition_field: String,
    pub condition_operator: String,
    pub condition_value: String,
    pub action: String,
    #[serde(default)]
    pub order_index: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleResponse {
    pub id: i64,
    pub rule_type: String,
    pub condition_field: String,
    pub condition_operator: String,
    pub condition_value: String,
    pub action: String,
    pub order_index: i32,
}

impl From<&Rule> for RuleResponse {
    fn from(r: &Rule) -> Self {
        Self {
            id: r.id,
            rule_type: r.rule_type.as_str().to_string(),
            condition_field: r.condition_field.clone(),
            condition_operator: r.condition_operator.as_str().to_string(),
            condition_value: r.condition_value.clone(),
            action: r.action.clone(),
            order_index: r.order_index,
        }
    }
}

// ---------------------------------------------------------------------------
// Stocks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct QuotesRequest {
    pub symbols: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryQuery {
    pub range: Option<String>,
    pub interval: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryResponse {
    pub symbol: String,
    pub bars: Vec<pdk_market::Bar>,
}

// ---------------------------------------------------------------------------
// Backtest
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunBacktestRequest {
    pub algorithm_id: i64,
    pub symbol: String,
    /// `YYYY-MM-DD`.
    pub start_date: String,
    pub end_date: String,
    #[serde(default)]
    pub initial_capital: Option<f64>,
    #[serde(default)]
    pub interval: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestSubmittedResponse {
    pub id: i64,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResponse {
    pub id: i64,
    pub algorithm_id: i64,
    pub symbol: String,
    pub start_date: String,
    pub end_date: String,
    pub initial_capital: f64,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_capital: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_return: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_return_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_trades: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winning_trades: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub losing_trades: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub win_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_drawdown: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sharpe_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<Value>,
    pub created_at: DateTime<Utc>,
}

impl From<&BacktestRow> for BacktestResponse {
    fn from(b: &BacktestRow) -> Self {
        Self {
            id: b.id,
            algorithm_id: b.algorithm_id,
            symbol: b.symbol.clone(),
            start_date: b.start_date.to_string(),
            end_date: b.end_date.to_string(),
            initial_capital: b.initial_capital.to_f64(),
            status: b.status.clone(),
            error: b.error.clone(),
            final_capital: b.final_capital.map(|c| c.to_f64()),
            total_return: b.total_return.map(|c| c.to_f64()),
            total_return_percent: b.total_return_percent,
            total_trades: b.total_trades,
            winning_trades: b.winning_trades,
            losing_trades: b.losing_trades,
            win_rate: b.win_rate,
            max_drawdown: b.max_drawdown,
            sharpe_ratio: b.sharpe_ratio,
            results: b.results_json.clone(),
            created_at: b.created_at,
        }
    }
}
