//! Row types and persisted enums.
//!
//! Enums are stored as lowercase text columns; `as_str`/`parse` pairs keep
//! the mapping in one place. Row structs are mapped manually from `PgRow`
//! so column naming stays explicit.

use anyhow::{anyhow, Result};
use chrono::{DateTime, NaiveDate, Utc};
use pdk_rules::{ConditionOp, RuleDef, RuleType, Side};
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::Row;

use crate::money::Cents;

// ---------------------------------------------------------------------------
// Persisted enums
// ---------------------------------------------------------------------------

/// Requested order type. Only `market` is honored by the paper model;
/// `limit` is accepted on the wire and filled like a market order.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OrderType {
    Market,
    Limit,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Market => "market",
            OrderType::Limit => "limit",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "market" => Ok(OrderType::Market),
            "limit" => Ok(OrderType::Limit),
            other => Err(anyhow!("invalid order type: {}", other)),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OrderStatus {
    Pending,
    Filled,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Filled => "filled",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "filled" => Ok(OrderStatus::Filled),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(anyhow!("invalid order status: {}", other)),
        }
    }
}

/// Journal entry type.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TxType {
    Buy,
    Sell,
    Deposit,
    Withdrawal,
}

impl TxType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxType::Buy => "buy",
            TxType::Sell => "sell",
            TxType::Deposit => "deposit",
            TxType::Withdrawal => "withdrawal",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "buy" => Ok(TxType::Buy),
            "sell" => Ok(TxType::Sell),
            "deposit" => Ok(TxType::Deposit),
            "withdrawal" => Ok(TxType::Withdrawal),
            other => Err(anyhow!("invalid transaction type: {}", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct Account {
    pub id: i64,
    pub user_id: i64,
    pub balance: Cents,
    pub initial_balance: Cents,
    pub total_value: Cents,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn from_row(row: &PgRow) -> Result<Self> {
        Ok(Account {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            balance: Cents::new(row.try_get("balance_cents")?),
            initial_balance: Cents::new(row.try_get("initial_balance_cents")?),
            total_value: Cents::new(row.try_get("total_value_cents")?),
            created_at: row.try_get("created_at")?,
        })
    }
}

#[derive(Clone, Debug)]
pub struct Position {
    pub id: i64,
    pub account_id: i64,
    pub symbol: String,
    pub quantity: i64,
    pub avg_price: Cents,
    pub current_price: Option<Cents>,
    pub market_value: Option<Cents>,
    pub unrealized_pl: Option<Cents>,
    pub unrealized_pl_percent: Option<f64>,
    pub updated_at: DateTime<Utc>,
}

impl Position {
    pub fn from_row(row: &PgRow) -> Result<Self> {
        Ok(Position {
            id: row.try_get("id")?,
            account_id: row.try_get("account_id")?,
            symbol: row.try_get("symbol")?,
            quantity: row.try_get("quantity")?,
            avg_price: Cents::new(row.try_get("avg_price_cents")?),
            current_price: row
                .try_get::<Option<i64>, _>("current_price_cents")?
                .map(Cents::new),
            market_value: row
                .try_get::<Option<i64>, _>("market_value_cents")?
                .map(Cents::new),
            unrealized_pl: row
                .try_get::<Option<i64>, _>("unrealized_pl_cents")?
                .map(Cents::new),
            unrealized_pl_percent: row.try_get("unrealized_pl_pct")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[derive(Clone, Debug)]
pub struct Order {
    pub id: i64,
    pub account_id: i64,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: i64,
    pub price: Cents,
    pub status: OrderStatus,
    pub algorithm_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub filled_at: Option<DateTime<Utc>>,
}

impl Order {
    pub fn from_row(row: &PgRow) -> Result<Self> {
        let side_s: String = row.try_get("side")?;
        Ok(Order {
            id: row.try_get("id")?,
            account_id: row.try_get("account_id")?,
            symbol: row.try_get("symbol")?,
            side: Side::parse(&side_s).ok_or_else(|| anyhow!("invalid order side: {side_s}"))?,
            order_type: OrderType::parse(row.try_get::<String, _>("order_type")?.as_str())?,
            quantity: row.try_get("quantity")?,
            price: Cents::new(row.try_get("price_cents")?),
            status: OrderStatus::parse(row.try_get::<String, _>("status")?.as_str())?,
            algorithm_id: row.try_get("algorithm_id")?,
            created_at: row.try_get("created_at")?,
            filled_at: row.try_get("filled_at")?,
        })
    }
}

#[derive(Clone, Debug)]
pub struct Transaction {
    pub id: i64,
    pub account_id: i64,
    pub tx_type: TxType,
    /// Signed: negative = cash out (buy/withdrawal), positive = cash in.
    pub amount: Cents,
    pub balance_after: Cents,
    pub symbol: Option<String>,
    pub quantity: Option<i64>,
    pub price: Option<Cents>,
    pub order_id: Option<i64>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    pub fn from_row(row: &PgRow) -> Result<Self> {
        Ok(Transaction {
            id: row.try_get("id")?,
            account_id: row.try_get("account_id")?,
            tx_type: TxType::parse(row.try_get::<String, _>("tx_type")?.as_str())?,
            amount: Cents::new(row.try_get("amount_cents")?),
            balance_after: Cents::new(row.try_get("balance_after_cents")?),
            symbol: row.try_get("symbol")?,
            quantity: row.try_get("quantity")?,
            price: row.try_get::<Option<i64>, _>("price_cents")?.map(Cents::new),
            order_id: row.try_get("order_id")?,
            description: row.try_get("description")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[derive(Clone, Debug)]
pub struct Algorithm {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Algorithm {
    pub fn from_row(row: &PgRow) -> Result<Self> {
        Ok(Algorithm {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            is_active: row.try_get("is_active")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[derive(Clone, Debug)]
pub struct Rule {
    pub id: i64,
    pub algorithm_id: i64,
    pub rule_type: RuleType,
    pub condition_field: String,
    pub condition_operator: ConditionOp,
    pub condition_value: String,
    pub action: String,
    pub order_index: i32,
    pub created_at: DateTime<Utc>,
}

impl Rule {
    pub fn from_row(row: &PgRow) -> Result<Self> {
        let rt: String = row.try_get("rule_type")?;
        let op: String = row.try_get("condition_operator")?;
        Ok(Rule {
            id: row.try_get("id")?,
            algorithm_id: row.try_get("algorithm_id")?,
            rule_type: RuleType::parse(&rt).ok_or_else(|| anyhow!("invalid rule type: {rt}"))?,
            condition_field: row.try_get("condition_field")?,
            condition_operator: ConditionOp::parse(&op)
                .ok_or_else(|| anyhow!("invalid condition operator: {op}"))?,
            condition_value: row.try_get("condition_value")?,
            action: row.try_get("action")?,
            order_index: row.try_get("order_index")?,
            created_at: row.try_get("created_at")?,
        })
    }

    /// The pure-evaluation view of this row.
    pub fn def(&self) -> RuleDef {
        RuleDef {
            rule_type: self.rule_type,
            condition_field: self.condition_field.clone(),
            condition_operator: self.condition_operator,
            condition_value: self.condition_value.clone(),
            action: self.action.clone(),
            order_index: self.order_index,
        }
    }
}

#[derive(Clone, Debug)]
pub struct BacktestRow {
    pub id: i64,
    pub algorithm_id: i64,
    pub symbol: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub initial_capital: Cents,
    /// running | completed | failed
    pub status: String,
    pub error: Option<String>,
    pub final_capital: Option<Cents>,
    pub total_return: Option<Cents>,
    pub total_return_percent: Option<f64>,
    pub total_trades: Option<i32>,
    pub winning_trades: Option<i32>,
    pub losing_trades: Option<i32>,
    pub win_rate: Option<f64>,
    pub max_drawdown: Option<f64>,
    pub sharpe_ratio: Option<f64>,
    pub results_json: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl BacktestRow {
    pub fn from_row(row: &PgRow) -> Result<Self> {
        Ok(BacktestRow {
            id: row.try_get("id")?,
            algorithm_id: row.try_get("algorithm_id")?,
            symbol: row.try_get("symbol")?,
            start_date: row.try_get("start_date")?,
            end_date: row.try_get("end_date")?,
            initial_capital: Cents::new(row.try_get("initial_capital_cents")?),
            status: row.try_get("status")?,
            error: row.try_get("error")?,
            final_capital: row
                .try_get::<Option<i64>, _>("final_capital_cents")?
                .map(Cents::new),
            total_return: row
                .try_get::<Option<i64>, _>("total_return_cents")?
                .map(Cents::new),
            total_return_percent: row.try_get("total_return_pct")?,
            total_trades: row.try_get("total_trades")?,
            winning_trades: row.try_get("winning_trades")?,
            losing_trades: row.try_get("losing_trades")?,
            win_rate: row.try_get("win_rate")?,
            max_drawdown: row.try_get("max_drawdown")?,
            sharpe_ratio: row.try_get("sharpe_ratio")?,
            results_json: row.try_get("results_json")?,
            created_at: row.try_get("created_at")?,
            completed_at: row.try_get("completed_at")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_type_round_trip() {
        assert_eq!(OrderType::parse("market").unwrap(), OrderType::Market);
        assert_eq!(OrderType::parse("LIMIT").unwrap(), OrderType::Limit);
        assert!(OrderType::parse("stop").is_err());
    }

    #[test]
    fn order_status_round_trip() {
        for s in ["pending", "filled", "cancelled"] {
            assert_eq!(OrderStatus::parse(s).unwrap().as_str(), s);
        }
        assert!(OrderStatus::parse("rejected").is_err());
    }

    #[test]
    fn tx_type_round_trip() {
        for s in ["buy", "sell", "deposit", "withdrawal"] {
            assert_eq!(TxType::parse(s).unwrap().as_str(), s);
        }
        assert!(TxType::parse("dividend").is_err());
    }
}
