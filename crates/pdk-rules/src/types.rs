use std::collections::BTreeMap;
use std::fmt;

/// BUY or SELL for order intents and fills.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buy" => Some(Side::Buy),
            "sell" => Some(Side::Sell),
            _ => None,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of a rule within an algorithm.
///
/// The evaluator treats every type identically; the type is descriptive
/// metadata for the author (entry vs. exit vs. protective rules).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RuleType {
    Entry,
    Exit,
    StopLoss,
    TakeProfit,
    Condition,
}

impl RuleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleType::Entry => "entry",
            RuleType::Exit => "exit",
            RuleType::StopLoss => "stop_loss",
            RuleType::TakeProfit => "take_profit",
            RuleType::Condition => "condition",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "entry" => Some(RuleType::Entry),
            "exit" => Some(RuleType::Exit),
            "stop_loss" => Some(RuleType::StopLoss),
            "take_profit" => Some(RuleType::TakeProfit),
            "condition" => Some(RuleType::Condition),
            _ => None,
        }
    }
}

/// Comparison operator of a rule condition.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConditionOp {
    Gt,
    Lt,
    Ge,
    Le,
    Eq,
    Ne,
}

impl ConditionOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionOp::Gt => ">",
            ConditionOp::Lt => "<",
            ConditionOp::Ge => ">=",
            ConditionOp::Le => "<=",
            ConditionOp::Eq => "==",
            ConditionOp::Ne => "!=",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            ">" => Some(ConditionOp::Gt),
            "<" => Some(ConditionOp::Lt),
            ">=" => Some(ConditionOp::Ge),
            "<=" => Some(ConditionOp::Le),
            "==" => Some(ConditionOp::Eq),
            "!=" => Some(ConditionOp::Ne),
            _ => None,
        }
    }

    /// Apply the operator to two resolved values.
    ///
    /// Equality is exact f64 bit comparison, a documented hazard inherited
    /// from the condition-value format; authors comparing computed indicators
    /// with `==` get exactly what they asked for.
    pub fn apply(&self, left: f64, right: f64) -> bool {
        match self {
            ConditionOp::Gt => left > right,
            ConditionOp::Lt => left < right,
            ConditionOp::Ge => left >= right,
            ConditionOp::Le => left <= right,
            ConditionOp::Eq => left == right,
            ConditionOp::Ne => left != right,
        }
    }
}

/// A single rule as evaluated by the engines.
///
/// `condition_value` is either a decimal literal (`"70"`, `"150.5"`) or the
/// name of another context field (`"sma_50"`), resolved at evaluation time.
#[derive(Clone, Debug, PartialEq)]
pub struct RuleDef {
    pub rule_type: RuleType,
    pub condition_field: String,
    pub condition_operator: ConditionOp,
    pub condition_value: String,
    /// `buy:<N|N%|max>` or `sell:<N|N%|all>`.
    pub action: String,
    /// Ascending evaluation order within an algorithm.
    pub order_index: i32,
}

/// Latest market observation for one symbol.
///
/// Prices are plain f64 here: this is the comparison domain of rule
/// conditions, not the money domain of the ledger.
#[derive(Clone, Debug, PartialEq)]
pub struct MarketSnapshot {
    pub symbol: String,
    pub price: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub volume: f64,
    pub change: f64,
    pub change_percent: f64,
    /// Computed indicators keyed by field name (`sma_20`, `sma_50`, `rsi`).
    /// Absent keys mean insufficient history; rules referencing them do not
    /// fire.
    pub indicators: BTreeMap<String, f64>,
}

impl MarketSnapshot {
    pub fn new(symbol: impl Into<String>, price: f64) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            open: price,
            high: price,
            low: price,
            volume: 0.0,
            change: 0.0,
            change_percent: 0.0,
            indicators: BTreeMap::new(),
        }
    }
}

/// The caller's view of an open position, for `position.*` fields.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PositionView {
    pub quantity: i64,
    pub avg_price: f64,
    pub unrealized_pl: f64,
    pub unrealized_pl_percent: f64,
}

/// Everything a rule can observe: market snapshot, optional position, cash.
#[derive(Clone, Debug, PartialEq)]
pub struct EvalContext {
    pub market: MarketSnapshot,
    pub position: Option<PositionView>,
    /// Cash balance in dollars (comparison domain).
    pub balance: f64,
}

impl EvalContext {
    pub fn new(market: MarketSnapshot, position: Option<PositionView>, balance: f64) -> Self {
        Self {
            market,
            position,
            balance,
        }
    }
}

/// The sized outcome of a fired rule: what the bookkeeper should fill.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrderIntent {
    pub side: Side,
    /// Whole shares, always > 0 (zero-share intents are never produced).
    pub quantity: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_round_trip() {
        assert_eq!(Side::parse("buy"), Some(Side::Buy));
        assert_eq!(Side::parse("SELL"), Some(Side::Sell));
        assert_eq!(Side::parse("hold"), None);
        assert_eq!(Side::Buy.as_str(), "buy");
    }

    #[test]
    fn rule_type_round_trip() {
        for s in ["entry", "exit", "stop_loss", "take_profit", "condition"] {
            assert_eq!(RuleType::parse(s).unwrap().as_str(), s);
        }
        assert_eq!(RuleType::parse("hedge"), None);
    }

    #[test]
    fn condition_op_round_trip() {
        for s in [">", "<", ">=", "<=", "==", "!="] {
            assert_eq!(ConditionOp::parse(s).unwrap().as_str(), s);
        }
        assert_eq!(ConditionOp::parse("<>"), None);
    }

    #[test]
    fn condition_op_apply() {
        assert!(ConditionOp::Gt.apply(2.0, 1.0));
        assert!(!ConditionOp::Gt.apply(1.0, 1.0));
        assert!(ConditionOp::Ge.apply(1.0, 1.0));
        assert!(ConditionOp::Eq.apply(1.5, 1.5));
        assert!(ConditionOp::Ne.apply(1.5, 1.500001));
    }
}
