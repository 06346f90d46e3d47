//! pdk-rules
//!
//! Pure rule semantics shared by the live engine and the backtester.
//!
//! Two deterministic functions make up the whole surface:
//! - [`evaluate`]: does a rule fire against a market/account context?
//! - [`action::size_intent`]: how many shares does a fired rule trade?
//!
//! No IO, no clock, no randomness. Both engines feed this crate the same
//! context shape so a strategy backtests and trades live under identical
//! semantics.

pub mod action;
mod evaluator;
mod types;

pub use action::{parse_action, size_intent, ActionParseError, ActionQualifier, ActionSpec};
pub use evaluator::{evaluate, resolve_field};
pub use types::{
    ConditionOp, EvalContext, MarketSnapshot, OrderIntent, PositionView, RuleDef, RuleType, Side,
};
