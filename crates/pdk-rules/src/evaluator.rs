//! Rule condition evaluation.
//!
//! A rule fires when `condition_field <op> condition_value` holds against the
//! current context. Field resolution is total over the documented field set
//! and returns `None` for anything else; a `None` on the left-hand side means
//! the rule does not fire, while an unresolvable right-hand side degrades to
//! `0.0` (matching the journal semantics this engine replays).

use crate::types::{ConditionOp, EvalContext, RuleDef};

/// Resolve a context field name to its current value.
///
/// Supported names:
/// - market: `price`, `open`, `high`, `low`, `volume`, `change`,
///   `change_percent`
/// - account: `balance`
/// - position: `position.quantity`, `position.averagePrice`,
///   `position.unrealizedPL`, `position.unrealizedPLPercent`
/// - any computed indicator present in the snapshot map (`sma_20`, `sma_50`,
///   `rsi`, ...)
///
/// Returns `None` for unknown names and for `position.*` when no position is
/// open.
pub fn resolve_field(ctx: &EvalContext, name: &str) -> Option<f64> {
    let name = name.trim();

    if let Some(sub) = name.strip_prefix("position.") {
        let pos = ctx.position?;
        return match sub {
            "quantity" => Some(pos.quantity as f64),
            "averagePrice" => Some(pos.avg_price),
            "unrealizedPL" => Some(pos.unrealized_pl),
            "unrealizedPLPercent" => Some(pos.unrealized_pl_percent),
            _ => None,
        };
    }

    match name {
        "price" => Some(ctx.market.price),
        "open" => Some(ctx.market.open),
        "high" => Some(ctx.market.high),
        "low" => Some(ctx.market.low),
        "volume" => Some(ctx.market.volume),
        "change" => Some(ctx.market.change),
        "change_percent" | "changePercent" => Some(ctx.market.change_percent),
        "balance" => Some(ctx.balance),
        other => ctx.market.indicators.get(other).copied(),
    }
}

/// Evaluate a single rule against the context.
///
/// Never errors: anything unresolvable or non-finite yields `false`, so a
/// malformed rule is inert rather than fatal to the tick.
pub fn evaluate(rule: &RuleDef, ctx: &EvalContext) -> bool {
    // A position-scoped rule must not fire while flat, even when the
    // comparison itself would be satisfiable with defaults.
    if rule.condition_field.trim().starts_with("position.") && ctx.position.is_none() {
        return false;
    }

    let left = match resolve_field(ctx, &rule.condition_field) {
        Some(v) if v.is_finite() => v,
        _ => return false,
    };

    let right = parse_condition_value(ctx, &rule.condition_value);

    rule.condition_operator.apply(left, right)
}

/// A condition value is a decimal literal, or the name of another field.
/// Unresolvable field names degrade to `0.0`.
fn parse_condition_value(ctx: &EvalContext, raw: &str) -> f64 {
    let raw = raw.trim();
    if let Ok(v) = raw.parse::<f64>() {
        if v.is_finite() {
            return v;
        }
    }
    resolve_field(ctx, raw)
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MarketSnapshot, PositionView, RuleType};

    fn rule(field: &str, op: ConditionOp, value: &str) -> RuleDef {
        RuleDef {
            rule_type: RuleType::Condition,
            condition_field: field.to_string(),
            condition_operator: op,
            condition_value: value.to_string(),
            action: "buy:1".to_string(),
            order_index: 0,
        }
    }

    fn ctx_with_price(price: f64) -> EvalContext {
        EvalContext::new(MarketSnapshot::new("AAPL", price), None, 100_000.0)
    }

    #[test]
    fn literal_comparison_fires() {
        let ctx = ctx_with_price(150.0);
        assert!(evaluate(&rule("price", ConditionOp::Gt, "100"), &ctx));
        assert!(!evaluate(&rule("price", ConditionOp::Lt, "100"), &ctx));
    }

    #[test]
    fn field_vs_field_comparison() {
        let mut ctx = ctx_with_price(150.0);
        ctx.market.indicators.insert("sma_20".to_string(), 140.0);
        assert!(evaluate(&rule("price", ConditionOp::Gt, "sma_20"), &ctx));
        assert!(!evaluate(&rule("price", ConditionOp::Lt, "sma_20"), &ctx));
    }

    #[test]
    fn missing_left_field_never_fires() {
        let ctx = ctx_with_price(150.0);
        // rsi not computed: even `>= 0` must not fire.
        assert!(!evaluate(&rule("rsi", ConditionOp::Ge, "0"), &ctx));
        assert!(!evaluate(&rule("nonsense", ConditionOp::Gt, "0"), &ctx));
    }

    #[test]
    fn missing_right_field_degrades_to_zero() {
        let ctx = ctx_with_price(150.0);
        assert!(evaluate(&rule("price", ConditionOp::Gt, "no_such_field"), &ctx));
    }

    #[test]
    fn position_rule_without_position_never_fires() {
        let ctx = ctx_with_price(150.0);
        assert!(!evaluate(
            &rule("position.quantity", ConditionOp::Ge, "0"),
            &ctx
        ));
        assert!(!evaluate(
            &rule("position.unrealizedPLPercent", ConditionOp::Lt, "-5"),
            &ctx
        ));
    }

    #[test]
    fn position_fields_resolve_when_open() {
        let mut ctx = ctx_with_price(160.0);
        ctx.position = Some(PositionView {
            quantity: 10,
            avg_price: 150.0,
            unrealized_pl: 100.0,
            unrealized_pl_percent: 6.67,
        });
        assert!(evaluate(&rule("position.quantity", ConditionOp::Gt, "5"), &ctx));
        assert!(evaluate(
            &rule("position.unrealizedPL", ConditionOp::Gt, "50"),
            &ctx
        ));
        assert!(evaluate(
            &rule("position.averagePrice", ConditionOp::Eq, "150"),
            &ctx
        ));
    }

    #[test]
    fn balance_resolves() {
        let ctx = ctx_with_price(10.0);
        assert!(evaluate(&rule("balance", ConditionOp::Ge, "100000"), &ctx));
    }

    #[test]
    fn non_finite_condition_value_treated_as_field_lookup() {
        let ctx = ctx_with_price(1.0);
        // "inf" parses as infinite f64; must fall through to lookup → 0.0.
        assert!(evaluate(&rule("price", ConditionOp::Gt, "inf"), &ctx));
    }

    #[test]
    fn equality_is_exact() {
        let ctx = ctx_with_price(150.1);
        assert!(evaluate(&rule("price", ConditionOp::Eq, "150.1"), &ctx));
        assert!(!evaluate(&rule("price", ConditionOp::Eq, "150.10000001"), &ctx));
    }
}
