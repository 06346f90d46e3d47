//! Pure replay-engine scenarios: no DB, no network, no clock.

use pdk_backtest::{engine, BacktestReport};
use pdk_ledger::Cents;
use pdk_market::Bar;
use pdk_rules::{ConditionOp, RuleDef, RuleType};

const DAY: i64 = 86_400;
const BASE_TS: i64 = 1_704_067_200; // 2024-01-01T00:00:00Z

fn bar(i: i64, close: f64) -> Bar {
    Bar {
        timestamp: BASE_TS + i * DAY,
        open: close,
        high: close * 1.01,
        low: close * 0.99,
        close,
        volume: 1_000_000,
    }
}

fn rule(
    rule_type: RuleType,
    field: &str,
    op: ConditionOp,
    value: &str,
    action: &str,
    order_index: i32,
) -> RuleDef {
    RuleDef {
        rule_type,
        condition_field: field.to_string(),
        condition_operator: op,
        condition_value: value.to_string(),
        action: action.to_string(),
        order_index,
    }
}

/// Entry above the short SMA, exit below it.
fn sma_crossover_rules() -> Vec<RuleDef> {
    vec![
        rule(RuleType::Entry, "price", ConditionOp::Gt, "sma_20", "buy:max", 0),
        rule(RuleType::Exit, "price", ConditionOp::Lt, "sma_20", "sell:all", 1),
    ]
}

/// 60 daily bars oscillating around a slow trend, enough to cross the SMA
/// in both directions several times.
fn oscillating_bars() -> Vec<Bar> {
    (0..60)
        .map(|i| {
            let phase = i as f64 * 0.35;
            bar(i, 100.0 + 10.0 * phase.sin() + i as f64 * 0.1)
        })
        .collect()
}

#[test]
fn sma_crossover_run_produces_full_curve_and_bounded_trades() {
    let bars = oscillating_bars();
    let report = engine::run(&sma_crossover_rules(), &bars, Cents::new(100_000_00));

    assert_eq!(report.equity_curve.len(), 60);
    assert!(report.metrics.total_trades >= 1);
    assert!(report.metrics.total_trades <= 30, "at most floor(60/2) exits");
    assert!(report.metrics.max_drawdown >= 0.0);

    // Every sell carries a realized P/L; buys never do.
    for trade in &report.trades {
        match trade.action.as_str() {
            "buy" => assert!(trade.pl.is_none()),
            "sell" => assert!(trade.pl.is_some()),
            other => panic!("unexpected trade action {other}"),
        }
    }
}

#[test]
fn replay_is_deterministic() {
    let bars = oscillating_bars();
    let rules = sma_crossover_rules();

    let a = engine::run(&rules, &bars, Cents::new(100_000_00));
    let b = engine::run(&rules, &bars, Cents::new(100_000_00));

    assert_eq!(a, b);
    // Byte-identical when serialized, too.
    let ja = serde_json::to_vec(&a).unwrap();
    let jb = serde_json::to_vec(&b).unwrap();
    assert_eq!(ja, jb);
}

#[test]
fn buy_and_hold_closes_at_end_of_period() {
    // Always-true entry, no exit rule: one buy, then the forced close.
    let rules = vec![rule(RuleType::Entry, "price", ConditionOp::Gt, "0", "buy:max", 0)];
    let bars: Vec<Bar> = (0..10).map(|i| bar(i, 100.0 + i as f64)).collect();

    let report = engine::run(&rules, &bars, Cents::new(100_000_00));

    let buys = report.trades.iter().filter(|t| t.action == "buy").count();
    assert_eq!(buys, 1, "a second buy while a position is open is ignored");

    let last = report.trades.last().unwrap();
    assert_eq!(last.action, "sell");
    assert_eq!(last.reason, "End of backtest period");
    assert_eq!(last.timestamp, bars.last().unwrap().timestamp);

    // 1000 shares bought at 100, closed at 109: +9 per share.
    assert_eq!(report.metrics.total_trades, 1);
    assert_eq!(report.metrics.winning_trades, 1);
    assert!((last.pl.unwrap() - 9_000.0).abs() < 1e-6);
    assert!((report.metrics.final_capital - 109_000.0).abs() < 1e-6);
}

#[test]
fn same_bar_rules_fire_in_order_and_see_prior_fills() {
    // Rule #0 buys 10, rule #1 exits whenever more than 5 shares are held.
    // Both fire on the same bar; the exit must observe the fresh position.
    let rules = vec![
        rule(RuleType::Entry, "price", ConditionOp::Gt, "100", "buy:10", 0),
        rule(
            RuleType::Exit,
            "position.quantity",
            ConditionOp::Gt,
            "5",
            "sell:all",
            1,
        ),
    ];
    let bars = vec![bar(0, 150.0)];

    let report = engine::run(&rules, &bars, Cents::new(100_000_00));

    assert_eq!(report.trades.len(), 2);
    assert_eq!(report.trades[0].action, "buy");
    assert_eq!(report.trades[0].quantity, 10);
    assert_eq!(report.trades[1].action, "sell");
    assert_eq!(report.trades[1].quantity, 10);
    // Round trip at one price: balance back to initial.
    assert!((report.metrics.final_capital - 100_000.0).abs() < 1e-6);
}

#[test]
fn position_scoped_rule_is_inert_while_flat() {
    let rules = vec![rule(
        RuleType::StopLoss,
        "position.unrealizedPLPercent",
        ConditionOp::Lt,
        "-5",
        "sell:all",
        0,
    )];
    let bars: Vec<Bar> = (0..10).map(|i| bar(i, 100.0 - i as f64 * 5.0)).collect();

    let report = engine::run(&rules, &bars, Cents::new(100_000_00));
    assert!(report.trades.is_empty());
    assert_eq!(report.metrics.total_trades, 0);
    assert!((report.metrics.final_capital - 100_000.0).abs() < 1e-6);
}

#[test]
fn stop_loss_exits_after_drawdown() {
    let rules = vec![
        rule(RuleType::Entry, "price", ConditionOp::Gt, "99", "buy:max", 0),
        rule(
            RuleType::StopLoss,
            "position.unrealizedPLPercent",
            ConditionOp::Lt,
            "-5",
            "sell:all",
            1,
        ),
    ];
    // Enter at 100, slide to 90 (-10%): the stop must fire before the end.
    let closes = [100.0, 99.5, 98.0, 96.0, 93.0, 90.0, 91.0, 92.0];
    let bars: Vec<Bar> = closes.iter().enumerate().map(|(i, c)| bar(i as i64, *c)).collect();

    let report = engine::run(&rules, &bars, Cents::new(100_000_00));

    let exit = report
        .trades
        .iter()
        .find(|t| t.action == "sell")
        .expect("stop loss should have fired");
    assert!(exit.reason.starts_with("stop_loss"));
    assert!(exit.pl.unwrap() < 0.0);
    assert!(report.metrics.losing_trades >= 1);
}

#[test]
fn empty_bars_produce_empty_report() {
    let report: BacktestReport = engine::run(&sma_crossover_rules(), &[], Cents::new(100_000_00));
    assert!(report.trades.is_empty());
    assert!(report.equity_curve.is_empty());
    assert_eq!(report.metrics.total_trades, 0);
    assert_eq!(report.metrics.sharpe_ratio, 0.0);
}
