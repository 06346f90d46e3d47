//! The replay loop.
//!
//! Per bar: append an equity point, compute rolling indicators over the
//! trailing window, build the rule context, then fire rules in
//! `order_index` order against an in-memory ledger mirror.
//!
//! The mirror deliberately diverges from the live ledger in one way: at most
//! one position may be open at a time. A buy intent while a position is open
//! is ignored; a sell intent closes the entire position and realizes
//! `proceeds - qty * avg_price`. Buys still run the weighted-average formula
//! so the mirror stays compatible if stacking is ever allowed.

use std::collections::BTreeMap;

use pdk_ledger::money::{blended_average, Cents};
use pdk_market::{indicators, Bar};
use pdk_rules::{
    evaluate, parse_action, size_intent, EvalContext, MarketSnapshot, OrderIntent, PositionView,
    RuleDef, Side,
};
use tracing::debug;

use crate::metrics::compute_metrics;
use crate::types::{BacktestReport, EquityPoint, Trade};

/// How much history each bar's indicators may see (inclusive of the bar).
const INDICATOR_LOOKBACK: usize = 50;

const SMA_SHORT: usize = 20;
const SMA_LONG: usize = 50;
const RSI_PERIOD: usize = 14;

struct SimPosition {
    quantity: i64,
    avg_price: Cents,
}

struct SimLedger {
    balance: Cents,
    position: Option<SimPosition>,
}

/// Replay `rules` over `bars` (ascending, already filtered to the requested
/// window) starting from `initial_capital`.
///
/// Deterministic: identical inputs produce an identical report.
pub fn run(rules: &[RuleDef], bars: &[Bar], initial_capital: Cents) -> BacktestReport {
    let mut rules: Vec<&RuleDef> = rules.iter().collect();
    rules.sort_by_key(|r| r.order_index);

    let mut ledger = SimLedger {
        balance: initial_capital,
        position: None,
    };
    let mut trades: Vec<Trade> = Vec::new();
    let mut equity_curve: Vec<EquityPoint> = Vec::with_capacity(bars.len());

    let closes = indicators::closes(bars);

    for (i, bar) in bars.iter().enumerate() {
        let close_cents = Cents::from_dollars_f64(bar.close).unwrap_or(Cents::ZERO);
        if close_cents <= Cents::ZERO {
            debug!(timestamp = bar.timestamp, "skipping non-positive close");
            continue;
        }

        // 1. Equity point from pre-trade state.
        let position_value = ledger
            .position
            .as_ref()
            .and_then(|p| close_cents.checked_mul_qty(p.quantity))
            .unwrap_or(Cents::ZERO);
        equity_curve.push(EquityPoint {
            timestamp: bar.timestamp,
            balance: ledger.balance.to_f64(),
            position_value: position_value.to_f64(),
            total_value: (ledger.balance + position_value).to_f64(),
        });

        // 2. Rolling indicators over the trailing window.
        let window_start = i.saturating_sub(INDICATOR_LOOKBACK);
        let window = &closes[window_start..=i];
        let mut ind = BTreeMap::new();
        if let Some(v) = last_defined(&indicators::sma(window, SMA_SHORT)) {
            ind.insert("sma_20".to_string(), v);
        }
        if let Some(v) = last_defined(&indicators::sma(window, SMA_LONG)) {
            ind.insert("sma_50".to_string(), v);
        }
        if let Some(v) = last_defined(&indicators::rsi(window, RSI_PERIOD)) {
            ind.insert("rsi".to_string(), v);
        }

        // 3. Market context; change measured against the previous close.
        let prev_close = if i > 0 { closes[i - 1] } else { bar.close };
        let change = if i > 0 { bar.close - prev_close } else { 0.0 };
        let change_percent = if i > 0 && prev_close != 0.0 {
            change / prev_close * 100.0
        } else {
            0.0
        };

        let snapshot = MarketSnapshot {
            symbol: String::new(),
            price: bar.close,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            volume: bar.volume as f64,
            change,
            change_percent,
            indicators: ind,
        };

        // 4. Rules in order; each firing observes earlier effects.
        for rule in &rules {
            let ctx = EvalContext::new(
                snapshot.clone(),
                position_view(&ledger, close_cents),
                ledger.balance.to_f64(),
            );
            if !evaluate(rule, &ctx) {
                continue;
            }

            let Ok(spec) = parse_action(&rule.action) else {
                // Malformed action: the rule is inert, per the error policy.
                continue;
            };
            let held = ledger.position.as_ref().map(|p| p.quantity);
            let Some(intent) =
                size_intent(&spec, close_cents.raw(), ledger.balance.raw(), held)
            else {
                continue;
            };

            apply_intent(
                &mut ledger,
                &mut trades,
                bar.timestamp,
                close_cents,
                intent,
                rule_label(rule),
            );
        }
    }

    // Force-close anything still open at the final bar.
    if ledger.position.is_some() {
        if let Some(last) = bars.last() {
            let close_cents = Cents::from_dollars_f64(last.close).unwrap_or(Cents::ZERO);
            if close_cents > Cents::ZERO {
                close_position(
                    &mut ledger,
                    &mut trades,
                    last.timestamp,
                    close_cents,
                    "End of backtest period".to_string(),
                );
            }
        }
    }

    let metrics = compute_metrics(initial_capital, ledger.balance, &trades, &equity_curve);

    BacktestReport {
        trades,
        equity_curve,
        metrics,
    }
}

fn last_defined(values: &[Option<f64>]) -> Option<f64> {
    values.last().copied().flatten()
}

fn rule_label(rule: &RuleDef) -> String {
    format!(
        "{}: {} {} {}",
        rule.rule_type.as_str(),
        rule.condition_field,
        rule.condition_operator.as_str(),
        rule.condition_value
    )
}

fn position_view(ledger: &SimLedger, close: Cents) -> Option<PositionView> {
    ledger.position.as_ref().map(|p| {
        let market_value = close.checked_mul_qty(p.quantity).unwrap_or(Cents::ZERO);
        let cost_basis = p.avg_price.checked_mul_qty(p.quantity).unwrap_or(Cents::ZERO);
        let unrealized = market_value - cost_basis;
        PositionView {
            quantity: p.quantity,
            avg_price: p.avg_price.to_f64(),
            unrealized_pl: unrealized.to_f64(),
            unrealized_pl_percent: if cost_basis.raw() != 0 {
                unrealized.raw() as f64 / cost_basis.raw() as f64 * 100.0
            } else {
                0.0
            },
        }
    })
}

fn apply_intent(
    ledger: &mut SimLedger,
    trades: &mut Vec<Trade>,
    timestamp: i64,
    price: Cents,
    intent: OrderIntent,
    reason: String,
) {
    match intent.side {
        Side::Buy => {
            // One open position at a time: stacking buys are ignored.
            if ledger.position.is_some() {
                return;
            }
            let Some(cost) = price.checked_mul_qty(intent.quantity) else {
                return;
            };
            if cost > ledger.balance {
                return;
            }

            let avg = blended_average(0, Cents::ZERO, intent.quantity, price);
            ledger.balance -= cost;
            ledger.position = Some(SimPosition {
                quantity: intent.quantity,
                avg_price: avg,
            });
            trades.push(Trade {
                action: "buy".to_string(),
                timestamp,
                price: price.to_f64(),
                quantity: intent.quantity,
                value: cost.to_f64(),
                reason,
                pl: None,
            });
        }
        Side::Sell => {
            // A sell closes the whole position regardless of the sized
            // quantity; partial exits are a live-ledger feature only.
            close_position(ledger, trades, timestamp, price, reason);
        }
    }
}

fn close_position(
    ledger: &mut SimLedger,
    trades: &mut Vec<Trade>,
    timestamp: i64,
    price: Cents,
    reason: String,
) {
    let Some(position) = ledger.position.take() else {
        return;
    };
    let proceeds = price
        .checked_mul_qty(position.quantity)
        .unwrap_or(Cents::ZERO);
    let cost_basis = position
        .avg_price
        .checked_mul_qty(position.quantity)
        .unwrap_or(Cents::ZERO);

    ledger.balance += proceeds;
    trades.push(Trade {
        action: "sell".to_string(),
        timestamp,
        price: price.to_f64(),
        quantity: position.quantity,
        value: proceeds.to_f64(),
        reason,
        pl: Some((proceeds - cost_basis).to_f64()),
    });
}
