//! One evaluation pass of an algorithm over its configured symbols.
//!
//! Error policy: quote failures, indicator failures and fill precondition
//! violations degrade the pass, never abort it. Only infrastructure errors
//! (ledger unreachable) propagate, and the tick loop logs and swallows even
//! those.

use std::collections::BTreeMap;

use anyhow::Result;
use pdk_ledger::{accounts, algorithms, apply_buy, apply_sell, fill_error, journal, Cents};
use pdk_market::{indicators, MarketDataService, Quote};
use pdk_market::{Interval, Range};
use pdk_rules::{
    evaluate, parse_action, size_intent, EvalContext, MarketSnapshot, PositionView, Side,
};
use sqlx::PgPool;
use tracing::{debug, info, warn};

/// History window backing the live indicator set.
const INDICATOR_RANGE: Range = Range::Mo3;
const INDICATOR_INTERVAL: Interval = Interval::D1;

/// Evaluate every rule of `algorithm_id` against each configured symbol,
/// submitting fills for firing rules. Later rules observe the ledger effects
/// of earlier firings within the same pass.
pub async fn evaluate_once(
    pool: &PgPool,
    market: &MarketDataService,
    algorithm_id: i64,
    user_id: i64,
    symbols: &[String],
) -> Result<()> {
    // Re-read rules each pass so edits apply on the next tick.
    let rules = algorithms::list_rules(pool, algorithm_id).await?;
    if rules.is_empty() {
        debug!(algorithm_id, "no rules; skipping pass");
        return Ok(());
    }

    let quotes = market.get_multiple_quotes(symbols).await;

    for symbol in symbols {
        let key = symbol.trim().to_ascii_uppercase();
        let Some(quote) = quotes.get(&key) else {
            warn!(algorithm_id, symbol = %key, "no quote this tick");
            continue;
        };

        evaluate_symbol(pool, market, algorithm_id, user_id, &key, quote, &rules).await?;
    }

    Ok(())
}

async fn evaluate_symbol(
    pool: &PgPool,
    market: &MarketDataService,
    algorithm_id: i64,
    user_id: i64,
    symbol: &str,
    quote: &Quote,
    rules: &[pdk_ledger::Rule],
) -> Result<()> {
    let Some(price) = Cents::from_dollars_f64(quote.price).filter(|p| *p > Cents::ZERO) else {
        warn!(symbol, price = quote.price, "unusable quote price");
        return Ok(());
    };

    let snapshot = MarketSnapshot {
        symbol: symbol.to_string(),
        price: quote.price,
        open: quote.open,
        high: quote.high,
        low: quote.low,
        volume: quote.volume as f64,
        change: quote.change,
        change_percent: quote.change_percent,
        indicators: live_indicators(market, symbol).await,
    };

    let account = accounts::get_or_create_account(pool, user_id).await?;
    let mut balance = account.balance;
    let mut held: Option<(i64, Cents)> = journal::fetch_position(pool, account.id, symbol)
        .await?
        .map(|p| (p.quantity, p.avg_price));

    for rule in rules {
        let position = held.map(|(quantity, avg)| position_view(quantity, avg, price));
        let ctx = EvalContext::new(snapshot.clone(), position, balance.to_f64());

        if !evaluate(&rule.def(), &ctx) {
            continue;
        }

        let spec = match parse_action(&rule.action) {
            Ok(s) => s,
            Err(e) => {
                warn!(rule_id = rule.id, error = %e, "unparseable action; rule skipped");
                continue;
            }
        };

        let Some(intent) = size_intent(
            &spec,
            price.raw(),
            balance.raw(),
            held.map(|(quantity, _)| quantity),
        ) else {
            continue;
        };

        let result = match intent.side {
            Side::Buy => {
                apply_buy(pool, account.id, symbol, intent.quantity, price, Some(algorithm_id))
                    .await
            }
            Side::Sell => {
                apply_sell(pool, account.id, symbol, intent.quantity, price, Some(algorithm_id))
                    .await
            }
        };

        match result {
            Ok(outcome) => {
                info!(
                    algorithm_id,
                    symbol,
                    side = intent.side.as_str(),
                    quantity = intent.quantity,
                    order_id = outcome.order_id,
                    "rule fill executed"
                );
                balance = outcome.balance_after;
                held = (outcome.position_quantity > 0)
                    .then_some((outcome.position_quantity, outcome.avg_price));
            }
            Err(e) => match fill_error(&e) {
                // Precondition races (funds/shares) are dropped for the tick.
                Some(reason) => {
                    warn!(algorithm_id, symbol, reason = %reason, "fill rejected");
                }
                None => return Err(e),
            },
        }
    }

    Ok(())
}

/// Best-effort daily-bar indicators. Failures just mean "no indicators this
/// tick"; position- and price-based rules keep working.
async fn live_indicators(market: &MarketDataService, symbol: &str) -> BTreeMap<String, f64> {
    let mut out = BTreeMap::new();
    let bars = match market
        .get_historical(symbol, INDICATOR_RANGE, INDICATOR_INTERVAL)
        .await
    {
        Ok(bars) => bars,
        Err(e) => {
            warn!(symbol, error = %e, "indicator history unavailable");
            return out;
        }
    };

    let closes = indicators::closes(&bars);
    if let Some(v) = indicators::sma(&closes, 20).last().copied().flatten() {
        out.insert("sma_20".to_string(), v);
    }
    if let Some(v) = indicators::sma(&closes, 50).last().copied().flatten() {
        out.insert("sma_50".to_string(), v);
    }
    if let Some(v) = indicators::rsi(&closes, 14).last().copied().flatten() {
        out.insert("rsi".to_string(), v);
    }
    out
}

fn position_view(quantity: i64, avg: Cents, price: Cents) -> PositionView {
    let market_value = price.checked_mul_qty(quantity).unwrap_or(Cents::ZERO);
    let cost_basis = avg.checked_mul_qty(quantity).unwrap_or(Cents::ZERO);
    let unrealized = market_value - cost_basis;
    PositionView {
        quantity,
        avg_price: avg.to_f64(),
        unrealized_pl: unrealized.to_f64(),
        unrealized_pl_percent: if cost_basis.raw() != 0 {
            unrealized.raw() as f64 / cost_basis.raw() as f64 * 100.0
        } else {
            0.0
        },
    }
}
