//! Deterministic synthetic market data for development mode.
//!
//! When the upstream source is unreachable and the service runs in
//! development mode, these generators stand in for real data. Output is a
//! pure function of (symbol, timestamps): no RNG state, so repeated calls
//! with the same clock input agree.

use crate::types::{Bar, Interval, Quote, Range};

/// FNV-1a over the symbol; the per-symbol personality seed.
fn symbol_seed(symbol: &str) -> u64 {
    let mut h: u64 = 0xcbf29ce484222325;
    for b in symbol.as_bytes() {
        h ^= *b as u64;
        h = h.wrapping_mul(0x100000001b3);
    }
    h
}

/// Base price in dollars, stable per symbol, within [20, 500).
fn base_price(seed: u64) -> f64 {
    20.0 + (seed % 480) as f64
}

/// Bounded deterministic wobble in [-1, 1] derived from seed and step.
fn wobble(seed: u64, step: i64) -> f64 {
    let mixed = seed
        .wrapping_mul(6364136223846793005)
        .wrapping_add(step as u64)
        .wrapping_mul(1442695040888963407);
    ((mixed >> 33) as f64 / (u32::MAX as f64)) * 2.0 - 1.0
}

fn price_at(seed: u64, step: i64) -> f64 {
    let base = base_price(seed);
    let phase = step as f64 * 0.07;
    let trend = (phase.sin() + (phase * 0.31).cos()) * 0.02;
    let noise = wobble(seed, step) * 0.004;
    (base * (1.0 + trend + noise)).max(1.0)
}

pub fn synthetic_quote(symbol: &str, now_ts: i64) -> Quote {
    let seed = symbol_seed(symbol);
    let step = now_ts / 60;
    let price = round2(price_at(seed, step));
    let previous_close = round2(price_at(seed, step - 1440));

    Quote {
        symbol: symbol.to_string(),
        price,
        previous_close,
        open: round2(price_at(seed, step - 390)),
        high: round2(price * 1.01),
        low: round2(price * 0.99),
        volume: 1_000_000 + (seed % 9_000_000) as i64,
        timestamp: now_ts,
        change: 0.0,
        change_percent: 0.0,
    }
    .with_change()
}

pub fn synthetic_bars(symbol: &str, range: Range, interval: Interval, now_ts: i64) -> Vec<Bar> {
    let seed = symbol_seed(symbol);
    let step_secs = interval.seconds();
    let span_secs = range.approx_days() * 86_400;
    let count = (span_secs / step_secs).clamp(1, 1_000);

    let mut bars = Vec::with_capacity(count as usize);
    for i in 0..count {
        let ts = now_ts - (count - 1 - i) * step_secs;
        let step = ts / step_secs.max(60);
        let close = price_at(seed, step);
        let open = price_at(seed, step - 1);
        bars.push(Bar {
            timestamp: ts,
            open: round2(open),
            high: round2(close.max(open) * 1.005),
            low: round2(close.min(open) * 0.995),
            close: round2(close),
            volume: 500_000 + (wobble(seed, step).abs() * 4_500_000.0) as i64,
        });
    }
    bars
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
