//! Technical indicators over close series.
//!
//! Each function returns a vector aligned with its input; `None` marks the
//! warm-up region where the indicator is undefined.
//!
//! - SMA: arithmetic mean of the trailing `period` closes; defined from
//!   index `period - 1`.
//! - EMA: seeded with the SMA at index `period - 1`, then
//!   `ema[i] = (close[i] - ema[i-1]) * k + ema[i-1]` with `k = 2/(period+1)`.
//! - RSI (Wilder): initial averages are simple means over the first `period`
//!   deltas, then smoothed as `avg = (avg*(period-1) + current) / period`;
//!   defined from index `period`.

use crate::types::Bar;

/// Which indicator to compute.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum IndicatorKind {
    Sma,
    Ema,
    Rsi,
}

/// Compute `kind` over the bars' close series.
pub fn indicator(bars: &[Bar], kind: IndicatorKind, period: usize) -> Vec<Option<f64>> {
    let closes = closes(bars);
    match kind {
        IndicatorKind::Sma => sma(&closes, period),
        IndicatorKind::Ema => ema(&closes, period),
        IndicatorKind::Rsi => rsi(&closes, period),
    }
}

/// Extract the close series from bars.
pub fn closes(bars: &[Bar]) -> Vec<f64> {
    bars.iter().map(|b| b.close).collect()
}

/// Simple moving average.
pub fn sma(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; closes.len()];
    if period == 0 || closes.len() < period {
        return out;
    }

    let mut window_sum: f64 = closes[..period].iter().sum();
    out[period - 1] = Some(window_sum / period as f64);

    for i in period..closes.len() {
        window_sum += closes[i] - closes[i - period];
        out[i] = Some(window_sum / period as f64);
    }
    out
}

/// Exponential moving average, SMA-seeded.
pub fn ema(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; closes.len()];
    if period == 0 || closes.len() < period {
        return out;
    }

    let k = 2.0 / (period as f64 + 1.0);
    let seed: f64 = closes[..period].iter().sum::<f64>() / period as f64;
    out[period - 1] = Some(seed);

    let mut prev = seed;
    for i in period..closes.len() {
        let next = (closes[i] - prev) * k + prev;
        out[i] = Some(next);
        prev = next;
    }
    out
}

/// Relative strength index with Wilder smoothing.
///
/// A zero average loss yields RSI 100 (pure uptrend); a zero average gain
/// yields 0 naturally.
pub fn rsi(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; closes.len()];
    if period == 0 || closes.len() <= period {
        return out;
    }

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for i in 1..=period {
        let delta = closes[i] - closes[i - 1];
        avg_gain += delta.max(0.0);
        avg_loss += (-delta).max(0.0);
    }
    avg_gain /= period as f64;
    avg_loss /= period as f64;
    out[period] = Some(rsi_value(avg_gain, avg_loss));

    for i in (period + 1)..closes.len() {
        let delta = closes[i] - closes[i - 1];
        let gain = delta.max(0.0);
        let loss = (-delta).max(0.0);
        avg_gain = (avg_gain * (period as f64 - 1.0) + gain) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + loss) / period as f64;
        out[i] = Some(rsi_value(avg_gain, avg_loss));
    }
    out
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-6;

    fn assert_close(actual: Option<f64>, expected: f64) {
        let v = actual.expect("indicator should be defined");
        assert!(
            (v - expected).abs() < EPS,
            "expected {expected}, got {v}"
        );
    }

    #[test]
    fn sma_fixture() {
        let out = sma(&[1.0, 2.0, 3.0, 4.0, 5.0], 3);
        assert_eq!(out[0], None);
        assert_eq!(out[1], None);
        assert_close(out[2], 2.0);
        assert_close(out[3], 3.0);
        assert_close(out[4], 4.0);
    }

    #[test]
    fn sma_short_series_all_undefined() {
        let out = sma(&[1.0, 2.0], 3);
        assert!(out.iter().all(Option::is_none));
    }

    #[test]
    fn ema_fixture() {
        // period 3, k = 0.5. Seed = sma([1,2,3]) = 2.
        // ema[3] = (4-2)*0.5 + 2 = 3; ema[4] = (5-3)*0.5 + 3 = 4.
        let out = ema(&[1.0, 2.0, 3.0, 4.0, 5.0], 3);
        assert_eq!(out[1], None);
        assert_close(out[2], 2.0);
        assert_close(out[3], 3.0);
        assert_close(out[4], 4.0);
    }

    #[test]
    fn rsi_alternating_fixture() {
        // closes 10,11,10,11,10,11 with period 2:
        // deltas +1,-1,+1,-1,+1
        // rsi[2]: avg_gain=avg_loss=0.5 → 50
        // rsi[3]: avg_gain=(0.5+1)/2=0.75, avg_loss=0.25 → rs=3 → 75
        // rsi[4]: avg_gain=0.375, avg_loss=0.625 → rs=0.6 → 37.5
        let out = rsi(&[10.0, 11.0, 10.0, 11.0, 10.0, 11.0], 2);
        assert_eq!(out[0], None);
        assert_eq!(out[1], None);
        assert_close(out[2], 50.0);
        assert_close(out[3], 75.0);
        assert_close(out[4], 37.5);
    }

    #[test]
    fn rsi_pure_uptrend_is_100() {
        let closes: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        let out = rsi(&closes, 14);
        assert_close(out[14], 100.0);
        assert_close(out[19], 100.0);
    }

    #[test]
    fn rsi_pure_downtrend_is_0() {
        let closes: Vec<f64> = (0..20).map(|i| 100.0 - i as f64).collect();
        let out = rsi(&closes, 14);
        assert_close(out[14], 0.0);
    }

    #[test]
    fn rsi_undefined_until_period() {
        let out = rsi(&[1.0, 2.0, 3.0], 14);
        assert!(out.iter().all(Option::is_none));
    }
}
