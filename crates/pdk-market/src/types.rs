use serde::{Deserialize, Serialize};

use crate::error::MarketError;

/// Latest trade snapshot for a symbol.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub price: f64,
    pub previous_close: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub volume: i64,
    /// Epoch seconds of the quote.
    pub timestamp: i64,
    /// `price - previous_close`.
    pub change: f64,
    pub change_percent: f64,
}

impl Quote {
    /// Fill in the derived change fields from price and previous close.
    pub fn with_change(mut self) -> Self {
        self.change = self.price - self.previous_close;
        self.change_percent = if self.previous_close != 0.0 {
            self.change / self.previous_close * 100.0
        } else {
            0.0
        };
        self
    }
}

/// One historical OHLCV sample.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Epoch seconds (bar start, as reported upstream).
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

/// Supported history window, as understood by the upstream chart API.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Range {
    D1,
    D5,
    Mo1,
    Mo3,
    Mo6,
    Y1,
    Y2,
    Y5,
}

impl Range {
    pub const ALL: [Range; 8] = [
        Range::D1,
        Range::D5,
        Range::Mo1,
        Range::Mo3,
        Range::Mo6,
        Range::Y1,
        Range::Y2,
        Range::Y5,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Range::D1 => "1d",
            Range::D5 => "5d",
            Range::Mo1 => "1mo",
            Range::Mo3 => "3mo",
            Range::Mo6 => "6mo",
            Range::Y1 => "1y",
            Range::Y2 => "2y",
            Range::Y5 => "5y",
        }
    }

    pub fn parse(s: &str) -> Result<Self, MarketError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1d" => Ok(Range::D1),
            "5d" => Ok(Range::D5),
            "1mo" => Ok(Range::Mo1),
            "3mo" => Ok(Range::Mo3),
            "6mo" => Ok(Range::Mo6),
            "1y" => Ok(Range::Y1),
            "2y" => Ok(Range::Y2),
            "5y" => Ok(Range::Y5),
            other => Err(MarketError::InvalidRange(other.to_string())),
        }
    }

    /// Nominal calendar days covered by this range.
    pub fn approx_days(&self) -> i64 {
        match self {
            Range::D1 => 1,
            Range::D5 => 5,
            Range::Mo1 => 30,
            Range::Mo3 => 90,
            Range::Mo6 => 180,
            Range::Y1 => 365,
            Range::Y2 => 730,
            Range::Y5 => 1825,
        }
    }

    /// Smallest standard range whose nominal span covers `days`.
    /// Spans beyond five years clamp to the widest bucket.
    pub fn smallest_covering(days: i64) -> Range {
        for r in Range::ALL {
            if r.approx_days() >= days {
                return r;
            }
        }
        Range::Y5
    }
}

/// Supported bar interval.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Interval {
    M1,
    M5,
    M15,
    M30,
    H1,
    D1,
}

impl Interval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::M1 => "1m",
            Interval::M5 => "5m",
            Interval::M15 => "15m",
            Interval::M30 => "30m",
            Interval::H1 => "1h",
            Interval::D1 => "1d",
        }
    }

    pub fn parse(s: &str) -> Result<Self, MarketError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1m" => Ok(Interval::M1),
            "5m" => Ok(Interval::M5),
            "15m" => Ok(Interval::M15),
            "30m" => Ok(Interval::M30),
            "1h" => Ok(Interval::H1),
            "1d" => Ok(Interval::D1),
            other => Err(MarketError::InvalidInterval(other.to_string())),
        }
    }

    pub fn seconds(&self) -> i64 {
        match self {
            Interval::M1 => 60,
            Interval::M5 => 300,
            Interval::M15 => 900,
            Interval::M30 => 1800,
            Interval::H1 => 3600,
            Interval::D1 => 86_400,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_round_trip() {
        for r in Range::ALL {
            assert_eq!(Range::parse(r.as_str()).unwrap(), r);
        }
        assert!(Range::parse("10y").is_err());
    }

    #[test]
    fn interval_round_trip() {
        for s in ["1m", "5m", "15m", "30m", "1h", "1d"] {
            assert_eq!(Interval::parse(s).unwrap().as_str(), s);
        }
        assert!(Interval::parse("2h").is_err());
    }

    #[test]
    fn smallest_covering_picks_tightest_bucket() {
        assert_eq!(Range::smallest_covering(1), Range::D1);
        assert_eq!(Range::smallest_covering(4), Range::D5);
        assert_eq!(Range::smallest_covering(60), Range::Mo3);
        assert_eq!(Range::smallest_covering(365), Range::Y1);
        assert_eq!(Range::smallest_covering(4000), Range::Y5);
    }

    #[test]
    fn quote_change_derivation() {
        let q = Quote {
            symbol: "AAPL".to_string(),
            price: 150.0,
            previous_close: 148.0,
            open: 149.0,
            high: 151.0,
            low: 147.5,
            volume: 1_000,
            timestamp: 1_700_000_000,
            change: 0.0,
            change_percent: 0.0,
        }
        .with_change();

        assert!((q.change - 2.0).abs() < 1e-9);
        assert!((q.change_percent - 2.0 / 148.0 * 100.0).abs() < 1e-9);
    }
}
