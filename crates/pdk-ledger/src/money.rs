//! Fixed-point money.
//!
//! All cash, prices and P/L in the ledger are integer **cents** stored as
//! `i64` (`BIGINT` in Postgres). Using a newtype keeps monetary amounts from
//! silently mixing with share quantities, row ids and other plain integers.
//! Quantity multiplication goes through `i128` so a large position cannot
//! overflow silently.
//!
//! Floating point appears only at the edges: parsing user/API input and
//! rendering JSON responses.

use std::fmt;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

/// A monetary amount in cents. 1 USD = `Cents(100)`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cents(i64);

impl Cents {
    pub const ZERO: Cents = Cents(0);

    #[inline]
    pub const fn new(raw: i64) -> Self {
        Cents(raw)
    }

    #[inline]
    pub const fn raw(self) -> i64 {
        self.0
    }

    /// Parse a dollar amount (e.g. API input `150.0`) into cents,
    /// rounding half away from zero.
    pub fn from_dollars_f64(dollars: f64) -> Option<Cents> {
        if !dollars.is_finite() {
            return None;
        }
        let cents = (dollars * 100.0).round();
        if cents > i64::MAX as f64 || cents < i64::MIN as f64 {
            return None;
        }
        Some(Cents(cents as i64))
    }

    /// Dollar value for JSON rendering. Lossless for any realistic balance.
    #[inline]
    pub fn to_f64(self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Multiply a per-share price by a share quantity.
    /// Returns `None` if the product leaves the `i64` range.
    pub fn checked_mul_qty(self, qty: i64) -> Option<Cents> {
        let product = (self.0 as i128) * (qty as i128);
        if product > i64::MAX as i128 || product < i64::MIN as i128 {
            return None;
        }
        Some(Cents(product as i64))
    }

    #[inline]
    pub fn saturating_add(self, rhs: Cents) -> Cents {
        Cents(self.0.saturating_add(rhs.0))
    }

    #[inline]
    pub fn saturating_sub(self, rhs: Cents) -> Cents {
        Cents(self.0.saturating_sub(rhs.0))
    }

    #[inline]
    pub fn is_negative(self) -> bool {
        self.0 < 0
    }
}

impl Add for Cents {
    type Output = Cents;
    fn add(self, rhs: Cents) -> Cents {
        Cents(self.0 + rhs.0)
    }
}

impl Sub for Cents {
    type Output = Cents;
    fn sub(self, rhs: Cents) -> Cents {
        Cents(self.0 - rhs.0)
    }
}

impl AddAssign for Cents {
    fn add_assign(&mut self, rhs: Cents) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Cents {
    fn sub_assign(&mut self, rhs: Cents) {
        self.0 -= rhs.0;
    }
}

impl Neg for Cents {
    type Output = Cents;
    fn neg(self) -> Cents {
        Cents(-self.0)
    }
}

impl fmt::Display for Cents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

/// Weighted-average cost after buying `q2` shares at `p2` onto an existing
/// lot of `q1` shares at `p1`: `(q1·p1 + q2·p2) / (q1+q2)`, rounded half up.
///
/// Sells never go through this function; the average is preserved on the
/// way down.
pub fn blended_average(q1: i64, p1: Cents, q2: i64, p2: Cents) -> Cents {
    debug_assert!(q1 >= 0 && q2 > 0);
    let total_qty = (q1 as i128) + (q2 as i128);
    if total_qty == 0 {
        return Cents::ZERO;
    }
    let notional = (q1 as i128) * (p1.raw() as i128) + (q2 as i128) * (p2.raw() as i128);
    let avg = (notional + total_qty / 2) / total_qty;
    Cents::new(avg as i64)
}
