//! Action parsing and intent sizing.
//!
//! An action string is `<verb>:<qualifier>`:
//!
//! | qualifier | buy                                  | sell                          |
//! |-----------|--------------------------------------|-------------------------------|
//! | `N`       | floor(N) shares                      | min(floor(N), held) shares    |
//! | `N%`      | floor(balance·N/100 / price) shares  | floor(held·N/100) shares      |
//! | `max`     | floor(balance / price) shares        | —                             |
//! | `all`     | —                                    | every held share              |
//!
//! Sizing is pure integer/cent arithmetic; a computed quantity of zero (or a
//! sell with nothing held) produces no intent.

use std::fmt;

use crate::types::{OrderIntent, Side};

/// Parsed form of an action string.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ActionSpec {
    pub side: Side,
    pub qualifier: ActionQualifier,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ActionQualifier {
    /// Fixed share count (already floored).
    Shares(i64),
    /// Percent of buying power (buy) or of the held quantity (sell).
    Percent(f64),
    /// Buy: all cash. Sell-only `all` maps to [`ActionQualifier::All`].
    Max,
    /// Sell: entire position.
    All,
}

/// Why an action string failed to parse.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ActionParseError {
    /// Missing `:` separator.
    MissingSeparator { raw: String },
    /// Verb was not `buy` or `sell`.
    UnknownVerb { verb: String },
    /// Qualifier was empty or not `N`, `N%`, `max`, `all`.
    BadQualifier { qualifier: String },
    /// `max` on a sell or `all` on a buy.
    QualifierVerbMismatch { verb: &'static str, qualifier: String },
    /// Share count or percent was zero or negative.
    NonPositiveAmount { qualifier: String },
}

impl fmt::Display for ActionParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingSeparator { raw } => {
                write!(f, "action '{raw}' is missing the ':' separator")
            }
            Self::UnknownVerb { verb } => {
                write!(f, "action verb '{verb}' must be buy or sell")
            }
            Self::BadQualifier { qualifier } => {
                write!(f, "action qualifier '{qualifier}' is not N, N%, max or all")
            }
            Self::QualifierVerbMismatch { verb, qualifier } => {
                write!(f, "qualifier '{qualifier}' is not valid for {verb}")
            }
            Self::NonPositiveAmount { qualifier } => {
                write!(f, "action amount '{qualifier}' must be positive")
            }
        }
    }
}

impl std::error::Error for ActionParseError {}

/// Parse `<verb>:<qualifier>` into an [`ActionSpec`].
pub fn parse_action(raw: &str) -> Result<ActionSpec, ActionParseError> {
    let raw = raw.trim();
    let (verb, qualifier) = raw.split_once(':').ok_or_else(|| {
        ActionParseError::MissingSeparator {
            raw: raw.to_string(),
        }
    })?;

    let side = Side::parse(verb).ok_or_else(|| ActionParseError::UnknownVerb {
        verb: verb.to_string(),
    })?;

    let q = qualifier.trim();
    let qualifier = match (side, q.to_ascii_lowercase().as_str()) {
        (Side::Buy, "max") => ActionQualifier::Max,
        (Side::Sell, "all") => ActionQualifier::All,
        (Side::Buy, "all") => {
            return Err(ActionParseError::QualifierVerbMismatch {
                verb: "buy",
                qualifier: q.to_string(),
            })
        }
        (Side::Sell, "max") => {
            return Err(ActionParseError::QualifierVerbMismatch {
                verb: "sell",
                qualifier: q.to_string(),
            })
        }
        _ => parse_amount(q)?,
    };

    Ok(ActionSpec { side, qualifier })
}

fn parse_amount(q: &str) -> Result<ActionQualifier, ActionParseError> {
    if let Some(pct) = q.strip_suffix('%') {
        let value = pct
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| ActionParseError::BadQualifier {
                qualifier: q.to_string(),
            })?;
        if value <= 0.0 {
            return Err(ActionParseError::NonPositiveAmount {
                qualifier: q.to_string(),
            });
        }
        return Ok(ActionQualifier::Percent(value));
    }

    let value = q
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ActionParseError::BadQualifier {
            qualifier: q.to_string(),
        })?;
    if value < 1.0 {
        return Err(ActionParseError::NonPositiveAmount {
            qualifier: q.to_string(),
        });
    }
    Ok(ActionQualifier::Shares(value.floor() as i64))
}

/// Size a parsed action against current cash, price and holdings.
///
/// `price_cents` must be > 0. Returns `None` for every no-op case: a buy that
/// affords zero shares, a sell with no open position, a percent that floors
/// to zero.
pub fn size_intent(
    spec: &ActionSpec,
    price_cents: i64,
    balance_cents: i64,
    position_qty: Option<i64>,
) -> Option<OrderIntent> {
    debug_assert!(price_cents > 0, "size_intent requires a positive price");
    if price_cents <= 0 {
        return None;
    }

    let quantity = match spec.side {
        Side::Buy => match spec.qualifier {
            ActionQualifier::Shares(n) => n,
            ActionQualifier::Max => balance_cents / price_cents,
            ActionQualifier::Percent(pct) => {
                let budget = (balance_cents as f64) * pct / 100.0;
                (budget / price_cents as f64).floor() as i64
            }
            ActionQualifier::All => return None,
        },
        Side::Sell => {
            let held = position_qty.filter(|q| *q > 0)?;
            match spec.qualifier {
                ActionQualifier::Shares(n) => n.min(held),
                ActionQualifier::All => held,
                ActionQualifier::Percent(pct) => ((held as f64) * pct / 100.0).floor() as i64,
                ActionQualifier::Max => return None,
            }
        }
    };

    if quantity <= 0 {
        return None;
    }

    Some(OrderIntent {
        side: spec.side,
        quantity,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(raw: &str) -> ActionSpec {
        parse_action(raw).unwrap()
    }

    // --- Parsing ---

    #[test]
    fn parses_fixed_shares() {
        assert_eq!(
            spec("buy:10"),
            ActionSpec {
                side: Side::Buy,
                qualifier: ActionQualifier::Shares(10)
            }
        );
        // Fractional share counts floor at parse time.
        assert_eq!(spec("sell:7.9").qualifier, ActionQualifier::Shares(7));
    }

    #[test]
    fn parses_percent_and_keywords() {
        assert_eq!(spec("buy:25%").qualifier, ActionQualifier::Percent(25.0));
        assert_eq!(spec("sell:50%").qualifier, ActionQualifier::Percent(50.0));
        assert_eq!(spec("buy:max").qualifier, ActionQualifier::Max);
        assert_eq!(spec("sell:all").qualifier, ActionQualifier::All);
        assert_eq!(spec("BUY:MAX").qualifier, ActionQualifier::Max);
    }

    #[test]
    fn rejects_malformed_actions() {
        assert!(matches!(
            parse_action("buy10"),
            Err(ActionParseError::MissingSeparator { .. })
        ));
        assert!(matches!(
            parse_action("hold:10"),
            Err(ActionParseError::UnknownVerb { .. })
        ));
        assert!(matches!(
            parse_action("buy:lots"),
            Err(ActionParseError::BadQualifier { .. })
        ));
        assert!(matches!(
            parse_action("buy:all"),
            Err(ActionParseError::QualifierVerbMismatch { .. })
        ));
        assert!(matches!(
            parse_action("sell:max"),
            Err(ActionParseError::QualifierVerbMismatch { .. })
        ));
        assert!(matches!(
            parse_action("buy:0"),
            Err(ActionParseError::NonPositiveAmount { .. })
        ));
        assert!(matches!(
            parse_action("sell:-5%"),
            Err(ActionParseError::NonPositiveAmount { .. })
        ));
    }

    // --- Buy sizing ---

    #[test]
    fn buy_fixed_shares() {
        let i = size_intent(&spec("buy:10"), 150_00, 100_000_00, None).unwrap();
        assert_eq!(i, OrderIntent { side: Side::Buy, quantity: 10 });
    }

    #[test]
    fn buy_max_floors_to_affordable() {
        // $100,000 at $149.99 → 666 shares.
        let i = size_intent(&spec("buy:max"), 149_99, 100_000_00, None).unwrap();
        assert_eq!(i.quantity, 666);
    }

    #[test]
    fn buy_percent_of_balance() {
        // 10% of $100,000 = $10,000 at $150 → 66 shares.
        let i = size_intent(&spec("buy:10%"), 150_00, 100_000_00, None).unwrap();
        assert_eq!(i.quantity, 66);
    }

    #[test]
    fn buy_of_zero_shares_is_no_op() {
        assert_eq!(size_intent(&spec("buy:max"), 150_00, 99_00, None), None);
        assert_eq!(size_intent(&spec("buy:1%"), 150_00, 100_00, None), None);
    }

    // --- Sell sizing ---

    #[test]
    fn sell_fixed_clamps_to_held() {
        let i = size_intent(&spec("sell:100"), 150_00, 0, Some(6)).unwrap();
        assert_eq!(i, OrderIntent { side: Side::Sell, quantity: 6 });
    }

    #[test]
    fn sell_percent_of_position() {
        let i = size_intent(&spec("sell:50%"), 150_00, 0, Some(9)).unwrap();
        assert_eq!(i.quantity, 4); // floor(9 * 0.5)
    }

    #[test]
    fn sell_all_takes_entire_position() {
        let i = size_intent(&spec("sell:all"), 150_00, 0, Some(42)).unwrap();
        assert_eq!(i.quantity, 42);
    }

    #[test]
    fn sell_without_position_is_no_op() {
        assert_eq!(size_intent(&spec("sell:all"), 150_00, 0, None), None);
        assert_eq!(size_intent(&spec("sell:10"), 150_00, 0, Some(0)), None);
    }

    #[test]
    fn sell_percent_flooring_to_zero_is_no_op() {
        assert_eq!(size_intent(&spec("sell:10%"), 150_00, 0, Some(5)), None);
    }
}
