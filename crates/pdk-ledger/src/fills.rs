//! The portfolio bookkeeper: atomic buy/sell fills.
//!
//! Each fill is one database transaction that:
//! 1. locks the account row (`SELECT ... FOR UPDATE`), so concurrent fills on
//!    the same account serialize, different accounts do not contend;
//! 2. checks the precondition (funds / shares) and aborts with a typed
//!    [`FillError`] leaving no side effects;
//! 3. inserts the filled order, moves cash, upserts the position, and
//!    appends the journal transaction whose `balance_after` equals the new
//!    account balance.
//!
//! A failure at any step rolls back the whole unit.

use std::fmt;

use anyhow::{anyhow, Context, Result};
use pdk_rules::Side;
use sqlx::PgPool;

use crate::money::{blended_average, Cents};

/// Precondition violations. Everything else a fill can raise is an
/// infrastructure failure and stays `anyhow`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FillError {
    /// Buy cost exceeds the cash balance.
    InsufficientFunds { needed: Cents, available: Cents },
    /// Sell quantity exceeds the held quantity (or no position exists).
    InsufficientShares { requested: i64, held: i64 },
    /// Quantity must be a positive share count.
    NonPositiveQuantity { quantity: i64 },
    /// Fill price must be positive.
    NonPositivePrice { price: Cents },
    /// The order notional does not fit the ledger's integer range.
    NotionalOverflow,
}

impl fmt::Display for FillError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsufficientFunds { needed, available } => {
                write!(f, "insufficient funds: need {needed}, have {available}")
            }
            Self::InsufficientShares { requested, held } => {
                write!(f, "insufficient shares: requested {requested}, held {held}")
            }
            Self::NonPositiveQuantity { quantity } => {
                write!(f, "quantity must be > 0, got {quantity}")
            }
            Self::NonPositivePrice { price } => {
                write!(f, "price must be > 0, got {price}")
            }
            Self::NotionalOverflow => write!(f, "order notional exceeds ledger range"),
        }
    }
}

impl std::error::Error for FillError {}

/// Downcast helper for callers that map precondition failures differently
/// from infrastructure errors (e.g. HTTP 400 vs 500).
pub fn fill_error(err: &anyhow::Error) -> Option<&FillError> {
    err.downcast_ref::<FillError>()
}

/// What a successful fill left behind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FillOutcome {
    pub order_id: i64,
    pub balance_after: Cents,
    /// Post-fill held quantity for the symbol (0 = position row deleted).
    pub position_quantity: i64,
    pub avg_price: Cents,
}

fn validate(quantity: i64, price: Cents) -> Result<Cents> {
    if quantity <= 0 {
        return Err(FillError::NonPositiveQuantity { quantity }.into());
    }
    if price <= Cents::ZERO {
        return Err(FillError::NonPositivePrice { price }.into());
    }
    price
        .checked_mul_qty(quantity)
        .ok_or_else(|| FillError::NotionalOverflow.into())
}

/// Lock the account row and return its current balance.
async fn lock_account_balance(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    account_id: i64,
) -> Result<Cents> {
    let row: Option<(i64,)> = sqlx::query_as(
        r#"
        select balance_cents
        from paper_accounts
        where id = $1
        for update
        "#,
    )
    .bind(account_id)
    .fetch_optional(&mut **tx)
    .await
    .context("account lock query failed")?;

    let (balance,) = row.ok_or_else(|| anyhow!("account {} not found", account_id))?;
    Ok(Cents::new(balance))
}

async fn insert_filled_order(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    account_id: i64,
    symbol: &str,
    side: Side,
    quantity: i64,
    price: Cents,
    algorithm_id: Option<i64>,
) -> Result<i64> {
    let (order_id,): (i64,) = sqlx::query_as(
        r#"
        insert into orders (account_id, symbol, side, order_type, quantity,
                            price_cents, status, algorithm_id, filled_at)
        values ($1, $2, $3, 'market', $4, $5, 'filled', $6, now())
        returning id
        "#,
    )
    .bind(account_id)
    .bind(symbol)
    .bind(side.as_str())
    .bind(quantity)
    .bind(price.raw())
    .bind(algorithm_id)
    .fetch_one(&mut **tx)
    .await
    .context("order insert failed")?;
    Ok(order_id)
}

async fn set_balance(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    account_id: i64,
    balance: Cents,
) -> Result<()> {
    sqlx::query("update paper_accounts set balance_cents = $1 where id = $2")
        .bind(balance.raw())
        .bind(account_id)
        .execute(&mut **tx)
        .await
        .context("balance update failed")?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn append_transaction(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    account_id: i64,
    tx_type: &str,
    amount: Cents,
    balance_after: Cents,
    symbol: &str,
    quantity: i64,
    price: Cents,
    order_id: i64,
    description: String,
) -> Result<()> {
    sqlx::query(
        r#"
        insert into transactions (account_id, tx_type, amount_cents, balance_after_cents,
                                  symbol, quantity, price_cents, order_id, description)
        values ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(account_id)
    .bind(tx_type)
    .bind(amount.raw())
    .bind(balance_after.raw())
    .bind(symbol)
    .bind(quantity)
    .bind(price.raw())
    .bind(order_id)
    .bind(description)
    .execute(&mut **tx)
    .await
    .context("transaction insert failed")?;
    Ok(())
}

/// Buy `quantity` shares of `symbol` at `price` against the account's cash.
///
/// Precondition: `balance >= quantity * price`, else
/// [`FillError::InsufficientFunds`] with no side effects.
pub async fn apply_buy(
    pool: &PgPool,
    account_id: i64,
    symbol: &str,
    quantity: i64,
    price: Cents,
    algorithm_id: Option<i64>,
) -> Result<FillOutcome> {
    let cost = validate(quantity, price)?;
    let symbol = symbol.trim().to_ascii_uppercase();

    let mut tx = pool.begin().await.context("begin fill transaction")?;

    let balance = lock_account_balance(&mut tx, account_id).await?;
    if balance < cost {
        return Err(FillError::InsufficientFunds {
            needed: cost,
            available: balance,
        }
        .into());
    }

    let order_id = insert_filled_order(
        &mut tx,
        account_id,
        &symbol,
        Side::Buy,
        quantity,
        price,
        algorithm_id,
    )
    .await?;

    let balance_after = balance - cost;
    set_balance(&mut tx, account_id, balance_after).await?;

    // Weighted-average upsert. The blended price only moves on buys.
    let existing: Option<(i64, i64)> = sqlx::query_as(
        r#"
        select quantity, avg_price_cents
        from positions
        where account_id = $1 and symbol = $2
        for update
        "#,
    )
    .bind(account_id)
    .bind(&symbol)
    .fetch_optional(&mut *tx)
    .await
    .context("position lookup failed")?;

    let (position_quantity, avg_price) = match existing {
        Some((held, avg)) => {
            let new_avg = blended_average(held, Cents::new(avg), quantity, price);
            let new_qty = held + quantity;
            sqlx::query(
                r#"
                update positions
                set quantity = $1, avg_price_cents = $2, updated_at = now()
                where account_id = $3 and symbol = $4
                "#,
            )
            .bind(new_qty)
            .bind(new_avg.raw())
            .bind(account_id)
            .bind(&symbol)
            .execute(&mut *tx)
            .await
            .context("position update failed")?;
            (new_qty, new_avg)
        }
        None => {
            sqlx::query(
                r#"
                insert into positions (account_id, symbol, quantity, avg_price_cents)
                values ($1, $2, $3, $4)
                "#,
            )
            .bind(account_id)
            .bind(&symbol)
            .bind(quantity)
            .bind(price.raw())
            .execute(&mut *tx)
            .await
            .context("position insert failed")?;
            (quantity, price)
        }
    };

    append_transaction(
        &mut tx,
        account_id,
        "buy",
        -cost,
        balance_after,
        &symbol,
        quantity,
        price,
        order_id,
        format!("Bought {quantity} {symbol} @ {price}"),
    )
    .await?;

    tx.commit().await.context("commit buy fill")?;

    Ok(FillOutcome {
        order_id,
        balance_after,
        position_quantity,
        avg_price,
    })
}

/// Sell `quantity` shares of `symbol` at `price`.
///
/// Precondition: an open position holds at least `quantity` shares, else
/// [`FillError::InsufficientShares`] with no side effects. The average price
/// is never touched by a sell; the row is deleted when quantity hits zero.
pub async fn apply_sell(
    pool: &PgPool,
    account_id: i64,
    symbol: &str,
    quantity: i64,
    price: Cents,
    algorithm_id: Option<i64>,
) -> Result<FillOutcome> {
    let proceeds = validate(quantity, price)?;
    let symbol = symbol.trim().to_ascii_uppercase();

    let mut tx = pool.begin().await.context("begin fill transaction")?;

    let balance = lock_account_balance(&mut tx, account_id).await?;

    let existing: Option<(i64, i64)> = sqlx::query_as(
        r#"
        select quantity, avg_price_cents
        from positions
        where account_id = $1 and symbol = $2
        for update
        "#,
    )
    .bind(account_id)
    .bind(&symbol)
    .fetch_optional(&mut *tx)
    .await
    .context("position lookup failed")?;

    let (held, avg) = match existing {
        Some((held, avg)) if held >= quantity => (held, Cents::new(avg)),
        Some((held, _)) => {
            return Err(FillError::InsufficientShares {
                requested: quantity,
                held,
            }
            .into());
        }
        None => {
            return Err(FillError::InsufficientShares {
                requested: quantity,
                held: 0,
            }
            .into());
        }
    };

    let order_id = insert_filled_order(
        &mut tx,
        account_id,
        &symbol,
        Side::Sell,
        quantity,
        price,
        algorithm_id,
    )
    .await?;

    let balance_after = balance + proceeds;
    set_balance(&mut tx, account_id, balance_after).await?;

    let remaining = held - quantity;
    if remaining == 0 {
        sqlx::query("delete from positions where account_id = $1 and symbol = $2")
            .bind(account_id)
            .bind(&symbol)
            .execute(&mut *tx)
            .await
            .context("position delete failed")?;
    } else {
        sqlx::query(
            r#"
            update positions
            set quantity = $1, updated_at = now()
            where account_id = $2 and symbol = $3
            "#,
        )
        .bind(remaining)
        .bind(account_id)
        .bind(&symbol)
        .execute(&mut *tx)
        .await
        .context("position update failed")?;
    }

    append_transaction(
        &mut tx,
        account_id,
        "sell",
        proceeds,
        balance_after,
        &symbol,
        quantity,
        price,
        order_id,
        format!("Sold {quantity} {symbol} @ {price}"),
    )
    .await?;

    tx.commit().await.context("commit sell fill")?;

    Ok(FillOutcome {
        order_id,
        balance_after,
        position_quantity: remaining,
        avg_price: avg,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_bad_inputs() {
        let err = validate(0, Cents::new(100)).unwrap_err();
        assert!(matches!(
            fill_error(&err),
            Some(FillError::NonPositiveQuantity { quantity: 0 })
        ));

        let err = validate(1, Cents::ZERO).unwrap_err();
        assert!(matches!(
            fill_error(&err),
            Some(FillError::NonPositivePrice { .. })
        ));

        let err = validate(i64::MAX, Cents::new(100)).unwrap_err();
        assert!(matches!(fill_error(&err), Some(FillError::NotionalOverflow)));
    }

    #[test]
    fn validate_computes_notional() {
        assert_eq!(validate(10, Cents::new(150_00)).unwrap(), Cents::new(1_500_00));
    }

    #[test]
    fn fill_error_messages() {
        let e = FillError::InsufficientFunds {
            needed: Cents::new(1_500_00),
            available: Cents::new(99_00),
        };
        assert_eq!(e.to_string(), "insufficient funds: need 1500.00, have 99.00");

        let e = FillError::InsufficientShares {
            requested: 10,
            held: 4,
        };
        assert_eq!(e.to_string(), "insufficient shares: requested 10, held 4");
    }
}
