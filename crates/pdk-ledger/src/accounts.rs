//! Account lifecycle: lazy creation, mark-to-market refresh, reset.

use std::collections::BTreeMap;

use anyhow::{anyhow, Context, Result};
use sqlx::PgPool;

use crate::models::Account;
use crate::money::Cents;

/// Every account starts with $100,000.00 of paper cash.
pub const DEFAULT_INITIAL_BALANCE: Cents = Cents::new(100_000_00);

/// Fetch the user's paper account, creating it on first access.
pub async fn get_or_create_account(pool: &PgPool, user_id: i64) -> Result<Account> {
    sqlx::query(
        r#"
        insert into paper_accounts (user_id, balance_cents, initial_balance_cents, total_value_cents)
        values ($1, $2, $2, $2)
        on conflict (user_id) do nothing
        "#,
    )
    .bind(user_id)
    .bind(DEFAULT_INITIAL_BALANCE.raw())
    .execute(pool)
    .await
    .context("account create failed")?;

    let row = sqlx::query(
        r#"
        select id, user_id, balance_cents, initial_balance_cents, total_value_cents, created_at
        from paper_accounts
        where user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_one(pool)
    .await
    .context("account fetch failed")?;

    Account::from_row(&row)
}

/// Refresh per-position marks and the account's derived total value.
///
/// Read-only with respect to cash and quantities: only the mark columns and
/// `total_value_cents` move. Symbols missing from `prices` keep their last
/// mark.
pub async fn recompute_market_values(
    pool: &PgPool,
    account_id: i64,
    prices: &BTreeMap<String, Cents>,
) -> Result<Cents> {
    let mut tx = pool.begin().await.context("begin mark refresh")?;

    let rows: Vec<(String, i64, i64)> = sqlx::query_as(
        r#"
        select symbol, quantity, avg_price_cents
        from positions
        where account_id = $1
        order by symbol
        for update
        "#,
    )
    .bind(account_id)
    .fetch_all(&mut *tx)
    .await
    .context("positions fetch failed")?;

    for (symbol, quantity, avg_price) in &rows {
        let Some(price) = prices.get(symbol) else {
            continue;
        };
        let market_value = price
            .checked_mul_qty(*quantity)
            .ok_or_else(|| anyhow!("market value overflow for {symbol}"))?;
        let cost_basis = Cents::new(*avg_price)
            .checked_mul_qty(*quantity)
            .ok_or_else(|| anyhow!("cost basis overflow for {symbol}"))?;
        let unrealized = market_value - cost_basis;
        let unrealized_pct = if *avg_price != 0 {
            unrealized.raw() as f64 / cost_basis.raw() as f64 * 100.0
        } else {
            0.0
        };

        sqlx::query(
            r#"
            update positions
            set current_price_cents = $1,
                market_value_cents  = $2,
                unrealized_pl_cents = $3,
                unrealized_pl_pct   = $4,
                updated_at          = now()
            where account_id = $5 and symbol = $6
            "#,
        )
        .bind(price.raw())
        .bind(market_value.raw())
        .bind(unrealized.raw())
        .bind(unrealized_pct)
        .bind(account_id)
        .bind(symbol)
        .execute(&mut *tx)
        .await
        .context("position mark update failed")?;
    }

    // total_value = balance + Σ market_value, summed over all positions
    // (including ones whose mark predates this refresh).
    let (total,): (i64,) = sqlx::query_as(
        r#"
        update paper_accounts a
        set total_value_cents = a.balance_cents + coalesce((
            select sum(coalesce(p.market_value_cents, p.quantity * p.avg_price_cents))
            from positions p
            where p.account_id = a.id
        ), 0)
        where a.id = $1
        returning total_value_cents
        "#,
    )
    .bind(account_id)
    .fetch_one(&mut *tx)
    .await
    .context("total value update failed")?;

    tx.commit().await.context("commit mark refresh")?;
    Ok(Cents::new(total))
}

/// Wipe the account back to its initial state: positions and transactions
/// deleted, balances restored. One transaction; order history is kept.
pub async fn reset_account(pool: &PgPool, account_id: i64) -> Result<()> {
    let mut tx = pool.begin().await.context("begin account reset")?;

    sqlx::query("delete from positions where account_id = $1")
        .bind(account_id)
        .execute(&mut *tx)
        .await
        .context("positions delete failed")?;

    sqlx::query("delete from transactions where account_id = $1")
        .bind(account_id)
        .execute(&mut *tx)
        .await
        .context("transactions delete failed")?;

    sqlx::query(
        r#"
        update paper_accounts
        set balance_cents = initial_balance_cents,
            total_value_cents = initial_balance_cents
        where id = $1
        "#,
    )
    .bind(account_id)
    .execute(&mut *tx)
    .await
    .context("balance reset failed")?;

    tx.commit().await.context("commit account reset")?;
    Ok(())
}
