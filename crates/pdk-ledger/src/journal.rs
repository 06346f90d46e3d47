//! Read queries over positions, orders and the transaction journal.

use anyhow::{Context, Result};
use sqlx::PgPool;

use crate::models::{Order, Position, Transaction};

pub const DEFAULT_LIST_LIMIT: i64 = 50;

pub async fn list_positions(pool: &PgPool, account_id: i64) -> Result<Vec<Position>> {
    let rows = sqlx::query(
        r#"
        select id, account_id, symbol, quantity, avg_price_cents,
               current_price_cents, market_value_cents, unrealized_pl_cents,
               unrealized_pl_pct, updated_at
        from positions
        where account_id = $1
        order by symbol asc
        "#,
    )
    .bind(account_id)
    .fetch_all(pool)
    .await
    .context("positions query failed")?;

    rows.iter().map(Position::from_row).collect()
}

pub async fn fetch_position(
    pool: &PgPool,
    account_id: i64,
    symbol: &str,
) -> Result<Option<Position>> {
    let row = sqlx::query(
        r#"
        select id, account_id, symbol, quantity, avg_price_cents,
               current_price_cents, market_value_cents, unrealized_pl_cents,
               unrealized_pl_pct, updated_at
        from positions
        where account_id = $1 and symbol = $2
        "#,
    )
    .bind(account_id)
    .bind(symbol.trim().to_ascii_uppercase())
    .fetch_optional(pool)
    .await
    .context("position query failed")?;

    row.as_ref().map(Position::from_row).transpose()
}

/// Newest orders first.
pub async fn list_orders(pool: &PgPool, account_id: i64, limit: Option<i64>) -> Result<Vec<Order>> {
    let limit = limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, 500);
    let rows = sqlx::query(
        r#"
        select id, account_id, symbol, side, order_type, quantity, price_cents,
               status, algorithm_id, created_at, filled_at
        from orders
        where account_id = $1
        order by created_at desc, id desc
        limit $2
        "#,
    )
    .bind(account_id)
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("orders query failed")?;

    rows.iter().map(Order::from_row).collect()
}

/// Newest journal entries first.
pub async fn list_transactions(
    pool: &PgPool,
    account_id: i64,
    limit: Option<i64>,
) -> Result<Vec<Transaction>> {
    let limit = limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, 500);
    let rows = sqlx::query(
        r#"
        select id, account_id, tx_type, amount_cents, balance_after_cents,
               symbol, quantity, price_cents, order_id, description, created_at
        from transactions
        where account_id = $1
        order by created_at desc, id desc
        limit $2
        "#,
    )
    .bind(account_id)
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("transactions query failed")?;

    rows.iter().map(Transaction::from_row).collect()
}
