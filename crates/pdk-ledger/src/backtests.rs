//! Backtest record persistence.
//!
//! A run is inserted as `running` when submitted and written exactly once
//! more: either `completed` with its metrics and results blob, or `failed`
//! with an error string.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde_json::Value;
use sqlx::PgPool;

use crate::models::BacktestRow;
use crate::money::Cents;

const BACKTEST_COLUMNS: &str = r#"
    b.id, b.algorithm_id, b.symbol, b.start_date, b.end_date,
    b.initial_capital_cents, b.status, b.error, b.final_capital_cents,
    b.total_return_cents, b.total_return_pct, b.total_trades,
    b.winning_trades, b.losing_trades, b.win_rate, b.max_drawdown,
    b.sharpe_ratio, b.results_json, b.created_at, b.completed_at
"#;

/// Metrics columns written at completion.
#[derive(Clone, Debug)]
pub struct BacktestResults {
    pub final_capital: Cents,
    pub total_return: Cents,
    pub total_return_percent: f64,
    pub total_trades: i32,
    pub winning_trades: i32,
    pub losing_trades: i32,
    pub win_rate: f64,
    pub max_drawdown: f64,
    pub sharpe_ratio: f64,
    /// Opaque `{trades, equity_curve, metrics}` blob.
    pub results_json: Value,
}

pub async fn insert_running(
    pool: &PgPool,
    algorithm_id: i64,
    symbol: &str,
    start_date: NaiveDate,
    end_date: NaiveDate,
    initial_capital: Cents,
) -> Result<i64> {
    let (id,): (i64,) = sqlx::query_as(
        r#"
        insert into backtests (algorithm_id, symbol, start_date, end_date,
                               initial_capital_cents, status)
        values ($1, $2, $3, $4, $5, 'running')
        returning id
        "#,
    )
    .bind(algorithm_id)
    .bind(symbol)
    .bind(start_date)
    .bind(end_date)
    .bind(initial_capital.raw())
    .fetch_one(pool)
    .await
    .context("backtest insert failed")?;
    Ok(id)
}

pub async fn complete(pool: &PgPool, backtest_id: i64, results: &BacktestResults) -> Result<()> {
    sqlx::query(
        r#"
        update backtests
        set status = 'completed',
            final_capital_cents = $1,
            total_return_cents  = $2,
            total_return_pct    = $3,
            total_trades        = $4,
            winning_trades      = $5,
            losing_trades       = $6,
            win_rate            = $7,
            max_drawdown        = $8,
            sharpe_ratio        = $9,
            results_json        = $10,
            completed_at        = now()
        where id = $11 and status = 'running'
        "#,
    )
    .bind(results.final_capital.raw())
    .bind(results.total_return.raw())
    .bind(results.total_return_percent)
    .bind(results.total_trades)
    .bind(results.winning_trades)
    .bind(results.losing_trades)
    .bind(results.win_rate)
    .bind(results.max_drawdown)
    .bind(results.sharpe_ratio)
    .bind(&results.results_json)
    .bind(backtest_id)
    .execute(pool)
    .await
    .context("backtest complete failed")?;
    Ok(())
}

pub async fn fail(pool: &PgPool, backtest_id: i64, error: &str) -> Result<()> {
    sqlx::query(
        r#"
        update backtests
        set status = 'failed', error = $1, completed_at = now()
        where id = $2 and status = 'running'
        "#,
    )
    .bind(error)
    .bind(backtest_id)
    .execute(pool)
    .await
    .context("backtest fail failed")?;
    Ok(())
}

/// Fetch one backtest, owner-scoped through its algorithm.
pub async fn fetch(pool: &PgPool, user_id: i64, backtest_id: i64) -> Result<Option<BacktestRow>> {
    let sql = format!(
        r#"
        select {BACKTEST_COLUMNS}
        from backtests b
        join trading_algorithms a on a.id = b.algorithm_id
        where b.id = $1 and a.user_id = $2
        "#
    );
    let row = sqlx::query(&sql)
        .bind(backtest_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .context("backtest query failed")?;

    row.as_ref().map(BacktestRow::from_row).transpose()
}

/// All runs for one owned algorithm, newest first.
pub async fn list_for_algorithm(
    pool: &PgPool,
    user_id: i64,
    algorithm_id: i64,
) -> Result<Vec<BacktestRow>> {
    let sql = format!(
        r#"
        select {BACKTEST_COLUMNS}
        from backtests b
        join trading_algorithms a on a.id = b.algorithm_id
        where b.algorithm_id = $1 and a.user_id = $2
        order by b.created_at desc, b.id desc
        "#
    );
    let rows = sqlx::query(&sql)
        .bind(algorithm_id)
        .bind(user_id)
        .fetch_all(pool)
        .await
        .context("backtests query failed")?;

    rows.iter().map(BacktestRow::from_row).collect()
}
