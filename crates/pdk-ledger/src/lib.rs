//! pdk-ledger
//!
//! Postgres-backed ledger store and portfolio bookkeeper.
//!
//! Owns the authoritative state both engines mutate: accounts, positions,
//! orders, transactions, algorithms, rules and backtest records. All fill
//! operations run inside a single database transaction that locks the
//! account row first, so concurrent fills against one account serialize
//! while different accounts proceed in parallel.

use anyhow::{Context, Result};
use sqlx::{postgres::PgPoolOptions, PgPool};

pub mod accounts;
pub mod algorithms;
pub mod backtests;
pub mod fills;
pub mod journal;
pub mod models;
pub mod money;

pub use accounts::{get_or_create_account, recompute_market_values, reset_account};
pub use fills::{apply_buy, apply_sell, fill_error, FillError, FillOutcome};
pub use models::{
    Account, Algorithm, BacktestRow, Order, OrderStatus, OrderType, Position, Rule, Transaction,
    TxType,
};
pub use money::Cents;

/// Connect to Postgres with a bounded pool.
pub async fn connect(database_url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .context("failed to connect to Postgres")?;
    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

/// Test helper used by integration tests: connect via `PDK_DATABASE_URL`
/// and ensure migrations are applied. Returns `None` when the variable is
/// unset so DB-backed scenario tests can skip on machines without Postgres.
pub async fn testkit_db_pool() -> Result<Option<PgPool>> {
    let Ok(url) = std::env::var("PDK_DATABASE_URL") else {
        return Ok(None);
    };
    let pool = connect(&url).await?;
    migrate(&pool).await?;
    Ok(Some(pool))
}
