//! Live engine lifecycle: start/stop per algorithm, the tick loop, and
//! process shutdown.
//!
//! ```text
//!         start()                stop() / error
//! [idle] ──────────► [running] ────────────────► [idle]
//!                       │
//!                       └── tick every T ──► evaluate_once()
//! ```
//!
//! Stop is cooperative: it signals the loop and lets an in-flight
//! evaluation finish rather than aborting mid-fill.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use pdk_ledger::algorithms;
use pdk_market::MarketDataService;
use sqlx::PgPool;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::eval;
use crate::registry::RunnerRegistry;

/// Start/stop failures the API maps to 4xx responses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineError {
    /// Algorithm missing or not owned by the caller.
    NotFound,
    /// Algorithm exists but `is_active` is false.
    NotActive,
    /// Algorithm has no rules to evaluate.
    NoRules,
    /// Already registered here or claimed by another runner.
    AlreadyRunning,
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "algorithm not found"),
            Self::NotActive => write!(f, "algorithm is not active"),
            Self::NoRules => write!(f, "algorithm has no rules"),
            Self::AlreadyRunning => write!(f, "algorithm is already running"),
        }
    }
}

impl std::error::Error for EngineError {}

/// Downcast helper mirroring `pdk_ledger::fill_error`.
pub fn engine_error(err: &anyhow::Error) -> Option<&EngineError> {
    err.downcast_ref::<EngineError>()
}

/// Shared mutable state between a runner task and status readers.
#[derive(Default)]
struct RunnerShared {
    last_check: std::sync::Mutex<Option<DateTime<Utc>>>,
}

struct Runner {
    handle: JoinHandle<()>,
    cancel: Arc<Notify>,
    shared: Arc<RunnerShared>,
    symbols: Vec<String>,
}

pub struct LiveEngine {
    pool: PgPool,
    market: Arc<MarketDataService>,
    registry: Arc<dyn RunnerRegistry>,
    /// Single mutex serializing start/stop; also the process-local map of
    /// task handles.
    runners: Mutex<HashMap<i64, Runner>>,
    tick: Duration,
    fallback_symbol: String,
}

impl LiveEngine {
    pub fn new(
        pool: PgPool,
        market: Arc<MarketDataService>,
        registry: Arc<dyn RunnerRegistry>,
        tick: Duration,
        fallback_symbol: impl Into<String>,
    ) -> Self {
        Self {
            pool,
            market,
            registry,
            runners: Mutex::new(HashMap::new()),
            tick,
            fallback_symbol: fallback_symbol.into(),
        }
    }

    /// Start the recurring evaluation task for an algorithm.
    ///
    /// Validates ownership, activation and rule presence; claims the
    /// registry; runs one immediate evaluation; then spawns the tick loop.
    pub async fn start(
        &self,
        algorithm_id: i64,
        user_id: i64,
        symbols: Vec<String>,
    ) -> Result<()> {
        let mut runners = self.runners.lock().await;
        if runners.contains_key(&algorithm_id) {
            return Err(EngineError::AlreadyRunning.into());
        }

        let algo = algorithms::fetch_algorithm(&self.pool, user_id, algorithm_id)
            .await?
            .ok_or(EngineError::NotFound)?;
        if !algo.is_active {
            return Err(EngineError::NotActive.into());
        }
        if algorithms::list_rules(&self.pool, algorithm_id).await?.is_empty() {
            return Err(EngineError::NoRules.into());
        }

        let symbols = normalize_symbols(symbols, &self.fallback_symbol);

        if !self.registry.register(algorithm_id).await? {
            return Err(EngineError::AlreadyRunning.into());
        }

        let shared = Arc::new(RunnerShared::default());
        let cancel = Arc::new(Notify::new());

        // One immediate pass before the timer starts.
        run_guarded_pass(
            &self.pool,
            &self.market,
            algorithm_id,
            user_id,
            &symbols,
            &shared,
        )
        .await;

        let handle = tokio::spawn(tick_loop(
            self.pool.clone(),
            Arc::clone(&self.market),
            Arc::clone(&self.registry),
            algorithm_id,
            user_id,
            symbols.clone(),
            self.tick,
            Arc::clone(&shared),
            Arc::clone(&cancel),
        ));

        runners.insert(
            algorithm_id,
            Runner {
                handle,
                cancel,
                shared,
                symbols,
            },
        );

        info!(algorithm_id, user_id, "live engine started");
        Ok(())
    }

    /// Signal the runner to stop after any in-flight pass and release its
    /// claim. Idempotent: stopping a non-running algorithm is a no-op.
    pub async fn stop(&self, algorithm_id: i64) -> Result<()> {
        let removed = self.runners.lock().await.remove(&algorithm_id);
        if let Some(runner) = removed {
            runner.cancel.notify_one();
            self.registry.deregister(algorithm_id).await?;
            info!(algorithm_id, "live engine stopped");
        }
        Ok(())
    }

    /// Algorithm ids with a runner task in this process, ascending.
    pub async fn running(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.runners.lock().await.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// When the algorithm's last pass completed, with its symbols.
    pub async fn status(&self, algorithm_id: i64) -> Option<(Vec<String>, Option<DateTime<Utc>>)> {
        let runners = self.runners.lock().await;
        runners.get(&algorithm_id).map(|r| {
            let last = *r.shared.last_check.lock().expect("last_check poisoned");
            (r.symbols.clone(), last)
        })
    }

    /// Stop every runner and wait for in-flight passes with a bounded
    /// deadline. Used at process shutdown.
    pub async fn shutdown(&self, deadline: Duration) {
        let drained: Vec<(i64, Runner)> = self.runners.lock().await.drain().collect();
        for (algorithm_id, runner) in drained {
            runner.cancel.notify_one();
            if tokio::time::timeout(deadline, runner.handle).await.is_err() {
                warn!(algorithm_id, "runner did not drain before deadline; detaching");
            }
            if let Err(e) = self.registry.deregister(algorithm_id).await {
                warn!(algorithm_id, error = %format!("{e:#}"), "lease release failed");
            }
        }
    }
}

fn normalize_symbols(symbols: Vec<String>, fallback: &str) -> Vec<String> {
    let mut out: Vec<String> = symbols
        .into_iter()
        .map(|s| s.trim().to_ascii_uppercase())
        .filter(|s| !s.is_empty())
        .collect();
    out.dedup();
    if out.is_empty() {
        out.push(fallback.to_ascii_uppercase());
    }
    out
}

#[allow(clippy::too_many_arguments)]
async fn tick_loop(
    pool: PgPool,
    market: Arc<MarketDataService>,
    registry: Arc<dyn RunnerRegistry>,
    algorithm_id: i64,
    user_id: i64,
    symbols: Vec<String>,
    tick: Duration,
    shared: Arc<RunnerShared>,
    cancel: Arc<Notify>,
) {
    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick of a fresh interval fires immediately; the start path
    // already ran an immediate pass, so consume it.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = cancel.notified() => {
                info!(algorithm_id, "tick loop cancelled");
                return;
            }
            _ = interval.tick() => {
                run_guarded_pass(&pool, &market, algorithm_id, user_id, &symbols, &shared).await;
                if let Err(e) = registry.heartbeat(algorithm_id).await {
                    warn!(algorithm_id, error = %format!("{e:#}"), "heartbeat failed");
                }
            }
        }
    }
}

/// Run one pass, catching both errors and panics: nothing that happens in a
/// pass may kill the recurring task.
async fn run_guarded_pass(
    pool: &PgPool,
    market: &MarketDataService,
    algorithm_id: i64,
    user_id: i64,
    symbols: &[String],
    shared: &RunnerShared,
) {
    let pass = std::panic::AssertUnwindSafe(eval::evaluate_once(
        pool,
        market,
        algorithm_id,
        user_id,
        symbols,
    ))
    .catch_unwind();

    match pass.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            error!(algorithm_id, error = %format!("{e:#}"), "evaluation pass failed");
        }
        Err(_) => {
            error!(algorithm_id, "evaluation pass panicked; task continues");
        }
    }

    *shared.last_check.lock().expect("last_check poisoned") = Some(Utc::now());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_defaults_to_fallback() {
        assert_eq!(normalize_symbols(vec![], "spy"), vec!["SPY".to_string()]);
        assert_eq!(
            normalize_symbols(vec!["  ".to_string()], "SPY"),
            vec!["SPY".to_string()]
        );
    }

    #[test]
    fn normalize_uppercases_and_dedups_adjacent() {
        assert_eq!(
            normalize_symbols(vec!["aapl".to_string(), "AAPL".to_string(), "msft".to_string()], "SPY"),
            vec!["AAPL".to_string(), "MSFT".to_string()]
        );
    }

    #[test]
    fn engine_error_display() {
        assert_eq!(EngineError::NotFound.to_string(), "algorithm not found");
        assert_eq!(
            EngineError::AlreadyRunning.to_string(),
            "algorithm is already running"
        );
    }
}
