//! Shared runtime state for pdk-server.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum; this module owns
//! nothing async itself. Components are constructed explicitly at startup
//! and wired here; no process-wide singletons.

use std::sync::Arc;
use std::time::Duration;

use pdk_config::Config;
use pdk_engine::{InMemoryRegistry, LiveEngine};
use pdk_market::MarketDataService;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

/// Static build metadata included in the health response.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

/// Cloneable (Arc) handle shared across all Axum handlers.
pub struct AppState {
    pub pool: PgPool,
    pub market: Arc<MarketDataService>,
    pub engine: Arc<LiveEngine>,
    /// HMAC key for bearer-token verification.
    pub jwt_secret: String,
    pub build: BuildInfo,
}

impl AppState {
    /// Wire the full component graph from configuration.
    pub fn new(config: &Config, pool: PgPool) -> Self {
        let market = Arc::new(MarketDataService::new(
            config.upstream_market_url.clone(),
            config.run_mode,
        ));
        let engine = Arc::new(LiveEngine::new(
            pool.clone(),
            Arc::clone(&market),
            Arc::new(InMemoryRegistry::new()),
            Duration::from_secs(config.engine_tick_secs),
            config.default_symbol.clone(),
        ));

        Self {
            pool,
            market,
            engine,
            jwt_secret: config.jwt_secret.clone(),
            build: BuildInfo {
                service: "pdk-server",
                version: env!("CARGO_PKG_VERSION"),
            },
        }
    }
}
