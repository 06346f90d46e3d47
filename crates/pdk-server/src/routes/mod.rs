//! Axum router wiring.
//!
//! `build_router` is the single entry point; `main.rs` attaches middleware
//! layers after this call so tests can drive the bare router in-process.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, patch, post, put},
    Json, Router,
};

use crate::{api_types::HealthResponse, auth, state::AppState};

mod algorithms;
mod backtest;
mod stocks;
mod trading;

/// Build the complete application router wired to the given shared state.
///
/// Everything except `/health` sits behind the bearer-auth middleware.
pub fn build_router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        // Algorithms & rules
        .route(
            "/algorithms",
            get(algorithms::list).post(algorithms::create),
        )
        .route(
            "/algorithms/:id",
            get(algorithms::fetch)
                .put(algorithms::update)
                .delete(algorithms::remove),
        )
        .route("/algorithms/:id/toggle", patch(algorithms::toggle))
        .route("/algorithms/:id/rules", post(algorithms::create_rule))
        .route(
            "/algorithms/:id/rules/:rule_id",
            put(algorithms::update_rule).delete(algorithms::delete_rule),
        )
        // Paper trading
        .route("/paper-trading/account", get(trading::account))
        .route("/paper-trading/account/reset", post(trading::reset))
        .route("/paper-trading/positions", get(trading::positions))
        .route(
            "/paper-trading/orders",
            get(trading::orders).post(trading::place_order),
        )
        .route("/paper-trading/transactions", get(trading::transactions))
        .route("/paper-trading/portfolio", get(trading::portfolio))
        .route(
            "/paper-trading/algorithms/running",
            get(trading::running_algorithms),
        )
        .route(
            "/paper-trading/algorithms/:id/start",
            post(trading::start_algorithm),
        )
        .route(
            "/paper-trading/algorithms/:id/stop",
            post(trading::stop_algorithm),
        )
        // Stocks
        .route("/stocks/quote/:symbol", get(stocks::quote))
        .route("/stocks/quotes", post(stocks::quotes))
        .route("/stocks/history/:symbol", get(stocks::history))
        // Backtest
        .route("/backtest/run", post(backtest::run))
        .route("/backtest/:id", get(backtest::fetch))
        .route(
            "/backtest/algorithm/:algorithm_id",
            get(backtest::list_for_algorithm),
        )
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            auth::require_auth,
        ));

    Router::new()
        .route("/health", get(health))
        .merge(protected)
        .with_state(state)
}

async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service,
            version: st.build.version,
        }),
    )
}

/// 404 helper with a consistent body for missing-or-foreign entities.
pub(crate) fn not_found(what: &str) -> crate::error::ApiError {
    crate::error::ApiError::NotFound(format!("{what} not found"))
}
