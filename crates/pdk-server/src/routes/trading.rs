//! Paper-trading handlers: account views, manual orders, engine control.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use pdk_ledger::{accounts, apply_buy, apply_sell, journal, Cents, OrderType};
use pdk_rules::Side;

use crate::api_types::{
    AccountResponse, ListQuery, OrderFilledResponse, OrderResponse, OrderSummary,
    PlaceOrderRequest, PortfolioResponse, PositionResponse, ResetResponse, RunningResponse,
    StartAlgorithmRequest, StartedResponse, StoppedResponse, TransactionResponse,
};
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

pub(crate) async fn account(
    State(st): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let account = accounts::get_or_create_account(&st.pool, user_id).await?;
    Ok(Json(AccountResponse::from(&account)))
}

pub(crate) async fn positions(
    State(st): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let account = accounts::get_or_create_account(&st.pool, user_id).await?;
    let positions = journal::list_positions(&st.pool, account.id).await?;
    let body: Vec<PositionResponse> = positions.iter().map(Into::into).collect();
    Ok(Json(body))
}

pub(crate) async fn orders(
    State(st): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let account = accounts::get_or_create_account(&st.pool, user_id).await?;
    let orders = journal::list_orders(&st.pool, account.id, query.limit).await?;
    let body: Vec<OrderResponse> = orders.iter().map(Into::into).collect();
    Ok(Json(body))
}

pub(crate) async fn transactions(
    State(st): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let account = accounts::get_or_create_account(&st.pool, user_id).await?;
    let transactions = journal::list_transactions(&st.pool, account.id, query.limit).await?;
    let body: Vec<TransactionResponse> = transactions.iter().map(Into::into).collect();
    Ok(Json(body))
}

/// Manual market order: filled instantly at the last known price.
pub(crate) async fn place_order(
    State(st): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Json(body): Json<PlaceOrderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let side = Side::parse(&body.side)
        .ok_or_else(|| ApiError::Validation(format!("invalid side '{}'", body.side)))?;
    if body.quantity <= 0 {
        return Err(ApiError::Validation(
            "quantity must be a positive share count".to_string(),
        ));
    }
    let symbol = body.symbol.trim().to_ascii_uppercase();
    if symbol.is_empty() {
        return Err(ApiError::Validation("symbol must not be empty".to_string()));
    }
    // Limit orders are accepted but fill like market orders in the paper
    // model; parse just to reject unknown types.
    if let Some(t) = &body.order_type {
        OrderType::parse(t).map_err(|e| ApiError::Validation(e.to_string()))?;
    }

    let quote = st.market.get_quote(&symbol).await?;
    let price = Cents::from_dollars_f64(quote.price)
        .filter(|p| *p > Cents::ZERO)
        .ok_or_else(|| ApiError::Upstream(format!("no usable price for {symbol}")))?;

    let account = accounts::get_or_create_account(&st.pool, user_id).await?;
    let outcome = match side {
        Side::Buy => apply_buy(&st.pool, account.id, &symbol, body.quantity, price, None).await?,
        Side::Sell => apply_sell(&st.pool, account.id, &symbol, body.quantity, price, None).await?,
    };

    Ok((
        StatusCode::CREATED,
        Json(OrderFilledResponse {
            order: OrderSummary {
                id: outcome.order_id,
                symbol,
                side: side.as_str().to_string(),
                quantity: body.quantity,
                price: price.to_f64(),
                status: "filled".to_string(),
            },
            balance: outcome.balance_after.to_f64(),
        }),
    ))
}

/// Account + freshly marked positions + recent orders.
pub(crate) async fn portfolio(
    State(st): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let account = accounts::get_or_create_account(&st.pool, user_id).await?;

    // Mark to market with whatever quotes are available this instant;
    // symbols without a quote keep their previous mark.
    let positions = journal::list_positions(&st.pool, account.id).await?;
    let symbols: Vec<String> = positions.iter().map(|p| p.symbol.clone()).collect();
    if !symbols.is_empty() {
        let quotes = st.market.get_multiple_quotes(&symbols).await;
        let prices: BTreeMap<String, Cents> = quotes
            .into_iter()
            .filter_map(|(sym, q)| {
                Cents::from_dollars_f64(q.price)
                    .filter(|p| *p > Cents::ZERO)
                    .map(|p| (sym, p))
            })
            .collect();
        if !prices.is_empty() {
            accounts::recompute_market_values(&st.pool, account.id, &prices).await?;
        }
    }

    let account = accounts::get_or_create_account(&st.pool, user_id).await?;
    let positions = journal::list_positions(&st.pool, account.id).await?;
    let recent_orders = journal::list_orders(&st.pool, account.id, Some(10)).await?;

    Ok(Json(PortfolioResponse {
        account: AccountResponse::from(&account),
        positions: positions.iter().map(Into::into).collect(),
        recent_orders: recent_orders.iter().map(Into::into).collect(),
    }))
}

pub(crate) async fn reset(
    State(st): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let account = accounts::get_or_create_account(&st.pool, user_id).await?;
    accounts::reset_account(&st.pool, account.id).await?;
    let account = accounts::get_or_create_account(&st.pool, user_id).await?;
    Ok(Json(ResetResponse {
        account: AccountResponse::from(&account),
    }))
}

pub(crate) async fn start_algorithm(
    State(st): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(id): Path<i64>,
    body: Option<Json<StartAlgorithmRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let symbols = body
        .and_then(|Json(b)| b.symbols)
        .unwrap_or_default();

    st.engine.start(id, user_id, symbols).await?;

    let (symbols, last_check) = st.engine.status(id).await.unwrap_or_default();
    Ok(Json(StartedResponse {
        algorithm_id: id,
        symbols,
        last_check,
    }))
}

pub(crate) async fn stop_algorithm(
    State(st): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    // Foreign algorithms look missing; only the owner may stop a runner.
    if pdk_ledger::algorithms::fetch_algorithm(&st.pool, user_id, id)
        .await?
        .is_none()
    {
        return Err(crate::routes::not_found("algorithm"));
    }

    st.engine.stop(id).await?;
    Ok(Json(StoppedResponse {
        algorithm_id: id,
        stopped: true,
    }))
}

pub(crate) async fn running_algorithms(
    State(st): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    // Only the caller's algorithms are visible.
    let running = st.engine.running().await;
    if running.is_empty() {
        return Ok(Json(RunningResponse { running }));
    }
    let mine: std::collections::HashSet<i64> =
        pdk_ledger::algorithms::list_algorithms(&st.pool, user_id)
            .await?
            .iter()
            .map(|a| a.id)
            .collect();

    Ok(Json(RunningResponse {
        running: running.into_iter().filter(|id| mine.contains(id)).collect(),
    }))
}
