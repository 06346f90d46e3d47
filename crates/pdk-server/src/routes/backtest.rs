//! Backtest submission and polling.
//!
//! `POST /backtest/run` inserts a `running` record, spawns the replay on a
//! worker task, and answers 202 immediately; `GET /backtest/:id` polls the
//! record until it turns `completed` or `failed`.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::NaiveDate;
use pdk_backtest::{service, BacktestParams};
use pdk_ledger::{algorithms, backtests, Cents};
use pdk_market::Interval;
use pdk_rules::RuleDef;

use crate::api_types::{BacktestResponse, BacktestSubmittedResponse, RunBacktestRequest};
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::routes::not_found;
use crate::state::AppState;

const DEFAULT_INITIAL_CAPITAL: Cents = Cents::new(100_000_00);

fn parse_date(field: &str, raw: &str) -> Result<NaiveDate, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::Validation(format!("{field} must be YYYY-MM-DD, got '{raw}'")))
}

pub(crate) async fn run(
    State(st): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Json(body): Json<RunBacktestRequest>,
) -> Result<impl IntoResponse, ApiError> {
    // Cheap validation first; ledger lookups only for a well-formed request.
    let start_date = parse_date("startDate", &body.start_date)?;
    let end_date = parse_date("endDate", &body.end_date)?;
    let initial_capital = match body.initial_capital {
        Some(dollars) => Cents::from_dollars_f64(dollars)
            .filter(|c| *c > Cents::ZERO)
            .ok_or_else(|| {
                ApiError::Validation("initialCapital must be a positive amount".to_string())
            })?,
        None => DEFAULT_INITIAL_CAPITAL,
    };
    let interval = match body.interval.as_deref() {
        Some(i) => Interval::parse(i)?,
        None => Interval::D1,
    };

    let params = BacktestParams {
        algorithm_id: body.algorithm_id,
        symbol: body.symbol.trim().to_ascii_uppercase(),
        start_date,
        end_date,
        initial_capital,
        interval,
    };
    service::validate_params(&params).map_err(|e| ApiError::Validation(e.to_string()))?;

    let algorithm = algorithms::fetch_algorithm(&st.pool, user_id, params.algorithm_id)
        .await?
        .ok_or_else(|| not_found("algorithm"))?;
    let rules = algorithms::list_rules(&st.pool, algorithm.id).await?;
    if rules.is_empty() {
        return Err(ApiError::Validation("algorithm has no rules".to_string()));
    }
    let rule_defs: Vec<RuleDef> = rules.iter().map(|r| r.def()).collect();

    let id = backtests::insert_running(
        &st.pool,
        params.algorithm_id,
        &params.symbol,
        params.start_date,
        params.end_date,
        params.initial_capital,
    )
    .await?;

    tokio::spawn(service::run_to_completion(
        st.pool.clone(),
        Arc::clone(&st.market),
        rule_defs,
        params,
        id,
    ));

    Ok((
        StatusCode::ACCEPTED,
        Json(BacktestSubmittedResponse {
            id,
            status: "running".to_string(),
        }),
    ))
}

pub(crate) async fn fetch(
    State(st): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let row = backtests::fetch(&st.pool, user_id, id)
        .await?
        .ok_or_else(|| not_found("backtest"))?;
    Ok(Json(BacktestResponse::from(&row)))
}

pub(crate) async fn list_for_algorithm(
    State(st): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(algorithm_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    if algorithms::fetch_algorithm(&st.pool, user_id, algorithm_id)
        .await?
        .is_none()
    {
        return Err(not_found("algorithm"));
    }
    let rows = backtests::list_for_algorithm(&st.pool, user_id, algorithm_id).await?;
    let body: Vec<BacktestResponse> = rows.iter().map(Into::into).collect();
    Ok(Json(body))
}
