//! Market data read handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Extension, Json,
};
use pdk_market::{Interval, Range};

use crate::api_types::{HistoryQuery, HistoryResponse, QuotesRequest};
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

const MAX_BATCH_SYMBOLS: usize = 50;

pub(crate) async fn quote(
    State(st): State<Arc<AppState>>,
    Extension(AuthUser(_user_id)): Extension<AuthUser>,
    Path(symbol): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let quote = st.market.get_quote(&symbol).await?;
    Ok(Json(quote))
}

pub(crate) async fn quotes(
    State(st): State<Arc<AppState>>,
    Extension(AuthUser(_user_id)): Extension<AuthUser>,
    Json(body): Json<QuotesRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if body.symbols.is_empty() {
        return Err(ApiError::Validation("symbols must not be empty".to_string()));
    }
    if body.symbols.len() > MAX_BATCH_SYMBOLS {
        return Err(ApiError::Validation(format!(
            "at most {MAX_BATCH_SYMBOLS} symbols per request"
        )));
    }

    let quotes = st.market.get_multiple_quotes(&body.symbols).await;
    Ok(Json(quotes))
}

pub(crate) async fn history(
    State(st): State<Arc<AppState>>,
    Extension(AuthUser(_user_id)): Extension<AuthUser>,
    Path(symbol): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let range = match query.range.as_deref() {
        Some(r) => Range::parse(r)?,
        None => Range::Mo1,
    };
    let interval = match query.interval.as_deref() {
        Some(i) => Interval::parse(i)?,
        None => Interval::D1,
    };

    let bars = st.market.get_historical(&symbol, range, interval).await?;
    Ok(Json(HistoryResponse {
        symbol: symbol.trim().to_ascii_uppercase(),
        bars,
    }))
}
