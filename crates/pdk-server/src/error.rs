//! API error taxonomy and its mapping to HTTP responses.
//!
//! | variant        | status |
//! |----------------|--------|
//! | `Validation`   | 400    |
//! | `Unauthorized` | 401    |
//! | `NotFound`     | 404    |
//! | `Upstream`     | 502    |
//! | `Internal`     | 500    |
//!
//! `From<anyhow::Error>` downcasts the typed errors raised by the ledger
//! and engine so precondition failures surface as 400/404 instead of 500.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use pdk_engine::{engine_error, EngineError};
use pdk_ledger::fill_error;
use pdk_market::MarketError;
use serde::Serialize;
use tracing::error;

#[derive(Debug)]
pub enum ApiError {
    Validation(String),
    Unauthorized(String),
    NotFound(String),
    Upstream(String),
    Internal(anyhow::Error),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Upstream(msg) => (StatusCode::BAD_GATEWAY, msg),
            ApiError::Internal(e) => {
                error!(error = %format!("{e:#}"), "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        if let Some(fill) = fill_error(&e) {
            // Every fill precondition is the caller's problem.
            return ApiError::Validation(fill.to_string());
        }
        if let Some(engine) = engine_error(&e) {
            return match engine {
                EngineError::NotFound => ApiError::NotFound(engine.to_string()),
                EngineError::NotActive | EngineError::NoRules | EngineError::AlreadyRunning => {
                    ApiError::Validation(engine.to_string())
                }
            };
        }
        ApiError::Internal(e)
    }
}

impl From<MarketError> for ApiError {
    fn from(e: MarketError) -> Self {
        if e.is_validation() {
            ApiError::Validation(e.to_string())
        } else {
            ApiError::Upstream(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdk_ledger::{fills::FillError, Cents};

    #[test]
    fn fill_precondition_maps_to_validation() {
        let err: anyhow::Error = FillError::InsufficientFunds {
            needed: Cents::new(100),
            available: Cents::new(50),
        }
        .into();
        assert!(matches!(ApiError::from(err), ApiError::Validation(_)));
    }

    #[test]
    fn engine_not_found_maps_to_404() {
        let err: anyhow::Error = EngineError::NotFound.into();
        assert!(matches!(ApiError::from(err), ApiError::NotFound(_)));
    }

    #[test]
    fn engine_already_running_maps_to_validation() {
        let err: anyhow::Error = EngineError::AlreadyRunning.into();
        assert!(matches!(ApiError::from(err), ApiError::Validation(_)));
    }

    #[test]
    fn market_errors_split_validation_and_upstream() {
        assert!(matches!(
            ApiError::from(MarketError::InvalidRange("9d".to_string())),
            ApiError::Validation(_)
        ));
        assert!(matches!(
            ApiError::from(MarketError::Transport("refused".to_string())),
            ApiError::Upstream(_)
        ));
    }

    #[test]
    fn unknown_errors_are_internal() {
        let err = anyhow::anyhow!("surprise");
        assert!(matches!(ApiError::from(err), ApiError::Internal(_)));
    }
}
