//! Algorithm and rule CRUD handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use pdk_ledger::algorithms as store;
use pdk_rules::{parse_action, ConditionOp, RuleType};

use crate::api_types::{
    AlgorithmResponse, AlgorithmWithRulesResponse, CreateAlgorithmRequest, RuleRequest,
    RuleResponse,
};
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::routes::not_found;
use crate::state::AppState;

pub(crate) async fn list(
    State(st): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let algorithms = store::list_algorithms(&st.pool, user_id).await?;
    let body: Vec<AlgorithmResponse> = algorithms.iter().map(Into::into).collect();
    Ok(Json(body))
}

pub(crate) async fn create(
    State(st): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Json(body): Json<CreateAlgorithmRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = body.name.trim();
    if name.is_empty() {
        return Err(ApiError::Validation("name must not be empty".to_string()));
    }

    let algorithm =
        store::create_algorithm(&st.pool, user_id, name, body.description.as_deref()).await?;
    Ok((
        StatusCode::CREATED,
        Json(AlgorithmResponse::from(&algorithm)),
    ))
}

pub(crate) async fn fetch(
    State(st): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let algorithm = store::fetch_algorithm(&st.pool, user_id, id)
        .await?
        .ok_or_else(|| not_found("algorithm"))?;
    let rules = store::list_rules(&st.pool, id).await?;

    Ok(Json(AlgorithmWithRulesResponse {
        algorithm: AlgorithmResponse::from(&algorithm),
        rules: rules.iter().map(RuleResponse::from).collect(),
    }))
}

pub(crate) async fn update(
    State(st): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(id): Path<i64>,
    Json(body): Json<CreateAlgorithmRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = body.name.trim();
    if name.is_empty() {
        return Err(ApiError::Validation("name must not be empty".to_string()));
    }

    let algorithm =
        store::update_algorithm(&st.pool, user_id, id, name, body.description.as_deref())
            .await?
            .ok_or_else(|| not_found("algorithm"))?;
    Ok(Json(AlgorithmResponse::from(&algorithm)))
}

pub(crate) async fn remove(
    State(st): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    if !store::delete_algorithm(&st.pool, user_id, id).await? {
        return Err(not_found("algorithm"));
    }
    // A running algorithm stops when its definition disappears.
    st.engine.stop(id).await?;
    Ok(StatusCode::OK)
}

pub(crate) async fn toggle(
    State(st): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let algorithm = store::toggle_algorithm(&st.pool, user_id, id)
        .await?
        .ok_or_else(|| not_found("algorithm"))?;
    Ok(Json(AlgorithmResponse::from(&algorithm)))
}

/// Parse and validate the string fields of a rule request.
fn parse_rule(body: &RuleRequest) -> Result<store::NewRule, ApiError> {
    let rule_type = RuleType::parse(&body.rule_type).ok_or_else(|| {
        ApiError::Validation(format!("invalid rule_type '{}'", body.rule_type))
    })?;
    let condition_operator = ConditionOp::parse(&body.condition_operator).ok_or_else(|| {
        ApiError::Validation(format!(
            "invalid condition_operator '{}'",
            body.condition_operator
        ))
    })?;
    if body.condition_field.trim().is_empty() {
        return Err(ApiError::Validation(
            "condition_field must not be empty".to_string(),
        ));
    }
    if body.condition_value.trim().is_empty() {
        return Err(ApiError::Validation(
            "condition_value must not be empty".to_string(),
        ));
    }
    parse_action(&body.action).map_err(|e| ApiError::Validation(e.to_string()))?;

    Ok(store::NewRule {
        rule_type,
        condition_field: body.condition_field.trim().to_string(),
        condition_operator,
        condition_value: body.condition_value.trim().to_string(),
        action: body.action.trim().to_string(),
        order_index: body.order_index,
    })
}

pub(crate) async fn create_rule(
    State(st): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(id): Path<i64>,
    Json(body): Json<RuleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let new_rule = parse_rule(&body)?;
    let rule = store::create_rule(&st.pool, user_id, id, &new_rule)
        .await?
        .ok_or_else(|| not_found("algorithm"))?;
    Ok((StatusCode::CREATED, Json(RuleResponse::from(&rule))))
}

pub(crate) async fn update_rule(
    State(st): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path((id, rule_id)): Path<(i64, i64)>,
    Json(body): Json<RuleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let new_rule = parse_rule(&body)?;
    let rule = store::update_rule(&st.pool, user_id, id, rule_id, &new_rule)
        .await?
        .ok_or_else(|| not_found("rule"))?;
    Ok(Json(RuleResponse::from(&rule)))
}

pub(crate) async fn delete_rule(
    State(st): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path((id, rule_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, ApiError> {
    if !store::delete_rule(&st.pool, user_id, id, rule_id).await? {
        return Err(not_found("rule"));
    }
    Ok(StatusCode::OK)
}
