//! Algorithm and rule storage.
//!
//! Every query is scoped by owner: a row that exists but belongs to another
//! user is indistinguishable from a missing row (`None` / `false`), which the
//! API layer renders as 404.

use anyhow::{Context, Result};
use pdk_rules::{ConditionOp, RuleType};
use sqlx::PgPool;

use crate::models::{Algorithm, Rule};

/// Typed input for rule creation/update. Operators and types are already
/// parsed; string validation lives at the API boundary.
#[derive(Clone, Debug)]
pub struct NewRule {
    pub rule_type: RuleType,
    pub condition_field: String,
    pub condition_operator: ConditionOp,
    pub condition_value: String,
    pub action: String,
    /// Defaults to one past the algorithm's current maximum.
    pub order_index: Option<i32>,
}

pub async fn create_algorithm(
    pool: &PgPool,
    user_id: i64,
    name: &str,
    description: Option<&str>,
) -> Result<Algorithm> {
    let row = sqlx::query(
        r#"
        insert into trading_algorithms (user_id, name, description)
        values ($1, $2, $3)
        returning id, user_id, name, description, is_active, created_at
        "#,
    )
    .bind(user_id)
    .bind(name)
    .bind(description)
    .fetch_one(pool)
    .await
    .context("algorithm insert failed")?;

    Algorithm::from_row(&row)
}

pub async fn list_algorithms(pool: &PgPool, user_id: i64) -> Result<Vec<Algorithm>> {
    let rows = sqlx::query(
        r#"
        select id, user_id, name, description, is_active, created_at
        from trading_algorithms
        where user_id = $1
        order by created_at desc, id desc
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .context("algorithms query failed")?;

    rows.iter().map(Algorithm::from_row).collect()
}

pub async fn fetch_algorithm(
    pool: &PgPool,
    user_id: i64,
    algorithm_id: i64,
) -> Result<Option<Algorithm>> {
    let row = sqlx::query(
        r#"
        select id, user_id, name, description, is_active, created_at
        from trading_algorithms
        where id = $1 and user_id = $2
        "#,
    )
    .bind(algorithm_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .context("algorithm query failed")?;

    row.as_ref().map(Algorithm::from_row).transpose()
}

pub async fn update_algorithm(
    pool: &PgPool,
    user_id: i64,
    algorithm_id: i64,
    name: &str,
    description: Option<&str>,
) -> Result<Option<Algorithm>> {
    let row = sqlx::query(
        r#"
        update trading_algorithms
        set name = $1, description = $2
        where id = $3 and user_id = $4
        returning id, user_id, name, description, is_active, created_at
        "#,
    )
    .bind(name)
    .bind(description)
    .bind(algorithm_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .context("algorithm update failed")?;

    row.as_ref().map(Algorithm::from_row).transpose()
}

/// Cascades to the algorithm's rules via FK. Returns false when no owned row
/// matched.
pub async fn delete_algorithm(pool: &PgPool, user_id: i64, algorithm_id: i64) -> Result<bool> {
    let res = sqlx::query("delete from trading_algorithms where id = $1 and user_id = $2")
        .bind(algorithm_id)
        .bind(user_id)
        .execute(pool)
        .await
        .context("algorithm delete failed")?;
    Ok(res.rows_affected() > 0)
}

pub async fn toggle_algorithm(
    pool: &PgPool,
    user_id: i64,
    algorithm_id: i64,
) -> Result<Option<Algorithm>> {
    let row = sqlx::query(
        r#"
        update trading_algorithms
        set is_active = not is_active
        where id = $1 and user_id = $2
        returning id, user_id, name, description, is_active, created_at
        "#,
    )
    .bind(algorithm_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .context("algorithm toggle failed")?;

    row.as_ref().map(Algorithm::from_row).transpose()
}

/// Rules in evaluation order (ascending `order_index`, id as tiebreak).
pub async fn list_rules(pool: &PgPool, algorithm_id: i64) -> Result<Vec<Rule>> {
    let rows = sqlx::query(
        r#"
        select id, algorithm_id, rule_type, condition_field, condition_operator,
               condition_value, action, order_index, created_at
        from algorithm_rules
        where algorithm_id = $1
        order by order_index asc, id asc
        "#,
    )
    .bind(algorithm_id)
    .fetch_all(pool)
    .await
    .context("rules query failed")?;

    rows.iter().map(Rule::from_row).collect()
}

/// Insert a rule under an owned algorithm. `None` when the algorithm is
/// missing or foreign.
pub async fn create_rule(
    pool: &PgPool,
    user_id: i64,
    algorithm_id: i64,
    rule: &NewRule,
) -> Result<Option<Rule>> {
    if fetch_algorithm(pool, user_id, algorithm_id).await?.is_none() {
        return Ok(None);
    }

    let row = sqlx::query(
        r#"
        insert into algorithm_rules
            (algorithm_id, rule_type, condition_field, condition_operator,
             condition_value, action, order_index)
        values ($1, $2, $3, $4, $5, $6,
                coalesce($7, (select coalesce(max(order_index) + 1, 0)
                              from algorithm_rules where algorithm_id = $1)))
        returning id, algorithm_id, rule_type, condition_field, condition_operator,
                  condition_value, action, order_index, created_at
        "#,
    )
    .bind(algorithm_id)
    .bind(rule.rule_type.as_str())
    .bind(&rule.condition_field)
    .bind(rule.condition_operator.as_str())
    .bind(&rule.condition_value)
    .bind(&rule.action)
    .bind(rule.order_index)
    .fetch_one(pool)
    .await
    .context("rule insert failed")?;

    Ok(Some(Rule::from_row(&row)?))
}

pub async fn update_rule(
    pool: &PgPool,
    user_id: i64,
    algorithm_id: i64,
    rule_id: i64,
    rule: &NewRule,
) -> Result<Option<Rule>> {
    let row = sqlx::query(
        r#"
        update algorithm_rules r
        set rule_type = $1, condition_field = $2, condition_operator = $3,
            condition_value = $4, action = $5,
            order_index = coalesce($6, r.order_index)
        from trading_algorithms a
        where r.id = $7 and r.algorithm_id = $8
          and a.id = r.algorithm_id and a.user_id = $9
        returning r.id, r.algorithm_id, r.rule_type, r.condition_field,
                  r.condition_operator, r.condition_value, r.action,
                  r.order_index, r.created_at
        "#,
    )
    .bind(rule.rule_type.as_str())
    .bind(&rule.condition_field)
    .bind(rule.condition_operator.as_str())
    .bind(&rule.condition_value)
    .bind(&rule.action)
    .bind(rule.order_index)
    .bind(rule_id)
    .bind(algorithm_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .context("rule update failed")?;

    row.as_ref().map(Rule::from_row).transpose()
}

pub async fn delete_rule(
    pool: &PgPool,
    user_id: i64,
    algorithm_id: i64,
    rule_id: i64,
) -> Result<bool> {
    let res = sqlx::query(
        r#"
        delete from algorithm_rules r
        using trading_algorithms a
        where r.id = $1 and r.algorithm_id = $2
          and a.id = r.algorithm_id and a.user_id = $3
        "#,
    )
    .bind(rule_id)
    .bind(algorithm_id)
    .bind(user_id)
    .execute(pool)
    .await
    .context("rule delete failed")?;
    Ok(res.rows_affected() > 0)
}
