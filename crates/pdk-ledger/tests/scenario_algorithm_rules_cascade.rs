//! Algorithm/rule storage scenarios: ownership scoping and cascade delete.
//!
//! Env-guarded like the fill scenarios; skips without `PDK_DATABASE_URL`.

use pdk_ledger::algorithms::{self, NewRule};
use pdk_ledger::testkit_db_pool;
use pdk_rules::{ConditionOp, RuleType};
use sqlx::PgPool;

async fn pool_or_skip() -> Option<PgPool> {
    match testkit_db_pool().await {
        Ok(Some(pool)) => Some(pool),
        Ok(None) => {
            eprintln!("skipping: PDK_DATABASE_URL not set");
            None
        }
        Err(e) => panic!("db setup failed: {e:#}"),
    }
}

async fn make_user(pool: &PgPool) -> i64 {
    let email = format!("test-{}@paperdesk.test", uuid::Uuid::new_v4());
    let (id,): (i64,) =
        sqlx::query_as("insert into users (email, display_name) values ($1, 'Test') returning id")
            .bind(email)
            .fetch_one(pool)
            .await
            .expect("user insert");
    id
}

fn rule(field: &str, value: &str, action: &str) -> NewRule {
    NewRule {
        rule_type: RuleType::Entry,
        condition_field: field.to_string(),
        condition_operator: ConditionOp::Gt,
        condition_value: value.to_string(),
        action: action.to_string(),
        order_index: None,
    }
}

#[tokio::test]
async fn rules_default_to_appended_order_index() {
    let Some(pool) = pool_or_skip().await else { return };
    let user_id = make_user(&pool).await;
    let algo = algorithms::create_algorithm(&pool, user_id, "momentum", None)
        .await
        .unwrap();

    let r0 = algorithms::create_rule(&pool, user_id, algo.id, &rule("price", "100", "buy:10"))
        .await
        .unwrap()
        .unwrap();
    let r1 = algorithms::create_rule(&pool, user_id, algo.id, &rule("rsi", "70", "sell:all"))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(r0.order_index, 0);
    assert_eq!(r1.order_index, 1);

    let rules = algorithms::list_rules(&pool, algo.id).await.unwrap();
    assert_eq!(rules.len(), 2);
    assert!(rules.windows(2).all(|w| w[0].order_index <= w[1].order_index));
}

#[tokio::test]
async fn deleting_algorithm_cascades_to_rules() {
    let Some(pool) = pool_or_skip().await else { return };
    let user_id = make_user(&pool).await;
    let algo = algorithms::create_algorithm(&pool, user_id, "to-delete", None)
        .await
        .unwrap();
    algorithms::create_rule(&pool, user_id, algo.id, &rule("price", "100", "buy:10"))
        .await
        .unwrap()
        .unwrap();

    assert!(algorithms::delete_algorithm(&pool, user_id, algo.id).await.unwrap());

    let (count,): (i64,) =
        sqlx::query_as("select count(*) from algorithm_rules where algorithm_id = $1")
            .bind(algo.id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn foreign_rows_look_missing() {
    let Some(pool) = pool_or_skip().await else { return };
    let owner = make_user(&pool).await;
    let intruder = make_user(&pool).await;
    let algo = algorithms::create_algorithm(&pool, owner, "private", None)
        .await
        .unwrap();

    assert!(algorithms::fetch_algorithm(&pool, intruder, algo.id)
        .await
        .unwrap()
        .is_none());
    assert!(!algorithms::delete_algorithm(&pool, intruder, algo.id).await.unwrap());
    assert!(algorithms::create_rule(&pool, intruder, algo.id, &rule("price", "1", "buy:1"))
        .await
        .unwrap()
        .is_none());

    // Owner still sees it.
    assert!(algorithms::fetch_algorithm(&pool, owner, algo.id)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn toggle_flips_active_flag() {
    let Some(pool) = pool_or_skip().await else { return };
    let user_id = make_user(&pool).await;
    let algo = algorithms::create_algorithm(&pool, user_id, "toggle-me", None)
        .await
        .unwrap();
    assert!(algo.is_active);

    let off = algorithms::toggle_algorithm(&pool, user_id, algo.id)
        .await
        .unwrap()
        .unwrap();
    assert!(!off.is_active);

    let on = algorithms::toggle_algorithm(&pool, user_id, algo.id)
        .await
        .unwrap()
        .unwrap();
    assert!(on.is_active);
}
