//! Runner registries.
//!
//! The registry answers one question: which algorithms are currently
//! claimed by a live engine. It sits behind a trait because the answer
//! has two correct scopes: this process (an in-memory set) or the whole
//! deployment (a leased database row per runner, reclaimable when its
//! heartbeat goes stale).

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::PgPool;

#[async_trait]
pub trait RunnerRegistry: Send + Sync {
    /// Claim an algorithm. Returns `false` when another runner already
    /// holds a live claim.
    async fn register(&self, algorithm_id: i64) -> Result<bool>;

    /// Release a claim. Idempotent.
    async fn deregister(&self, algorithm_id: i64) -> Result<()>;

    /// Renew the claim's liveness. Called once per tick.
    async fn heartbeat(&self, algorithm_id: i64) -> Result<()>;

    /// Currently claimed algorithm ids, ascending.
    async fn running(&self) -> Result<Vec<i64>>;
}

// ---------------------------------------------------------------------------
// In-memory (single process)
// ---------------------------------------------------------------------------

/// Process-local registry. State dies with the process; suitable for
/// single-replica deployments.
#[derive(Default)]
pub struct InMemoryRegistry {
    inner: Mutex<HashSet<i64>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunnerRegistry for InMemoryRegistry {
    async fn register(&self, algorithm_id: i64) -> Result<bool> {
        Ok(self.inner.lock().expect("registry poisoned").insert(algorithm_id))
    }

    async fn deregister(&self, algorithm_id: i64) -> Result<()> {
        self.inner.lock().expect("registry poisoned").remove(&algorithm_id);
        Ok(())
    }

    async fn heartbeat(&self, _algorithm_id: i64) -> Result<()> {
        Ok(())
    }

    async fn running(&self) -> Result<Vec<i64>> {
        let mut ids: Vec<i64> = self
            .inner
            .lock()
            .expect("registry poisoned")
            .iter()
            .copied()
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }
}

// ---------------------------------------------------------------------------
// Database lease (multi-replica)
// ---------------------------------------------------------------------------

/// Shared-store registry: one `engine_leases` row per claimed algorithm,
/// owned by a named runner. A lease whose heartbeat is older than the TTL is
/// considered abandoned and can be taken over by another runner.
pub struct LeaseRegistry {
    pool: PgPool,
    owner_id: String,
    ttl: Duration,
}

impl LeaseRegistry {
    pub fn new(pool: PgPool, ttl: Duration) -> Self {
        Self {
            pool,
            owner_id: format!("runner-{}", uuid::Uuid::new_v4()),
            ttl,
        }
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    fn ttl_secs(&self) -> f64 {
        self.ttl.as_secs_f64()
    }
}

#[async_trait]
impl RunnerRegistry for LeaseRegistry {
    async fn register(&self, algorithm_id: i64) -> Result<bool> {
        // Insert, or take over a stale lease. A live lease held by anyone
        // (including ourselves) refuses the claim.
        let row: Option<(i64,)> = sqlx::query_as(
            r#"
            insert into engine_leases (algorithm_id, owner_id)
            values ($1, $2)
            on conflict (algorithm_id) do update
                set owner_id = excluded.owner_id,
                    started_at = now(),
                    last_heartbeat = now()
                where engine_leases.last_heartbeat < now() - make_interval(secs => $3)
            returning algorithm_id
            "#,
        )
        .bind(algorithm_id)
        .bind(&self.owner_id)
        .bind(self.ttl_secs())
        .fetch_optional(&self.pool)
        .await
        .context("lease register failed")?;

        Ok(row.is_some())
    }

    async fn deregister(&self, algorithm_id: i64) -> Result<()> {
        sqlx::query("delete from engine_leases where algorithm_id = $1 and owner_id = $2")
            .bind(algorithm_id)
            .bind(&self.owner_id)
            .execute(&self.pool)
            .await
            .context("lease deregister failed")?;
        Ok(())
    }

    async fn heartbeat(&self, algorithm_id: i64) -> Result<()> {
        sqlx::query(
            r#"
            update engine_leases
            set last_heartbeat = now()
            where algorithm_id = $1 and owner_id = $2
            "#,
        )
        .bind(algorithm_id)
        .bind(&self.owner_id)
        .execute(&self.pool)
        .await
        .context("lease heartbeat failed")?;
        Ok(())
    }

    async fn running(&self) -> Result<Vec<i64>> {
        let rows: Vec<(i64,)> = sqlx::query_as(
            r#"
            select algorithm_id
            from engine_leases
            where last_heartbeat >= now() - make_interval(secs => $1)
            order by algorithm_id asc
            "#,
        )
        .bind(self.ttl_secs())
        .fetch_all(&self.pool)
        .await
        .context("lease running query failed")?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_register_is_exclusive() {
        let reg = InMemoryRegistry::new();
        assert!(reg.register(1).await.unwrap());
        assert!(!reg.register(1).await.unwrap());
        assert!(reg.register(2).await.unwrap());
        assert_eq!(reg.running().await.unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn in_memory_deregister_is_idempotent() {
        let reg = InMemoryRegistry::new();
        assert!(reg.register(1).await.unwrap());
        reg.deregister(1).await.unwrap();
        reg.deregister(1).await.unwrap();
        assert!(reg.running().await.unwrap().is_empty());
        // Free to claim again.
        assert!(reg.register(1).await.unwrap());
    }
}
