//! PostgreSQL storage backend.
//!
//! Every operation is a single statement against two tables:
//!
//! ```sql
//! gauges(name TEXT PRIMARY KEY, value DOUBLE PRECISION)
//! counters(name TEXT PRIMARY KEY, value BIGINT)
//! ```
//!
//! Counter increments are one `INSERT .. ON CONFLICT DO UPDATE` so that
//! concurrent agents never race on a read-then-write.

use std::collections::BTreeMap;
use std::time::Duration;

use sqlx::Connection;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info};

use crate::error::StoreResult;
use crate::storage::{HealthCheck, Storage, StorageFuture};
use crate::types::Snapshot;

const MAX_CONNECTIONS: u32 = 10;

/// Storage backed by a PostgreSQL connection pool. Clones share the pool.
#[derive(Clone)]
pub struct PgStorage {
    pool: PgPool,
}

impl PgStorage {
    /// Connect, verify the connection, and create the tables if absent.
    ///
    /// `timeout` bounds each attempt to obtain a connection from the pool.
    pub async fn connect(dsn: &str, timeout: Duration) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(timeout)
            .connect(dsn)
            .await?;
        let store = Self { pool };
        store.ensure_schema().await?;
        info!("postgres storage connected");
        Ok(store)
    }

    async fn ensure_schema(&self) -> StoreResult<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS gauges (
                name   TEXT PRIMARY KEY,
                value  DOUBLE PRECISION NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS counters (
                name   TEXT PRIMARY KEY,
                value  BIGINT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        debug!("postgres schema ensured");
        Ok(())
    }

    /// Close all pooled connections.
    pub async fn close(&self) {
        self.pool.close().await;
        debug!("postgres pool closed");
    }
}

impl Storage for PgStorage {
    fn set_gauge<'a>(&'a self, name: &'a str, value: f64) -> StorageFuture<'a, ()> {
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO gauges(name, value) VALUES($1, $2)
                 ON CONFLICT(name) DO UPDATE SET value = EXCLUDED.value",
            )
            .bind(name)
            .bind(value)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
    }

    fn add_counter<'a>(&'a self, name: &'a str, delta: i64) -> StorageFuture<'a, i64> {
        Box::pin(async move {
            let total = sqlx::query_scalar::<_, i64>(
                "INSERT INTO counters(name, value) VALUES($1, $2)
                 ON CONFLICT(name) DO UPDATE SET value = counters.value + EXCLUDED.value
                 RETURNING value",
            )
            .bind(name)
            .bind(delta)
            .fetch_one(&self.pool)
            .await?;
            Ok(total)
        })
    }

    fn set_counter<'a>(&'a self, name: &'a str, value: i64) -> StorageFuture<'a, ()> {
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO counters(name, value) VALUES($1, $2)
                 ON CONFLICT(name) DO UPDATE SET value = EXCLUDED.value",
            )
            .bind(name)
            .bind(value)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
    }

    fn get_gauge<'a>(&'a self, name: &'a str) -> StorageFuture<'a, Option<f64>> {
        Box::pin(async move {
            let value = sqlx::query_scalar::<_, f64>("SELECT value FROM gauges WHERE name = $1")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;
            Ok(value)
        })
    }

    fn get_counter<'a>(&'a self, name: &'a str) -> StorageFuture<'a, Option<i64>> {
        Box::pin(async move {
            let value = sqlx::query_scalar::<_, i64>("SELECT value FROM counters WHERE name = $1")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;
            Ok(value)
        })
    }

    fn list_gauges(&self) -> StorageFuture<'_, BTreeMap<String, f64>> {
        Box::pin(async move {
            let rows = sqlx::query_as::<_, (String, f64)>("SELECT name, value FROM gauges")
                .fetch_all(&self.pool)
                .await?;
            Ok(rows.into_iter().collect())
        })
    }

    fn list_counters(&self) -> StorageFuture<'_, BTreeMap<String, i64>> {
        Box::pin(async move {
            let rows = sqlx::query_as::<_, (String, i64)>("SELECT name, value FROM counters")
                .fetch_all(&self.pool)
                .await?;
            Ok(rows.into_iter().collect())
        })
    }

    fn snapshot(&self) -> StorageFuture<'_, Snapshot> {
        Box::pin(async move {
            // Both reads see the same database snapshot.
            let mut tx = self.pool.begin().await?;
            sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ")
                .execute(&mut *tx)
                .await?;
            let gauges = sqlx::query_as::<_, (String, f64)>("SELECT name, value FROM gauges")
                .fetch_all(&mut *tx)
                .await?;
            let counters = sqlx::query_as::<_, (String, i64)>("SELECT name, value FROM counters")
                .fetch_all(&mut *tx)
                .await?;
            tx.commit().await?;
            Ok(Snapshot {
                gauges: gauges.into_iter().collect(),
                counters: counters.into_iter().collect(),
            })
        })
    }
}

impl HealthCheck for PgStorage {
    fn ping(&self) -> StorageFuture<'_, ()> {
        Box::pin(async move {
            let mut conn = self.pool.acquire().await?;
            conn.ping().await?;
            Ok(())
        })
    }
}

/// These tests need a live server: set `TALLY_TEST_DATABASE_URL` and run
/// with `--ignored`. Each test works on its own metric names.
#[cfg(test)]
mod tests {
    use super::*;

    async fn connect() -> PgStorage {
        let dsn = std::env::var("TALLY_TEST_DATABASE_URL")
            .expect("TALLY_TEST_DATABASE_URL must be set for postgres tests");
        PgStorage::connect(&dsn, Duration::from_secs(5)).await.unwrap()
    }

    fn unique(prefix: &str) -> String {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        format!("{prefix}-{nanos}")
    }

    #[tokio::test]
    #[ignore]
    async fn gauge_upsert_replaces() {
        let store = connect().await;
        let name = unique("gauge");
        store.set_gauge(&name, 1.5).await.unwrap();
        store.set_gauge(&name, 2.5).await.unwrap();
        assert_eq!(store.get_gauge(&name).await.unwrap(), Some(2.5));
    }

    #[tokio::test]
    #[ignore]
    async fn counter_upsert_accumulates() {
        let store = connect().await;
        let name = unique("counter");
        assert_eq!(store.add_counter(&name, 5).await.unwrap(), 5);
        assert_eq!(store.add_counter(&name, -2).await.unwrap(), 3);
        assert_eq!(store.get_counter(&name).await.unwrap(), Some(3));
    }

    #[tokio::test]
    #[ignore]
    async fn missing_rows_are_absent() {
        let store = connect().await;
        assert_eq!(store.get_gauge(&unique("none")).await.unwrap(), None);
        assert_eq!(store.get_counter(&unique("none")).await.unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ignore]
    async fn concurrent_upserts_are_not_lost() {
        let store = connect().await;
        let name = unique("hits");
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            let name = name.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..25 {
                    store.add_counter(&name, 1).await.unwrap();
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(store.get_counter(&name).await.unwrap(), Some(200));
    }

    #[tokio::test]
    #[ignore]
    async fn ping_succeeds_on_live_pool() {
        let store = connect().await;
        store.ping().await.unwrap();
        store.close().await;
    }
}
