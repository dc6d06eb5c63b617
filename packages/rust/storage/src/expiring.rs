//! libSQL-backed dedup store with per-id expiry.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use libsql::{Connection, Database, params};
use postrelay_shared::{PostRelayError, Result};

use crate::DedupStore;
use crate::migrations;

/// Admits between two purges of expired rows.
pub const DEFAULT_PURGE_EVERY: u64 = 100;

/// Durable dedup handle. Survives restarts; ids expire after `ttl`.
///
/// Expired rows are purged when the store opens and then every
/// `purge_every` admits, so the table stays bounded by the ids seen within
/// one retention window.
pub struct ExpiringStore {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    ttl: Duration,
    purge_every: u64,
    admits: AtomicU64,
}

impl ExpiringStore {
    /// Open or create the database at `path` and apply migrations.
    pub async fn open(path: &Path, ttl: Duration) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PostRelayError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| PostRelayError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| PostRelayError::Storage(e.to_string()))?;

        let store = Self {
            db,
            conn,
            ttl,
            purge_every: DEFAULT_PURGE_EVERY,
            admits: AtomicU64::new(0),
        };
        store.run_migrations().await?;
        store.purge_and_log().await;
        Ok(store)
    }

    /// Purge expired rows every `n` admits instead of the default.
    pub fn with_purge_every(mut self, n: u64) -> Self {
        self.purge_every = n.max(1);
        self
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        PostRelayError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Record `article_id` unless a live row already exists.
    ///
    /// A single upsert keeps this atomic: the row is inserted, or an expired
    /// row is refreshed, or nothing changes. One changed row means admitted.
    pub async fn try_admit(&self, article_id: &str) -> Result<bool> {
        let now = Utc::now().timestamp_millis();
        let ttl_ms = i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX);
        let expires = now.saturating_add(ttl_ms);

        let changed = self
            .conn
            .execute(
                "INSERT INTO processed_articles (article_id, admitted_at, expires_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(article_id) DO UPDATE SET
                    admitted_at = excluded.admitted_at,
                    expires_at = excluded.expires_at
                 WHERE processed_articles.expires_at <= ?2",
                params![article_id, now, expires],
            )
            .await
            .map_err(|e| PostRelayError::Storage(e.to_string()))?;

        Ok(changed == 1)
    }

    /// Delete rows whose retention has elapsed. Returns the number removed.
    pub async fn purge_expired(&self) -> Result<u64> {
        let now = Utc::now().timestamp_millis();
        self.conn
            .execute(
                "DELETE FROM processed_articles WHERE expires_at <= ?1",
                params![now],
            )
            .await
            .map_err(|e| PostRelayError::Storage(e.to_string()))
    }

    async fn purge_and_log(&self) {
        match self.purge_expired().await {
            Ok(0) => {}
            Ok(removed) => tracing::info!(removed, "purged expired dedup entries"),
            Err(e) => tracing::warn!(error = %e, "failed to purge expired dedup entries"),
        }
    }

    /// Number of rows currently stored, live or expired.
    pub async fn count(&self) -> Result<u64> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM processed_articles", params![])
            .await
            .map_err(|e| PostRelayError::Storage(e.to_string()))?;

        match rows
            .next()
            .await
            .map_err(|e| PostRelayError::Storage(e.to_string()))?
        {
            Some(row) => row
                .get::<i64>(0)
                .map(|n| n.max(0) as u64)
                .map_err(|e| PostRelayError::Storage(e.to_string())),
            None => Ok(0),
        }
    }
}

#[async_trait]
impl DedupStore for ExpiringStore {
    async fn admit(&self, article_id: &str) -> bool {
        let seen = self.admits.fetch_add(1, Ordering::Relaxed) + 1;
        if seen % self.purge_every == 0 {
            self.purge_and_log().await;
        }

        match self.try_admit(article_id).await {
            Ok(admitted) => admitted,
            Err(e) => {
                // fail open
                tracing::warn!(article_id, error = %e, "dedup check failed, admitting");
                true
            }
        }
    }

    fn name(&self) -> &'static str {
        "libsql"
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use uuid::Uuid;

    /// Create a temp file store for testing.
    async fn test_store(ttl: Duration) -> ExpiringStore {
        let tmp = std::env::temp_dir().join(format!("pr_test_{}.db", Uuid::now_v7()));
        ExpiringStore::open(&tmp, ttl).await.expect("open test db")
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let store = test_store(Duration::from_secs(3600)).await;
        assert_eq!(store.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("pr_test_{}.db", Uuid::now_v7()));
        let ttl = Duration::from_secs(3600);
        let s1 = ExpiringStore::open(&tmp, ttl).await.expect("first open");
        assert!(s1.try_admit("42").await.expect("admit"));
        drop(s1);

        let s2 = ExpiringStore::open(&tmp, ttl).await.expect("second open");
        assert_eq!(s2.get_schema_version().await, 1);
        // survives the restart
        assert!(!s2.try_admit("42").await.expect("admit"));
    }

    #[tokio::test]
    async fn second_admit_within_ttl_is_rejected() {
        let store = test_store(Duration::from_secs(3600)).await;
        assert!(store.admit("42").await);
        assert!(!store.admit("42").await);
        assert!(store.admit("43").await);
        assert_eq!(store.count().await.expect("count"), 2);
    }

    #[tokio::test]
    async fn expired_id_is_admitted_again() {
        let store = test_store(Duration::ZERO).await;
        assert!(store.admit("42").await);
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(store.admit("42").await);
    }

    #[tokio::test]
    async fn purge_removes_expired_rows() {
        let store = test_store(Duration::ZERO).await;
        store.admit("1").await;
        store.admit("2").await;
        tokio::time::sleep(Duration::from_millis(5)).await;

        let removed = store.purge_expired().await.expect("purge");
        assert_eq!(removed, 2);
        assert_eq!(store.count().await.expect("count"), 0);
    }

    #[tokio::test]
    async fn expired_rows_are_pruned_while_admitting() {
        let store = test_store(Duration::from_millis(1)).await.with_purge_every(3);
        store.admit("1").await;
        store.admit("2").await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        // third admit purges "1" and "2" before recording "3"
        assert!(store.admit("3").await);
        assert_eq!(store.count().await.expect("count"), 1);
    }

    #[tokio::test]
    async fn open_prunes_expired_rows() {
        let tmp = std::env::temp_dir().join(format!("pr_test_{}.db", Uuid::now_v7()));
        let ttl = Duration::from_millis(1);
        let s1 = ExpiringStore::open(&tmp, ttl).await.expect("first open");
        s1.admit("1").await;
        s1.admit("2").await;
        assert_eq!(s1.count().await.expect("count"), 2);
        drop(s1);
        tokio::time::sleep(Duration::from_millis(10)).await;

        let s2 = ExpiringStore::open(&tmp, ttl).await.expect("second open");
        assert_eq!(s2.count().await.expect("count"), 0);
    }

    #[tokio::test]
    async fn concurrent_admits_of_same_id_admit_once() {
        let store = Arc::new(test_store(Duration::from_secs(3600)).await);
        let results = futures::future::join_all((0..8).map(|_| {
            let s = Arc::clone(&store);
            async move { s.admit("77").await }
        }))
        .await;

        assert_eq!(results.iter().filter(|a| **a).count(), 1);
    }
}
