//! Duplicate suppression for incoming webhook deliveries.
//!
//! A CMS may fire the same "published" hook several times for one article.
//! [`DedupStore::admit`] answers whether a delivery should run the pipeline.
//! Two backing policies share the trait:
//!
//! - [`RecentWindow`]: bounded in-memory window, oldest id evicted first
//! - [`ExpiringStore`]: libSQL table with per-id expiry and atomic set-if-absent
//!
//! When the durable store cannot be opened, [`open_dedup_store`] falls back
//! to [`AlwaysAdmit`] so the service keeps publishing.

mod expiring;
mod migrations;
mod window;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use postrelay_shared::{DedupBackend, DedupConfig, config_dir};

pub use expiring::ExpiringStore;
pub use window::RecentWindow;

/// File name of the durable dedup database under the config directory.
const DEFAULT_DB_FILE: &str = "dedup.db";

/// Admit/reject capability shared by every run.
#[async_trait]
pub trait DedupStore: Send + Sync {
    /// Returns `true` exactly once per id within the retention window and
    /// records the id. Concurrent calls with the same id admit at most one.
    async fn admit(&self, article_id: &str) -> bool;

    /// Short backend name for logs.
    fn name(&self) -> &'static str;
}

/// Degraded mode: every id is admitted.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysAdmit;

#[async_trait]
impl DedupStore for AlwaysAdmit {
    async fn admit(&self, _article_id: &str) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "disabled"
    }
}

/// Build the dedup store selected by `[dedup]`.
///
/// Never fails: an unreachable durable store is logged and replaced by
/// [`AlwaysAdmit`].
pub async fn open_dedup_store(config: &DedupConfig) -> Arc<dyn DedupStore> {
    match config.backend {
        DedupBackend::Memory => Arc::new(RecentWindow::new(config.capacity)),
        DedupBackend::Libsql => {
            let path = match &config.database {
                Some(p) => std::path::PathBuf::from(p),
                None => match config_dir() {
                    Ok(dir) => dir.join(DEFAULT_DB_FILE),
                    Err(e) => {
                        tracing::warn!(error = %e, "dedup database path unavailable, dedup disabled");
                        return Arc::new(AlwaysAdmit);
                    }
                },
            };
            let ttl = Duration::from_secs(config.ttl_hours.saturating_mul(3600));

            match ExpiringStore::open(&path, ttl).await {
                Ok(store) => {
                    tracing::info!(?path, ttl_hours = config.ttl_hours, "dedup store opened");
                    Arc::new(store)
                }
                Err(e) => {
                    tracing::warn!(?path, error = %e, "dedup store unreachable, dedup disabled");
                    Arc::new(AlwaysAdmit)
                }
            }
        }
    }
}
