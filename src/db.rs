//! Database connection handle.
//!
//! [`StoreHandle`] owns the SQLite connection pool explicitly — it is passed
//! through constructors rather than living in a module-level singleton, so
//! tests can substitute a handle over a temp-file database. The handle is
//! cheap to clone and can discard-and-rebuild its pool via [`StoreHandle::reset`],
//! which the query executor uses to recover from connection-class failures.

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::config::DbConfig;

#[derive(Clone)]
pub struct StoreHandle {
    pool: Arc<RwLock<SqlitePool>>,
    options: SqliteConnectOptions,
    max_connections: u32,
    acquire_timeout: Duration,
}

impl StoreHandle {
    /// Open the database, creating the file and parent directories if needed.
    pub async fn connect(config: &DbConfig) -> Result<Self> {
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", config.path.display()))?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let max_connections = config.max_connections;
        let acquire_timeout = Duration::from_secs(config.acquire_timeout_secs);

        let pool = open_pool(&options, max_connections, acquire_timeout).await?;

        Ok(Self {
            pool: Arc::new(RwLock::new(pool)),
            options,
            max_connections,
            acquire_timeout,
        })
    }

    /// Current pool. Pools are internally reference-counted, so the clone is
    /// cheap and remains usable even if `reset` swaps in a fresh pool later.
    pub async fn pool(&self) -> SqlitePool {
        self.pool.read().await.clone()
    }

    /// Discard the current pool and reconnect with identical options.
    ///
    /// Called by the query executor after a transient failure; in-flight
    /// operations on the old pool drain against the closed pool and fail,
    /// which the executor also classifies as transient.
    pub async fn reset(&self) -> Result<(), sqlx::Error> {
        let fresh = open_pool(&self.options, self.max_connections, self.acquire_timeout).await?;
        let mut guard = self.pool.write().await;
        let old = std::mem::replace(&mut *guard, fresh);
        old.close().await;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.read().await.close().await;
    }
}

async fn open_pool(
    options: &SqliteConnectOptions,
    max_connections: u32,
    acquire_timeout: Duration,
) -> Result<SqlitePool, sqlx::Error> {
    SqlitePoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(acquire_timeout)
        .connect_with(options.clone())
        .await
}
