//! Resilient query executor.
//!
//! Every store access goes through [`QueryExecutor::execute`], which re-runs
//! the operation against a freshly rebuilt pool when the failure class is
//! transient (connection/io errors, pool acquire timeouts, a closed pool,
//! SQLite busy/locked). Non-transient errors — constraint violations, decode
//! failures, missing rows — surface immediately without a retry.
//!
//! The operation closure receives its own pool clone per attempt and must
//! issue any multi-statement transaction entirely within one invocation, on
//! one checked-out connection. A failed transaction therefore rolls back and
//! is retried only as a whole unit; the executor never replays individual
//! statements inside it.

use std::future::Future;
use std::time::Duration;

use sqlx::SqlitePool;
use tracing::{debug, warn};

use crate::config::DbConfig;
use crate::db::StoreHandle;
use crate::error::StoreError;

#[derive(Clone)]
pub struct QueryExecutor {
    store: StoreHandle,
    max_retries: u32,
    retry_base: Duration,
}

impl QueryExecutor {
    pub fn new(store: StoreHandle, config: &DbConfig) -> Self {
        Self::with_policy(
            store,
            config.max_retries,
            Duration::from_millis(config.retry_base_ms),
        )
    }

    pub fn with_policy(store: StoreHandle, max_retries: u32, retry_base: Duration) -> Self {
        Self {
            store,
            max_retries,
            retry_base,
        }
    }

    pub fn store(&self) -> &StoreHandle {
        &self.store
    }

    /// Run `op` with retry on transient failure.
    ///
    /// Backoff grows linearly with the attempt number (`base * attempt`).
    /// Before each retry the pool is discarded and reconnected; if even the
    /// reconnect fails, the retry proceeds against the old pool and the next
    /// failure consumes another attempt.
    pub async fn execute<T, F, Fut>(&self, op: F) -> Result<T, StoreError>
    where
        F: Fn(SqlitePool) -> Fut,
        Fut: Future<Output = Result<T, sqlx::Error>>,
    {
        let mut failures = 0u32;
        loop {
            let pool = self.store.pool().await;
            match op(pool).await {
                Ok(value) => return Ok(value),
                Err(err) if is_transient(&err) => {
                    failures += 1;
                    if failures > self.max_retries {
                        return Err(StoreError::Exhausted {
                            attempts: failures,
                            source: err,
                        });
                    }
                    warn!(
                        attempt = failures,
                        max_retries = self.max_retries,
                        error = %err,
                        "transient store failure; resetting pool and retrying"
                    );
                    if let Err(reset_err) = self.store.reset().await {
                        debug!(error = %reset_err, "pool reset failed; retrying on existing pool");
                    }
                    tokio::time::sleep(self.retry_base * failures).await;
                }
                Err(err) => return Err(StoreError::Query(err)),
            }
        }
    }
}

/// Whether a store failure is worth a pool reset and retry.
fn is_transient(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed => true,
        sqlx::Error::Database(db) => {
            let msg = db.message();
            msg.contains("database is locked")
                || msg.contains("database table is locked")
                || msg.contains("busy")
        }
        _ => false,
    }
}
