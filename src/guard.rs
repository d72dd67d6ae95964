//! Scenario-scoped access guard.
//!
//! Every batch request passes through [`assert_ownership`] before any cache
//! or analyzer activity. The check fails closed: a missing scope row, an
//! owner mismatch, or a store failure all deny access — nothing short of a
//! confirmed ownership row allows the request through.

use tracing::warn;

use crate::error::EngineError;
use crate::executor::QueryExecutor;

pub async fn assert_ownership(
    executor: &QueryExecutor,
    scope_id: &str,
    principal: &str,
) -> Result<(), EngineError> {
    let scope = scope_id.to_string();
    let owner: Result<Option<String>, _> = executor
        .execute(move |pool| {
            let scope = scope.clone();
            async move {
                sqlx::query_scalar("SELECT owner FROM scopes WHERE id = ?")
                    .bind(&scope)
                    .fetch_optional(&pool)
                    .await
            }
        })
        .await;

    match owner {
        Ok(Some(owner)) if owner == principal => Ok(()),
        Ok(_) => Err(EngineError::AccessDenied {
            scope: scope_id.to_string(),
        }),
        Err(err) => {
            warn!(scope = scope_id, error = %err, "ownership lookup failed; denying access");
            Err(EngineError::AccessDenied {
                scope: scope_id.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DbConfig;
    use crate::db::StoreHandle;
    use crate::migrate;
    use crate::store::insert_scope;

    async fn test_store() -> (tempfile::TempDir, QueryExecutor, String) {
        let dir = tempfile::tempdir().unwrap();
        let config = DbConfig {
            path: dir.path().join("senti.sqlite"),
            max_connections: 2,
            acquire_timeout_secs: 5,
            max_retries: 3,
            retry_base_ms: 1,
        };
        let store = StoreHandle::connect(&config).await.unwrap();
        migrate::run_migrations(&store).await.unwrap();
        let executor = QueryExecutor::new(store, &config);
        let scope = insert_scope(&executor, "reviews", "alice").await.unwrap();
        (dir, executor, scope.id)
    }

    #[tokio::test]
    async fn owner_is_allowed() {
        let (_dir, executor, scope) = test_store().await;
        assert!(assert_ownership(&executor, &scope, "alice").await.is_ok());
    }

    #[tokio::test]
    async fn non_owner_is_denied() {
        let (_dir, executor, scope) = test_store().await;
        let err = assert_ownership(&executor, &scope, "mallory")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::AccessDenied { .. }));
    }

    #[tokio::test]
    async fn unknown_scope_is_denied() {
        let (_dir, executor, _scope) = test_store().await;
        let err = assert_ownership(&executor, "missing", "alice")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::AccessDenied { .. }));
    }
}
