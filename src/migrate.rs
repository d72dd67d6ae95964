use anyhow::Result;

use crate::db::StoreHandle;

/// Create the schema. Idempotent — safe to run repeatedly.
///
/// `items` and `analyses` form an insert-only log: the core never updates or
/// deletes rows in either table. Superseded and expired analyses are simply
/// ignored by lookups. Deletion happens only through the explicit
/// scope-clearing operation.
pub async fn run_migrations(store: &StoreHandle) -> Result<()> {
    let pool = store.pool().await;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS scopes (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            owner TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS items (
            id TEXT PRIMARY KEY,
            scope_id TEXT NOT NULL,
            content TEXT NOT NULL,
            fingerprint TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            UNIQUE(fingerprint, scope_id),
            FOREIGN KEY (scope_id) REFERENCES scopes(id)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS analyses (
            id TEXT PRIMARY KEY,
            item_id TEXT NOT NULL,
            scope_id TEXT NOT NULL,
            sentiment TEXT NOT NULL,
            confidence REAL NOT NULL,
            confidence_distribution TEXT NOT NULL DEFAULT '{}',
            translation TEXT,
            highlights TEXT NOT NULL DEFAULT '{}',
            translated_highlights TEXT NOT NULL DEFAULT '{}',
            reasoning TEXT,
            brief TEXT,
            reply_suggestion TEXT,
            expires_at INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            FOREIGN KEY (item_id) REFERENCES items(id)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_items_fingerprint_scope ON items(fingerprint, scope_id)",
    )
    .execute(&pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_analyses_item_created ON analyses(item_id, created_at DESC)",
    )
    .execute(&pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_analyses_scope ON analyses(scope_id)")
        .execute(&pool)
        .await?;

    Ok(())
}
