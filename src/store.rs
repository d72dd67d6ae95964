//! Persistent store operations.
//!
//! Two append-only relations back the cache: `items` (one row per unique
//! text per scope, keyed by `(fingerprint, scope_id)`) and `analyses` (the
//! insert-only analysis log referencing `items`). Every operation here runs
//! through the [`QueryExecutor`](crate::executor::QueryExecutor); transactions
//! are issued inside a single executor closure so they retry only as a whole
//! unit.

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use crate::error::StoreError;
use crate::executor::QueryExecutor;
use crate::models::AnalysisRecord;

/// One unit of work for [`insert_batch`]: the raw text plus the analysis
/// record computed for it.
#[derive(Debug, Clone)]
pub struct BatchEntry {
    pub content: String,
    pub record: AnalysisRecord,
}

/// A scenario row: the authorization boundary and cache namespace.
#[derive(Debug, Clone)]
pub struct Scope {
    pub id: String,
    pub name: String,
    pub owner: String,
    pub created_at: i64,
}

/// Fetch the live analysis for `(fingerprint, scope)`.
///
/// Returns the most recently created record whose expiry lies in the future,
/// or `None` — a miss is an expected outcome here, not an error. Older and
/// expired records stay in the table and are simply skipped.
pub async fn lookup(
    executor: &QueryExecutor,
    fingerprint: &str,
    scope_id: &str,
) -> Result<Option<AnalysisRecord>, StoreError> {
    let now = Utc::now().timestamp();
    let fingerprint = fingerprint.to_string();
    let scope_id = scope_id.to_string();

    let row = executor
        .execute(move |pool| {
            let fingerprint = fingerprint.clone();
            let scope_id = scope_id.clone();
            async move {
                sqlx::query(
                    r#"
                    SELECT i.fingerprint, a.scope_id, a.sentiment, a.confidence,
                           a.confidence_distribution, a.translation, a.highlights,
                           a.translated_highlights, a.reasoning, a.brief,
                           a.reply_suggestion, a.created_at, a.expires_at
                    FROM analyses a
                    JOIN items i ON i.id = a.item_id
                    WHERE i.fingerprint = ? AND i.scope_id = ? AND a.expires_at > ?
                    ORDER BY a.created_at DESC, a.rowid DESC
                    LIMIT 1
                    "#,
                )
                .bind(&fingerprint)
                .bind(&scope_id)
                .bind(now)
                .fetch_optional(&pool)
                .await
            }
        })
        .await?;

    Ok(row.map(record_from_row))
}

/// Persist a batch of fresh analyses in one transaction.
///
/// Per entry: reuse the existing `items` row for `(fingerprint, scope)` or
/// insert a new one, then insert the linked analysis row. All-or-nothing —
/// any failure rolls the entire batch back and surfaces a single error, so a
/// partially persisted batch is never visible.
pub async fn insert_batch(
    executor: &QueryExecutor,
    entries: &[BatchEntry],
) -> Result<(), StoreError> {
    if entries.is_empty() {
        return Ok(());
    }
    let entries = entries.to_vec();

    executor
        .execute(move |pool| {
            let entries = entries.clone();
            async move {
                let mut tx = pool.begin().await?;

                for entry in &entries {
                    let record = &entry.record;

                    let existing: Option<String> = sqlx::query_scalar(
                        "SELECT id FROM items WHERE fingerprint = ? AND scope_id = ?",
                    )
                    .bind(&record.fingerprint)
                    .bind(&record.scope_id)
                    .fetch_optional(&mut *tx)
                    .await?;

                    let item_id = match existing {
                        Some(id) => id,
                        None => {
                            let id = Uuid::new_v4().to_string();
                            sqlx::query(
                                "INSERT INTO items (id, scope_id, content, fingerprint, created_at) \
                                 VALUES (?, ?, ?, ?, ?)",
                            )
                            .bind(&id)
                            .bind(&record.scope_id)
                            .bind(&entry.content)
                            .bind(&record.fingerprint)
                            .bind(record.created_at)
                            .execute(&mut *tx)
                            .await?;
                            id
                        }
                    };

                    sqlx::query(
                        r#"
                        INSERT INTO analyses (id, item_id, scope_id, sentiment, confidence,
                            confidence_distribution, translation, highlights,
                            translated_highlights, reasoning, brief, reply_suggestion,
                            expires_at, created_at)
                        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                        "#,
                    )
                    .bind(Uuid::new_v4().to_string())
                    .bind(&item_id)
                    .bind(&record.scope_id)
                    .bind(&record.sentiment)
                    .bind(record.confidence)
                    .bind(json_text(&record.confidence_distribution))
                    .bind(&record.translation)
                    .bind(json_text(&record.highlights))
                    .bind(json_text(&record.translated_highlights))
                    .bind(&record.reasoning)
                    .bind(&record.brief)
                    .bind(&record.reply_suggestion)
                    .bind(record.expires_at)
                    .bind(record.created_at)
                    .execute(&mut *tx)
                    .await?;
                }

                tx.commit().await?;
                Ok(())
            }
        })
        .await
}

/// Explicitly delete a scope's cached analyses and items.
///
/// The only deletion path over the cache tables; used by `senti scope clear`.
/// Returns `(analyses_deleted, items_deleted)`.
pub async fn clear_scope(
    executor: &QueryExecutor,
    scope_id: &str,
) -> Result<(u64, u64), StoreError> {
    let scope_id = scope_id.to_string();

    executor
        .execute(move |pool| {
            let scope_id = scope_id.clone();
            async move {
                let mut tx = pool.begin().await?;
                let analyses = sqlx::query("DELETE FROM analyses WHERE scope_id = ?")
                    .bind(&scope_id)
                    .execute(&mut *tx)
                    .await?
                    .rows_affected();
                let items = sqlx::query("DELETE FROM items WHERE scope_id = ?")
                    .bind(&scope_id)
                    .execute(&mut *tx)
                    .await?
                    .rows_affected();
                tx.commit().await?;
                Ok((analyses, items))
            }
        })
        .await
}

pub async fn insert_scope(
    executor: &QueryExecutor,
    name: &str,
    owner: &str,
) -> Result<Scope, StoreError> {
    let scope = Scope {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        owner: owner.to_string(),
        created_at: Utc::now().timestamp(),
    };

    let inserted = scope.clone();
    executor
        .execute(move |pool| {
            let scope = inserted.clone();
            async move {
                sqlx::query("INSERT INTO scopes (id, name, owner, created_at) VALUES (?, ?, ?, ?)")
                    .bind(&scope.id)
                    .bind(&scope.name)
                    .bind(&scope.owner)
                    .bind(scope.created_at)
                    .execute(&pool)
                    .await?;
                Ok(())
            }
        })
        .await?;

    Ok(scope)
}

pub async fn list_scopes(executor: &QueryExecutor) -> Result<Vec<Scope>, StoreError> {
    let rows = executor
        .execute(|pool| async move {
            sqlx::query("SELECT id, name, owner, created_at FROM scopes ORDER BY created_at ASC")
                .fetch_all(&pool)
                .await
        })
        .await?;

    Ok(rows
        .iter()
        .map(|row| Scope {
            id: row.get("id"),
            name: row.get("name"),
            owner: row.get("owner"),
            created_at: row.get("created_at"),
        })
        .collect())
}

/// Total `(items, analyses)` row counts, for `senti cache stats`.
pub async fn cache_stats(executor: &QueryExecutor) -> Result<(i64, i64), StoreError> {
    executor
        .execute(|pool| async move {
            let items: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM items")
                .fetch_one(&pool)
                .await?;
            let analyses: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM analyses")
                .fetch_one(&pool)
                .await?;
            Ok((items, analyses))
        })
        .await
}

fn record_from_row(row: SqliteRow) -> AnalysisRecord {
    let confidence_distribution: String = row.get("confidence_distribution");
    let highlights: String = row.get("highlights");
    let translated_highlights: String = row.get("translated_highlights");

    AnalysisRecord {
        fingerprint: row.get("fingerprint"),
        scope_id: row.get("scope_id"),
        sentiment: row.get("sentiment"),
        confidence: row.get("confidence"),
        confidence_distribution: serde_json::from_str(&confidence_distribution)
            .unwrap_or_default(),
        translation: row.get("translation"),
        highlights: serde_json::from_str(&highlights).unwrap_or_default(),
        translated_highlights: serde_json::from_str(&translated_highlights).unwrap_or_default(),
        reasoning: row.get("reasoning"),
        brief: row.get("brief"),
        reply_suggestion: row.get("reply_suggestion"),
        created_at: row.get("created_at"),
        expires_at: row.get("expires_at"),
    }
}

fn json_text<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
}
