//! Batch cache resolution.
//!
//! For a batch of texts, [`resolve_batch`] returns a fixed-length vector
//! parallel to the input: `Some(record)` where a live cached analysis exists,
//! `None` otherwise. Lookups for the items are independent and run
//! concurrently; results are joined back by input index, so completion order
//! never affects alignment.
//!
//! A lookup failure for one item is logged and collapsed to a miss for that
//! slot only — one bad record can never block the rest of the batch. This is
//! the single place where store errors are swallowed; everywhere else they
//! propagate.

use tokio::task::JoinSet;
use tracing::warn;

use crate::executor::QueryExecutor;
use crate::fingerprint::fingerprint;
use crate::models::AnalysisRecord;
use crate::store;

pub async fn resolve_batch(
    executor: &QueryExecutor,
    scope_id: &str,
    texts: &[String],
) -> Vec<Option<AnalysisRecord>> {
    let mut results: Vec<Option<AnalysisRecord>> = vec![None; texts.len()];
    if texts.is_empty() {
        return results;
    }

    let mut lookups = JoinSet::new();
    for (index, text) in texts.iter().enumerate() {
        let executor = executor.clone();
        let scope_id = scope_id.to_string();
        let fp = fingerprint(text);
        lookups.spawn(async move {
            let outcome = store::lookup(&executor, &fp, &scope_id).await;
            (index, fp, outcome)
        });
    }

    while let Some(joined) = lookups.join_next().await {
        match joined {
            Ok((index, _fp, Ok(hit))) => results[index] = hit,
            Ok((index, fp, Err(err))) => {
                warn!(index, fingerprint = %fp, error = %err, "cache lookup failed; treating as miss");
            }
            Err(err) => {
                warn!(error = %err, "cache lookup task aborted; treating as miss");
            }
        }
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DbConfig;
    use crate::db::StoreHandle;
    use crate::migrate;
    use crate::store::{insert_batch, insert_scope, BatchEntry};
    use chrono::Utc;
    use std::collections::BTreeMap;

    async fn test_store() -> (tempfile::TempDir, QueryExecutor, String) {
        let dir = tempfile::tempdir().unwrap();
        let config = DbConfig {
            path: dir.path().join("senti.sqlite"),
            max_connections: 4,
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

    fn entry(text: &str, scope_id: &str, sentiment: &str) -> BatchEntry {
        let now = Utc::now().timestamp();
        BatchEntry {
            content: text.to_string(),
            record: AnalysisRecord {
                fingerprint: fingerprint(text),
                scope_id: scope_id.to_string(),
                sentiment: sentiment.to_string(),
                confidence: 0.8,
                confidence_distribution: BTreeMap::new(),
                translation: None,
                highlights: BTreeMap::new(),
                translated_highlights: BTreeMap::new(),
                reasoning: None,
                brief: None,
                reply_suggestion: None,
                created_at: now,
                expires_at: now + 86_400,
            },
        }
    }

    #[tokio::test]
    async fn empty_batch_resolves_empty() {
        let (_dir, executor, scope) = test_store().await;
        let resolved = resolve_batch(&executor, &scope, &[]).await;
        assert!(resolved.is_empty());
    }

    #[tokio::test]
    async fn results_align_with_input_indexes() {
        let (_dir, executor, scope) = test_store().await;
        insert_batch(&executor, &[entry("second", &scope, "positive")])
            .await
            .unwrap();

        let texts: Vec<String> = ["first", "second", "third"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let resolved = resolve_batch(&executor, &scope, &texts).await;

        assert_eq!(resolved.len(), 3);
        assert!(resolved[0].is_none());
        assert_eq!(resolved[1].as_ref().unwrap().sentiment, "positive");
        assert!(resolved[2].is_none());
    }

    #[tokio::test]
    async fn lookup_failure_collapses_to_miss() {
        let (_dir, executor, scope) = test_store().await;
        insert_batch(&executor, &[entry("cached text", &scope, "positive")])
            .await
            .unwrap();

        // Break the read path entirely; every lookup now errors.
        executor
            .execute(|pool| async move {
                sqlx::query("DROP TABLE analyses").execute(&pool).await?;
                sqlx::query("DROP TABLE items").execute(&pool).await?;
                Ok(())
            })
            .await
            .unwrap();

        let texts: Vec<String> = ["cached text", "other"].iter().map(|s| s.to_string()).collect();
        let resolved = resolve_batch(&executor, &scope, &texts).await;
        assert_eq!(resolved.len(), 2);
        assert!(
            resolved.iter().all(Option::is_none),
            "failed lookups must resolve as misses, not abort the batch"
        );
    }

    #[tokio::test]
    async fn duplicate_texts_each_resolve() {
        let (_dir, executor, scope) = test_store().await;
        insert_batch(&executor, &[entry("same", &scope, "neutral")])
            .await
            .unwrap();

        let texts: Vec<String> = ["same", "same"].iter().map(|s| s.to_string()).collect();
        let resolved = resolve_batch(&executor, &scope, &texts).await;
        assert!(resolved[0].is_some());
        assert!(resolved[1].is_some());
    }
}
