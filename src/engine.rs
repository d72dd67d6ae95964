//! Batch merge and aggregation engine.
//!
//! Orchestrates one analysis request end to end: authorize the principal,
//! resolve the batch against the cache, call the external analyzer once for
//! the unique misses, persist the fresh results in a single transaction,
//! re-interleave cached and fresh records into the caller's original order,
//! and compute the aggregate statistics.
//!
//! A fully cached batch performs zero analyzer calls — that is the engine's
//! primary cost guarantee. The second guarantee is ordering: the per-item
//! result list always matches the input order, so a caller can never tell
//! hits from misses by position. There is no partial success: any step's
//! failure fails the whole request and nothing half-finished is returned or
//! persisted.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::analyzer::Analyzer;
use crate::cache;
use crate::config::CacheConfig;
use crate::error::EngineError;
use crate::executor::QueryExecutor;
use crate::fingerprint::fingerprint;
use crate::guard;
use crate::models::{AnalysisRecord, BatchResult, ItemAnalysis, ThemeSummary};
use crate::store::{self, BatchEntry};

pub struct AnalysisEngine {
    executor: QueryExecutor,
    analyzer: Arc<dyn Analyzer>,
    ttl_seconds: i64,
}

impl AnalysisEngine {
    pub fn new(executor: QueryExecutor, analyzer: Arc<dyn Analyzer>, cache: &CacheConfig) -> Self {
        Self {
            executor,
            analyzer,
            ttl_seconds: cache.ttl_days * 86_400,
        }
    }

    pub fn executor(&self) -> &QueryExecutor {
        &self.executor
    }

    /// Analyze a batch of texts under `scope_id` on behalf of `principal`.
    pub async fn analyze_batch(
        &self,
        scope_id: &str,
        principal: &str,
        texts: &[String],
    ) -> Result<BatchResult, EngineError> {
        guard::assert_ownership(&self.executor, scope_id, principal).await?;

        let fingerprints: Vec<String> = texts.iter().map(|t| fingerprint(t)).collect();
        let cached = cache::resolve_batch(&self.executor, scope_id, texts).await;

        // Unique misses in first-occurrence order: duplicate texts inside one
        // batch are analyzed at most once.
        let mut seen = HashSet::new();
        let mut misses: Vec<(String, String)> = Vec::new();
        for (index, slot) in cached.iter().enumerate() {
            if slot.is_none() && seen.insert(fingerprints[index].clone()) {
                misses.push((fingerprints[index].clone(), texts[index].clone()));
            }
        }

        let mut fresh: HashMap<String, AnalysisRecord> = HashMap::new();
        let mut themes: Option<Vec<ThemeSummary>> = None;

        if !misses.is_empty() {
            // One analyzer call per batch. No DB connection is held here —
            // the executor checks connections out per operation, and the
            // analyzer's latency is unbounded relative to store work.
            let miss_texts: Vec<String> = misses.iter().map(|(_, text)| text.clone()).collect();
            debug!(
                scope = scope_id,
                total = texts.len(),
                misses = miss_texts.len(),
                analyzer = self.analyzer.name(),
                "calling analyzer for cache misses"
            );

            let response = self
                .analyzer
                .analyze(&miss_texts)
                .await
                .map_err(|e| EngineError::AnalysisFailed(e.to_string()))?;

            if response.analyses.len() != miss_texts.len() {
                return Err(EngineError::AnalysisFailed(format!(
                    "analyzer returned {} results for {} texts",
                    response.analyses.len(),
                    miss_texts.len()
                )));
            }

            let now = Utc::now().timestamp();
            let expires_at = now + self.ttl_seconds;

            let mut entries = Vec::with_capacity(misses.len());
            for ((fp, text), analysis) in misses.iter().zip(response.analyses) {
                let record = record_from_analysis(fp, scope_id, analysis, now, expires_at);
                entries.push(BatchEntry {
                    content: text.clone(),
                    record: record.clone(),
                });
                fresh.insert(fp.clone(), record);
            }

            // Fail closed: results that cannot be persisted are never
            // returned, so the cache and responses cannot disagree.
            store::insert_batch(&self.executor, &entries)
                .await
                .map_err(EngineError::PersistenceFailed)?;

            themes = response.themes;
        } else if !texts.is_empty() {
            info!(scope = scope_id, total = texts.len(), "batch fully cached; skipping analyzer");
        }

        // Re-interleave: cached record where present, fresh record otherwise.
        let mut merged = Vec::with_capacity(texts.len());
        for (index, slot) in cached.into_iter().enumerate() {
            let record = match slot {
                Some(record) => record,
                None => fresh
                    .get(&fingerprints[index])
                    .cloned()
                    .ok_or_else(|| {
                        EngineError::AnalysisFailed(format!(
                            "no analysis produced for input {}",
                            index
                        ))
                    })?,
            };
            merged.push(record);
        }

        Ok(aggregate(merged, themes))
    }
}

fn record_from_analysis(
    fingerprint: &str,
    scope_id: &str,
    analysis: ItemAnalysis,
    created_at: i64,
    expires_at: i64,
) -> AnalysisRecord {
    AnalysisRecord {
        fingerprint: fingerprint.to_string(),
        scope_id: scope_id.to_string(),
        sentiment: analysis.sentiment,
        confidence: analysis.confidence,
        confidence_distribution: analysis.confidence_distribution,
        translation: analysis.translation,
        highlights: analysis.highlights,
        translated_highlights: analysis.translated_highlights,
        reasoning: analysis.reasoning,
        brief: analysis.brief,
        reply_suggestion: analysis.reply_suggestion,
        created_at,
        expires_at,
    }
}

/// Roll the merged record list up into the request-scoped aggregate.
fn aggregate(records: Vec<AnalysisRecord>, themes: Option<Vec<ThemeSummary>>) -> BatchResult {
    let mut distribution: BTreeMap<String, u64> = BTreeMap::new();
    let mut confidence_sum = 0.0;
    for record in &records {
        *distribution.entry(record.sentiment.clone()).or_insert(0) += 1;
        confidence_sum += record.confidence;
    }

    let mean_confidence = if records.is_empty() {
        0.0
    } else {
        confidence_sum / records.len() as f64
    };

    BatchResult {
        total_items: records.len(),
        sentiment_distribution: distribution,
        mean_confidence,
        themes,
        individual_results: records,
    }
}
