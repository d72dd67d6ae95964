//! Core data models used throughout the analysis engine.
//!
//! These types represent the analyzer outputs, cached records, and aggregate
//! results that flow through the cache-resolution and merge pipeline.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The persisted outcome of analyzing one text item.
///
/// Records are insert-only: once written they are never mutated. A record is
/// "live" for lookups until its `expires_at` timestamp passes, after which a
/// new request for the same content produces a fresh record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRecord {
    /// SHA-256 hex digest of the exact source text.
    pub fingerprint: String,
    /// Owning scope (scenario) — partitions the cache namespace.
    pub scope_id: String,
    /// Sentiment label (e.g. `"positive"`). Open set; whatever the analyzer emits.
    pub sentiment: String,
    /// Confidence for the chosen label, in `[0, 1]`.
    pub confidence: f64,
    /// Probability per candidate label. Usually sums to ~1 but is not required to.
    #[serde(default)]
    pub confidence_distribution: BTreeMap<String, f64>,
    /// Translation of the source text, when the analyzer produced one.
    pub translation: Option<String>,
    /// Original-language highlight substrings, keyed by sentiment label.
    #[serde(default)]
    pub highlights: BTreeMap<String, Vec<String>>,
    /// Translated-language highlight substrings, keyed by sentiment label.
    #[serde(default)]
    pub translated_highlights: BTreeMap<String, Vec<String>>,
    /// Free-text reasoning for the classification.
    pub reasoning: Option<String>,
    /// One-line summary of the item.
    pub brief: Option<String>,
    /// Suggested reply to the item's author, when applicable.
    pub reply_suggestion: Option<String>,
    /// Unix seconds at which the record was created.
    pub created_at: i64,
    /// Unix seconds after which lookups ignore this record.
    pub expires_at: i64,
}

impl AnalysisRecord {
    /// Whether this record is still consulted by lookups at time `now`.
    pub fn is_live(&self, now: i64) -> bool {
        self.expires_at > now
    }
}

/// Per-item output of the external analyzer, validated at the boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemAnalysis {
    pub sentiment: String,
    pub confidence: f64,
    #[serde(default)]
    pub confidence_distribution: BTreeMap<String, f64>,
    #[serde(default)]
    pub translation: Option<String>,
    #[serde(default)]
    pub highlights: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub translated_highlights: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub reasoning: Option<String>,
    #[serde(default)]
    pub brief: Option<String>,
    #[serde(default)]
    pub reply_suggestion: Option<String>,
}

/// A recurring theme reported by the analyzer across a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThemeSummary {
    pub theme: String,
    pub count: u64,
    pub sentiment: String,
}

/// Full response of one external analyzer call.
///
/// `analyses` is index-parallel to the submitted texts; the engine rejects
/// responses whose length does not match the request.
#[derive(Debug, Clone)]
pub struct AnalyzerResponse {
    pub analyses: Vec<ItemAnalysis>,
    pub themes: Option<Vec<ThemeSummary>>,
}

/// Ephemeral per-request aggregate over a merged batch.
///
/// Never persisted as a unit; reconstructed per request from the underlying
/// analysis records. `individual_results` always matches the input order of
/// the submitted texts, regardless of which items were cache hits.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    pub total_items: usize,
    /// Observed sentiment label → number of items in the batch.
    pub sentiment_distribution: BTreeMap<String, u64>,
    /// Mean confidence across the batch. Derived, not stored.
    pub mean_confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub themes: Option<Vec<ThemeSummary>>,
    pub individual_results: Vec<AnalysisRecord>,
}
