//! Error taxonomy for the analysis engine.
//!
//! Lookup misses are not errors — they are `Option::None` and are recovered
//! locally as cache misses. Transient store failures are retried inside the
//! query executor and only become visible as [`StoreError::Exhausted`] once
//! the retry budget is spent. Every other kind propagates to the request
//! boundary unchanged, carrying a machine-readable kind and a human-readable
//! detail string.

use thiserror::Error;

/// Failure of a store operation, after the executor's retry policy ran.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Non-transient database failure (constraint violation, decode, ...),
    /// surfaced on first occurrence without retry.
    #[error("query failed: {0}")]
    Query(#[from] sqlx::Error),

    /// A transient failure persisted through every retry attempt.
    #[error("query failed after {attempts} attempts: {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: sqlx::Error,
    },
}

/// Failure of one batch analysis request.
///
/// There is no partial-success variant: a failed batch returns exactly one
/// of these kinds and no results.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The requesting principal does not own the scope. Never retried.
    #[error("access denied for scope '{scope}'")]
    AccessDenied { scope: String },

    /// The external analyzer failed or returned a malformed response.
    /// Nothing was persisted and nothing is returned.
    #[error("analyzer request failed: {0}")]
    AnalysisFailed(String),

    /// The transactional write of fresh results failed after a successful
    /// analyzer call. The unpersisted results are discarded rather than
    /// returned, so the cache and responses can never disagree.
    #[error("failed to persist batch: {0}")]
    PersistenceFailed(#[source] StoreError),

    /// A store failure outside the persistence step (guard lookup, retry
    /// budget exhausted).
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EngineError {
    /// Machine-readable kind, used as the `error` field on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::AccessDenied { .. } => "access_denied",
            EngineError::AnalysisFailed(_) => "analysis_failed",
            EngineError::PersistenceFailed(_) => "persistence_failed",
            EngineError::Store(_) => "store_unavailable",
        }
    }
}
