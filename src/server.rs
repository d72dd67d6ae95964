//! HTTP API server.
//!
//! Exposes the analysis engine to the (external) web front end as a JSON
//! API. The front end authenticates its users itself and forwards the
//! already-authenticated principal with each request; this layer validates
//! the request shape and leaves authorization to the engine's scope guard.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/analyze` | Analyze a batch of texts under a scope |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! All error responses carry a machine-readable kind and a human-readable
//! detail string:
//!
//! ```json
//! { "error": "access_denied", "details": "access denied for scope 'abc'" }
//! ```
//!
//! Kinds: `bad_request` (400), `access_denied` (403), `analysis_failed`
//! (502), `persistence_failed` (500), `store_unavailable` (500).

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::engine::AnalysisEngine;
use crate::error::EngineError;
use crate::models::BatchResult;

#[derive(Clone)]
struct AppState {
    engine: Arc<AnalysisEngine>,
}

/// Starts the HTTP server on `bind` and runs until the process terminates.
pub async fn run_server(bind: &str, engine: Arc<AnalysisEngine>) -> anyhow::Result<()> {
    let app = router(engine);

    println!("Analysis API listening on http://{}", bind);

    let listener = tokio::net::TcpListener::bind(bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Builds the application router; separated from [`run_server`] so tests can
/// drive the handlers without binding a socket.
pub fn router(engine: Arc<AnalysisEngine>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/analyze", post(handle_analyze))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(AppState { engine })
}

// ============ Error response ============

/// JSON error body: `{ "error": <kind>, "details": <message> }`.
#[derive(Serialize)]
struct ErrorBody {
    error: String,
    details: String,
}

struct AppError {
    status: StatusCode,
    error: String,
    details: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.error,
            details: self.details,
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(details: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        error: "bad_request".to_string(),
        details: details.into(),
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        let status = match &err {
            EngineError::AccessDenied { .. } => StatusCode::FORBIDDEN,
            EngineError::AnalysisFailed(_) => StatusCode::BAD_GATEWAY,
            EngineError::PersistenceFailed(_) | EngineError::Store(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        AppError {
            status,
            error: err.kind().to_string(),
            details: err.to_string(),
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /analyze ============

#[derive(Deserialize)]
struct AnalyzeRequest {
    scope: String,
    principal: String,
    texts: Vec<String>,
}

async fn handle_analyze(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Json<BatchResult>, AppError> {
    if request.scope.trim().is_empty() {
        return Err(bad_request("scope must not be empty"));
    }
    if request.principal.trim().is_empty() {
        return Err(bad_request("principal must not be empty"));
    }
    if request.texts.is_empty() {
        return Err(bad_request("texts must contain at least one item"));
    }

    let result = state
        .engine
        .analyze_batch(&request.scope, &request.principal, &request.texts)
        .await?;

    Ok(Json(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;

    #[test]
    fn engine_errors_map_to_documented_statuses() {
        let denied: AppError = EngineError::AccessDenied {
            scope: "s".to_string(),
        }
        .into();
        assert_eq!(denied.status, StatusCode::FORBIDDEN);
        assert_eq!(denied.error, "access_denied");

        let failed: AppError = EngineError::AnalysisFailed("boom".to_string()).into();
        assert_eq!(failed.status, StatusCode::BAD_GATEWAY);
        assert_eq!(failed.error, "analysis_failed");

        let persist: AppError =
            EngineError::PersistenceFailed(StoreError::Query(sqlx::Error::RowNotFound)).into();
        assert_eq!(persist.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(persist.error, "persistence_failed");

        let store: AppError =
            EngineError::Store(StoreError::Query(sqlx::Error::PoolClosed)).into();
        assert_eq!(store.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(store.error, "store_unavailable");
    }

    #[test]
    fn error_body_shape() {
        let err: AppError = EngineError::AccessDenied {
            scope: "abc".to_string(),
        }
        .into();
        let body = serde_json::to_value(ErrorBody {
            error: err.error,
            details: err.details,
        })
        .unwrap();
        assert_eq!(body["error"], "access_denied");
        assert!(body["details"].as_str().unwrap().contains("abc"));
    }
}
