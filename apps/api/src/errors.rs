use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;

use crate::fetcher::FetchError;
use crate::generation::jd_parser::ExtractionError;
use crate::generation::pipeline::{RunFailure, StageError};
use crate::portfolio::store::PortfolioError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Portfolio error: {0}")]
    Portfolio(#[from] PortfolioError),

    #[error(transparent)]
    Run(#[from] RunFailure),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut extra = serde_json::Map::new();

        let (status, code, message) = match &self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::Extraction(e) => {
                tracing::warn!("Extraction error: {e}");
                extra.insert("details".to_string(), extraction_details(e));
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "EXTRACTION_ERROR",
                    e.to_string(),
                )
            }
            AppError::Portfolio(PortfolioError::InvalidEntry { .. }) => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                self.to_string(),
            ),
            AppError::Portfolio(e) => {
                tracing::error!("Portfolio storage error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STORAGE_ERROR",
                    "A portfolio storage error occurred".to_string(),
                )
            }
            AppError::Run(failure) => {
                extra.insert("stage".to_string(), json!(failure.stage));
                extra.insert("run_id".to_string(), json!(failure.run_id));
                if let StageError::Extraction(e) = &failure.source {
                    extra.insert("details".to_string(), extraction_details(e));
                }
                let (status, code) = run_failure_status(failure);
                let message = match &failure.source {
                    StageError::Storage(PortfolioError::InvalidEntry { .. }) => {
                        failure.source.to_string()
                    }
                    StageError::Storage(_) => {
                        tracing::error!("Run {} storage error: {}", failure.run_id, failure.source);
                        "A portfolio storage error occurred".to_string()
                    }
                    source => source.to_string(),
                };
                (status, code, message)
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let mut error = serde_json::Map::new();
        error.insert("code".to_string(), json!(code));
        error.insert("message".to_string(), json!(message));
        error.extend(extra);

        let body = Json(json!({ "error": Value::Object(error) }));

        (status, body).into_response()
    }
}

fn run_failure_status(failure: &RunFailure) -> (StatusCode, &'static str) {
    match &failure.source {
        StageError::Fetch(FetchError::InvalidUrl { .. }) => (StatusCode::BAD_REQUEST, "INVALID_URL"),
        StageError::Fetch(_) => (StatusCode::BAD_GATEWAY, "FETCH_ERROR"),
        StageError::Extraction(_) => (StatusCode::UNPROCESSABLE_ENTITY, "EXTRACTION_ERROR"),
        StageError::Storage(PortfolioError::InvalidEntry { .. }) => {
            (StatusCode::BAD_REQUEST, "VALIDATION_ERROR")
        }
        StageError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
        StageError::Generation(_) => (StatusCode::BAD_GATEWAY, "GENERATION_ERROR"),
        StageError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "TIMEOUT"),
    }
}

fn extraction_details(e: &ExtractionError) -> Value {
    json!({
        "reason": e.kind.to_string(),
        "text": e.text,
    })
}
