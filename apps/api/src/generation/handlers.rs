//! Axum route handlers for extraction and outreach runs.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::fetcher::http::parse_job_url;
use crate::fetcher::text::{clean_text, truncate_chars};
use crate::generation::pipeline::RunOutput;
use crate::models::job::JobRecord;
use crate::models::portfolio::PortfolioEntry;
use crate::models::sender::SenderIdentity;
use crate::portfolio::store::validate_entries;
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ExtractRequest {
    pub raw_text: String,
}

#[derive(Debug, Serialize)]
pub struct ExtractResponse {
    pub job: JobRecord,
}

#[derive(Debug, Deserialize)]
pub struct OutreachRequest {
    /// Loaded before matching when the store is still empty.
    #[serde(default)]
    pub corpus: Option<Vec<PortfolioEntry>>,
    pub job_url: String,
    /// Falls back to the configured default sender.
    #[serde(default)]
    pub sender: Option<SenderIdentity>,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/jobs/extract
///
/// Runs extraction alone on pasted posting text. Useful for previewing what a
/// page will yield before running outreach against it.
pub async fn handle_extract(
    State(state): State<AppState>,
    Json(request): Json<ExtractRequest>,
) -> Result<Json<ExtractResponse>, AppError> {
    let cleaned = clean_text(&request.raw_text);
    if cleaned.is_empty() {
        return Err(AppError::Validation("raw_text cannot be empty".to_string()));
    }
    let text = truncate_chars(&cleaned, state.config.fetch.max_chars);

    let job = state.pipeline.extractor().extract(text).await?;

    Ok(Json(ExtractResponse { job }))
}

/// POST /api/v1/outreach
///
/// Full run for one job posting: fetch → extract → match → compose.
pub async fn handle_outreach(
    State(state): State<AppState>,
    Json(request): Json<OutreachRequest>,
) -> Result<Json<RunOutput>, AppError> {
    parse_job_url(&request.job_url).map_err(|e| AppError::Validation(e.to_string()))?;

    let sender = request
        .sender
        .or_else(|| state.config.default_sender.clone())
        .ok_or_else(|| {
            AppError::Validation(
                "sender is required when no default sender is configured".to_string(),
            )
        })?;
    let missing = sender.missing_fields();
    if !missing.is_empty() {
        return Err(AppError::Validation(format!(
            "sender is missing required fields: {}",
            missing.join(", ")
        )));
    }

    if let Some(corpus) = &request.corpus {
        validate_entries(corpus)?;
    }

    let output = state
        .pipeline
        .run_pipeline(request.corpus.as_deref(), request.job_url.trim(), &sender)
        .await?;

    Ok(Json(output))
}
