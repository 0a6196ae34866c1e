//! Axum route handlers for the Portfolio API.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::portfolio::{MatchResult, PortfolioEntry};
use crate::portfolio::store::LoadOutcome;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub count: usize,
}

#[derive(Debug, Deserialize)]
pub struct LoadRequest {
    pub entries: Vec<PortfolioEntry>,
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub skills: Vec<String>,
    /// Matches per skill; defaults to the configured `MATCH_RESULTS`.
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub matches: MatchResult,
}

/// GET /api/v1/portfolio
pub async fn handle_count(State(state): State<AppState>) -> Result<Json<CountResponse>, AppError> {
    let count = state.pipeline.store().count().await?;
    Ok(Json(CountResponse { count }))
}

/// POST /api/v1/portfolio
///
/// Loads the corpus once. A store that already holds entries is left untouched
/// and the response says so.
pub async fn handle_load(
    State(state): State<AppState>,
    Json(request): Json<LoadRequest>,
) -> Result<Json<LoadOutcome>, AppError> {
    if request.entries.is_empty() {
        return Err(AppError::Validation("entries cannot be empty".to_string()));
    }
    let outcome = state.pipeline.store().load(&request.entries).await?;
    Ok(Json(outcome))
}

/// POST /api/v1/portfolio/query
pub async fn handle_query(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, AppError> {
    let limit = request.limit.unwrap_or(state.config.pipeline.n_results);
    if limit == 0 {
        return Err(AppError::Validation("limit must be at least 1".to_string()));
    }
    let matches = state.pipeline.store().query(&request.skills, limit).await;
    Ok(Json(QueryResponse { matches }))
}
