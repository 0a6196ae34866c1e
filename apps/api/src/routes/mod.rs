pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::generation::handlers as generation;
use crate::portfolio::handlers as portfolio;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Portfolio API
        .route(
            "/api/v1/portfolio",
            get(portfolio::handle_count).post(portfolio::handle_load),
        )
        .route("/api/v1/portfolio/query", post(portfolio::handle_query))
        // Generation API
        .route("/api/v1/jobs/extract", post(generation::handle_extract))
        .route("/api/v1/outreach", post(generation::handle_outreach))
        .with_state(state)
}
