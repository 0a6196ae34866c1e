use std::sync::Arc;

use crate::config::Config;
use crate::generation::pipeline::Pipeline;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Owns the fetcher, extractor, portfolio matcher and composer.
    pub pipeline: Arc<Pipeline>,
    pub config: Config,
}
