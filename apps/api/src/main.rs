mod config;
mod db;
mod errors;
mod fetcher;
mod generation;
mod llm_client;
mod models;
mod portfolio;
mod routes;
mod state;
#[cfg(test)]
mod testing;

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{Config, EmbeddingSettings};
use crate::fetcher::HttpPageFetcher;
use crate::generation::composer::EmailComposer;
use crate::generation::jd_parser::JobExtractor;
use crate::generation::pipeline::Pipeline;
use crate::generation::prompts::{PromptTemplate, EMAIL_PLACEHOLDERS, EXTRACT_PLACEHOLDERS};
use crate::llm_client::build_completion;
use crate::portfolio::embedding::{Embedder, HashingEmbedder, OpenAiEmbedder};
use crate::portfolio::index::SqliteIndex;
use crate::portfolio::matcher::PortfolioMatcher;
use crate::portfolio::store::{PortfolioStore, PORTFOLIO_COLLECTION};
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting outreach v{}", env!("CARGO_PKG_VERSION"));

    // Initialize the portfolio index
    let embedder = build_embedder(&config)?;
    let index = SqliteIndex::open(&config.vectorstore_dir, PORTFOLIO_COLLECTION, embedder)
        .await
        .with_context(|| {
            format!(
                "failed to open vector store at {}",
                config.vectorstore_dir.display()
            )
        })?;
    let store = PortfolioStore::new(Arc::new(index)).with_dedupe(config.pipeline.dedupe_matches);
    info!(
        "Portfolio store ready at {} ({} entries)",
        config.vectorstore_dir.display(),
        store.count().await?
    );
    let matcher = PortfolioMatcher::new(Arc::new(store)).with_limit(config.pipeline.n_results);

    // Initialize LLM client
    let llm = build_completion(&config.llm)?;
    info!("LLM client initialized (model: {})", llm.model());

    let extract_template = load_template(
        config.extract_prompt_path.as_deref(),
        PromptTemplate::extraction_default(),
        &EXTRACT_PLACEHOLDERS,
    )
    .await?;
    let email_template = load_template(
        config.email_prompt_path.as_deref(),
        PromptTemplate::email_default(),
        &EMAIL_PLACEHOLDERS,
    )
    .await?;

    // Initialize page fetcher
    let fetcher = HttpPageFetcher::new(config.fetch.clone())?;
    info!(
        "Page fetcher initialized ({} selectors, {}s wait)",
        config.fetch.selectors.len(),
        config.fetch.wait.as_secs()
    );

    let pipeline = Pipeline::new(
        Arc::new(fetcher),
        JobExtractor::with_template(llm.clone(), extract_template),
        matcher,
        EmailComposer::with_template(llm, email_template),
    )
    .with_timeouts(config.pipeline.call_timeout, config.pipeline.run_timeout);

    // Build app state
    let state = AppState {
        pipeline: Arc::new(pipeline),
        config: config.clone(),
    };

    // Build router
    let app = build_router(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    );

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn build_embedder(config: &Config) -> Result<Arc<dyn Embedder>> {
    let embedder: Arc<dyn Embedder> = match &config.embedding {
        EmbeddingSettings::Hashing { dimensions } => {
            info!("Embedder: feature hashing ({dimensions} dimensions)");
            Arc::new(HashingEmbedder::new(*dimensions)?)
        }
        EmbeddingSettings::OpenAi {
            api_key,
            base_url,
            model,
            dimensions,
        } => {
            info!("Embedder: {model} via {base_url}");
            Arc::new(OpenAiEmbedder::new(
                api_key.clone(),
                base_url,
                model.clone(),
                *dimensions,
                config.llm.timeout,
            )?)
        }
    };
    Ok(embedder)
}

/// Reads a prompt override from disk, or keeps the built-in template.
async fn load_template(
    path: Option<&Path>,
    default: PromptTemplate,
    required: &[&str],
) -> Result<PromptTemplate> {
    let Some(path) = path else {
        return Ok(default);
    };
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read prompt template {}", path.display()))?;
    let template = PromptTemplate::new(text, required)
        .with_context(|| format!("invalid prompt template {}", path.display()))?;
    info!("Loaded prompt template from {}", path.display());
    Ok(template)
}
