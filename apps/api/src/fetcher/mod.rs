//! Page Fetcher: turns a job-posting URL into plain text.
//!
//! The pipeline holds one long-lived `Arc<dyn PageFetcher>` and serializes calls
//! through its fetch gate, so implementations backed by a single browser session
//! never see two navigations at once.

use async_trait::async_trait;
use thiserror::Error;

pub mod http;
pub mod text;

pub use http::HttpPageFetcher;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("timed out waiting for {url}")]
    Timeout { url: String },

    #[error("no extractable text content found at {url}")]
    NoContent { url: String },

    #[error("invalid content selector '{0}'")]
    InvalidSelector(String),

    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Returns the cleaned text content of the page at `url`.
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}
