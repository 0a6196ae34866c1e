use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info};
use url::Url;

use super::text::{extract_text, truncate_chars, validate_selectors};
use super::{FetchError, PageFetcher};
use crate::config::FetchSettings;

/// Fetches pages over plain HTTP and extracts text with a CSS selector cascade.
///
/// Does not execute JavaScript; pages that render their posting client-side fall
/// through to whatever the server-rendered body contains.
pub struct HttpPageFetcher {
    client: Client,
    settings: FetchSettings,
}

impl HttpPageFetcher {
    pub fn new(settings: FetchSettings) -> Result<Self, FetchError> {
        validate_selectors(&settings.selectors)?;
        let client = Client::builder()
            .timeout(settings.wait)
            .user_agent(settings.user_agent.clone())
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;
        Ok(Self { client, settings })
    }
}

/// Only absolute http(s) URLs are fetched.
pub fn parse_job_url(raw: &str) -> Result<Url, FetchError> {
    let url = Url::parse(raw.trim()).map_err(|e| FetchError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(FetchError::InvalidUrl {
            url: raw.to_string(),
            reason: format!("unsupported scheme '{scheme}'"),
        }),
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let parsed = parse_job_url(url)?;
        info!("Fetching job posting {parsed}");

        let response = self
            .client
            .get(parsed.clone())
            .send()
            .await
            .map_err(|source| request_error(url, source))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|source| request_error(url, source))?;
        debug!("Downloaded {} bytes from {parsed}", body.len());

        let text = extract_text(&body, &self.settings.selectors).ok_or_else(|| {
            FetchError::NoContent {
                url: url.to_string(),
            }
        })?;

        Ok(truncate_chars(&text, self.settings.max_chars).to_string())
    }
}

fn request_error(url: &str, source: reqwest::Error) -> FetchError {
    if source.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        FetchError::Request {
            url: url.to_string(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_job_url_accepts_http_and_https() {
        assert!(parse_job_url("https://jobs.example.com/123").is_ok());
        assert!(parse_job_url(" http://example.com ").is_ok());
    }

    #[test]
    fn test_parse_job_url_rejects_other_inputs() {
        assert!(matches!(
            parse_job_url("not a url"),
            Err(FetchError::InvalidUrl { .. })
        ));
        assert!(matches!(
            parse_job_url("file:///etc/passwd"),
            Err(FetchError::InvalidUrl { reason, .. }) if reason.contains("file")
        ));
    }

    #[test]
    fn test_new_rejects_invalid_selector() {
        let settings = FetchSettings {
            selectors: vec!["div[[".to_string()],
            ..FetchSettings::default()
        };
        assert!(matches!(
            HttpPageFetcher::new(settings),
            Err(FetchError::InvalidSelector(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_rejects_invalid_url_before_network() {
        let fetcher = HttpPageFetcher::new(FetchSettings::default()).unwrap();
        let err = fetcher.fetch("ftp://example.com/job").await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl { .. }));
    }
}
