//! Substitute collaborators for unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::fetcher::{FetchError, PageFetcher};
use crate::llm_client::{LlmError, TextCompletion};
use crate::models::portfolio::Metadata;
use crate::portfolio::index::{IndexError, QueryResult, SimilarityIndex};

/// Index whose every operation fails.
pub struct FailingIndex;

#[async_trait]
impl SimilarityIndex for FailingIndex {
    async fn count(&self) -> Result<usize, IndexError> {
        Err(IndexError::Embedding("index offline".to_string()))
    }

    async fn add(&self, _: &[String], _: &[Metadata], _: &[String]) -> Result<(), IndexError> {
        Err(IndexError::Embedding("index offline".to_string()))
    }

    async fn query(&self, _: &[String], _: usize) -> Result<QueryResult, IndexError> {
        Err(IndexError::Embedding("index offline".to_string()))
    }
}

/// Empty index that records query arguments.
#[derive(Default)]
pub struct RecordingIndex {
    queries: Mutex<Vec<(Vec<String>, usize)>>,
}

impl RecordingIndex {
    pub fn queries(&self) -> Vec<(Vec<String>, usize)> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl SimilarityIndex for RecordingIndex {
    async fn count(&self) -> Result<usize, IndexError> {
        Ok(0)
    }

    async fn add(&self, _: &[String], _: &[Metadata], _: &[String]) -> Result<(), IndexError> {
        Ok(())
    }

    async fn query(&self, texts: &[String], n: usize) -> Result<QueryResult, IndexError> {
        self.queries.lock().unwrap().push((texts.to_vec(), n));
        Ok(QueryResult::default())
    }
}

/// Completion that replays scripted responses in order and records prompts.
#[derive(Default)]
pub struct ScriptedCompletion {
    responses: Mutex<VecDeque<Result<String, String>>>,
    prompts: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl ScriptedCompletion {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(|r| Ok(r.into())).collect()),
            ..Self::default()
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            responses: Mutex::new(VecDeque::from([Err(message.to_string())])),
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextCompletion for ScriptedCompletion {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.responses.lock().unwrap().pop_front();
        match next {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(LlmError::Api {
                status: 500,
                message,
            }),
            None => Err(LlmError::Api {
                status: 500,
                message: "script exhausted".to_string(),
            }),
        }
    }

    fn model(&self) -> &str {
        "scripted"
    }
}

/// Fetcher returning fixed text, or failing when constructed with `None`.
/// Tracks how many fetches overlap.
#[derive(Default)]
pub struct StaticFetcher {
    text: Option<String>,
    fetched: Mutex<Vec<String>>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl StaticFetcher {
    pub fn returning(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageFetcher for StaticFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        self.fetched.lock().unwrap().push(url.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.text.clone().ok_or_else(|| FetchError::NoContent {
            url: url.to_string(),
        })
    }
}
