//! Outreach pipeline: fetch → extract → match → compose, one job per run.
//!
//! Each run walks a small state machine and records every transition. Every external
//! call is bounded by the per-call timeout and the whole run by a deadline; on expiry
//! the run ends in `Failed` for the stage that was active.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{error, info};
use uuid::Uuid;

use crate::config::PipelineSettings;
use crate::fetcher::{FetchError, PageFetcher};
use crate::generation::composer::{EmailComposer, GenerationError};
use crate::generation::jd_parser::{ExtractionError, JobExtractor};
use crate::models::job::JobRecord;
use crate::models::portfolio::{MatchResult, PortfolioEntry};
use crate::models::sender::SenderIdentity;
use crate::portfolio::matcher::PortfolioMatcher;
use crate::portfolio::store::{PortfolioError, PortfolioStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Fetching,
    Extracting,
    Matching,
    Composing,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Fetching => "fetching",
            Stage::Extracting => "extracting",
            Stage::Matching => "matching",
            Stage::Composing => "composing",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Fetching,
    Extracting,
    Matching,
    Composing,
    Done,
    Failed { stage: Stage, error: String },
}

impl RunState {
    fn active(stage: Stage) -> Self {
        match stage {
            Stage::Fetching => RunState::Fetching,
            Stage::Extracting => RunState::Extracting,
            Stage::Matching => RunState::Matching,
            Stage::Composing => RunState::Composing,
        }
    }

    fn stage(&self) -> Option<Stage> {
        match self {
            RunState::Fetching => Some(Stage::Fetching),
            RunState::Extracting => Some(Stage::Extracting),
            RunState::Matching => Some(Stage::Matching),
            RunState::Composing => Some(Stage::Composing),
            _ => None,
        }
    }

    /// Forward moves one stage at a time; `Failed` only from the stage it names.
    pub fn can_transition_to(&self, next: &RunState) -> bool {
        match (self, next) {
            (RunState::Idle, RunState::Fetching)
            | (RunState::Fetching, RunState::Extracting)
            | (RunState::Extracting, RunState::Matching)
            | (RunState::Matching, RunState::Composing)
            | (RunState::Composing, RunState::Done) => true,
            (current, RunState::Failed { stage, .. }) => current.stage() == Some(*stage),
            _ => false,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Idle => f.write_str("idle"),
            RunState::Done => f.write_str("done"),
            RunState::Failed { stage, .. } => write!(f, "failed({stage})"),
            active => match active.stage() {
                Some(stage) => write!(f, "{stage}"),
                None => Ok(()),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transition {
    pub state: RunState,
    pub at: DateTime<Utc>,
}

/// Records the state history of one run.
#[derive(Debug)]
pub struct RunTracker {
    run_id: Uuid,
    state: RunState,
    transitions: Vec<Transition>,
}

impl RunTracker {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            state: RunState::Idle,
            transitions: vec![Transition {
                state: RunState::Idle,
                at: Utc::now(),
            }],
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    fn advance(&mut self, next: RunState) {
        debug_assert!(
            self.state.can_transition_to(&next),
            "invalid run transition {} -> {}",
            self.state,
            next
        );
        info!("Run {}: {} -> {}", self.run_id, self.state, next);
        self.transitions.push(Transition {
            state: next.clone(),
            at: Utc::now(),
        });
        self.state = next;
    }

    fn enter(&mut self, stage: Stage) {
        self.advance(RunState::active(stage));
    }

    fn fail(mut self, stage: Stage, source: StageError) -> RunFailure {
        error!("Run {} failed during {stage}: {source}", self.run_id);
        self.advance(RunState::Failed {
            stage,
            error: source.to_string(),
        });
        RunFailure {
            run_id: self.run_id,
            stage,
            transitions: self.transitions,
            source,
        }
    }
}

impl Default for RunTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Storage(#[from] PortfolioError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Error)]
#[error("run failed during {stage}: {source}")]
pub struct RunFailure {
    pub run_id: Uuid,
    pub stage: Stage,
    pub transitions: Vec<Transition>,
    #[source]
    pub source: StageError,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunOutput {
    pub run_id: Uuid,
    pub scraped_chars: usize,
    pub job: JobRecord,
    pub matches: MatchResult,
    pub email: String,
    pub transitions: Vec<Transition>,
}

pub struct Pipeline {
    fetcher: Arc<dyn PageFetcher>,
    /// One fetch at a time; the guard drops when a timed-out fetch is abandoned.
    fetch_gate: Mutex<()>,
    extractor: JobExtractor,
    matcher: PortfolioMatcher,
    composer: EmailComposer,
    call_timeout: Duration,
    run_timeout: Duration,
}

impl Pipeline {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        extractor: JobExtractor,
        matcher: PortfolioMatcher,
        composer: EmailComposer,
    ) -> Self {
        let defaults = PipelineSettings::default();
        Self {
            fetcher,
            fetch_gate: Mutex::new(()),
            extractor,
            matcher,
            composer,
            call_timeout: defaults.call_timeout,
            run_timeout: defaults.run_timeout,
        }
    }

    pub fn with_timeouts(mut self, call_timeout: Duration, run_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self.run_timeout = run_timeout;
        self
    }

    pub fn extractor(&self) -> &JobExtractor {
        &self.extractor
    }

    pub fn store(&self) -> &Arc<PortfolioStore> {
        self.matcher.store()
    }

    /// Runs one job end to end.
    ///
    /// A non-empty `corpus` is loaded into the store at the start of matching; the
    /// load is a no-op when the store already holds entries. The sender is used as
    /// given; callers validate it.
    pub async fn run_pipeline(
        &self,
        corpus: Option<&[PortfolioEntry]>,
        job_url: &str,
        sender: &SenderIdentity,
    ) -> Result<RunOutput, RunFailure> {
        let mut run = RunTracker::new();
        let deadline = Instant::now() + self.run_timeout;
        info!("Run {} started for {job_url}", run.run_id());

        run.enter(Stage::Fetching);
        let scraped = match self.bounded(deadline, self.fetch(job_url)).await {
            Ok(text) => text,
            Err(e) => return Err(run.fail(Stage::Fetching, e)),
        };
        let scraped_chars = scraped.chars().count();
        info!("Run {}: scraped {scraped_chars} chars", run.run_id());

        run.enter(Stage::Extracting);
        let job = match self
            .bounded(deadline, self.extractor.extract(&scraped))
            .await
        {
            Ok(job) => job,
            Err(e) => return Err(run.fail(Stage::Extracting, e)),
        };

        run.enter(Stage::Matching);
        let matches = match self.bounded(deadline, self.load_and_match(corpus, &job)).await {
            Ok(matches) => matches,
            Err(e) => return Err(run.fail(Stage::Matching, e)),
        };

        run.enter(Stage::Composing);
        let email = match self
            .bounded(deadline, self.composer.compose(&job, &matches, sender))
            .await
        {
            Ok(email) => email,
            Err(e) => return Err(run.fail(Stage::Composing, e)),
        };

        run.advance(RunState::Done);
        Ok(RunOutput {
            run_id: run.run_id,
            scraped_chars,
            job,
            matches,
            email,
            transitions: run.transitions,
        })
    }

    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let _gate = self.fetch_gate.lock().await;
        self.fetcher.fetch(url).await
    }

    async fn load_and_match(
        &self,
        corpus: Option<&[PortfolioEntry]>,
        job: &JobRecord,
    ) -> Result<MatchResult, PortfolioError> {
        if let Some(entries) = corpus.filter(|entries| !entries.is_empty()) {
            self.matcher.store().load(entries).await?;
        }
        Ok(self.matcher.match_job(job).await)
    }

    /// Bounds `call` by the per-call timeout, clipped to the run deadline.
    async fn bounded<T, E>(
        &self,
        deadline: Instant,
        call: impl Future<Output = Result<T, E>>,
    ) -> Result<T, StageError>
    where
        StageError: From<E>,
    {
        let call_deadline = deadline.min(Instant::now() + self.call_timeout);
        let budget = call_deadline.saturating_duration_since(Instant::now());
        match tokio::time::timeout_at(call_deadline, call).await {
            Ok(result) => result.map_err(StageError::from),
            Err(_) => Err(StageError::Timeout(budget)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::jd_parser::ExtractionErrorKind;
    use crate::llm_client::TextCompletion;
    use crate::portfolio::embedding::HashingEmbedder;
    use crate::portfolio::index::{SimilarityIndex, SqliteIndex};
    use crate::portfolio::store::PORTFOLIO_COLLECTION;
    use crate::testing::{FailingIndex, RecordingIndex, ScriptedCompletion, StaticFetcher};

    const JOB_JSON: &str = r#"{"role":"Backend Engineer","experience":"3 years","skills":["Python","Django"],"description":"Build and run APIs."}"#;
    const PAGE: &str = "Backend Engineer. 3 years of Python and Django. Build and run APIs.";

    fn pipeline(
        fetcher: Arc<dyn PageFetcher>,
        llm: Arc<dyn TextCompletion>,
        index: Arc<dyn SimilarityIndex>,
    ) -> Pipeline {
        let store = Arc::new(PortfolioStore::new(index));
        Pipeline::new(
            fetcher,
            JobExtractor::new(llm.clone()),
            PortfolioMatcher::new(store),
            EmailComposer::new(llm),
        )
    }

    fn corpus() -> Vec<PortfolioEntry> {
        serde_json::from_str(
            r#"[{"Techstack":"React, Node.js","Links":"https://a/1"},
                {"Techstack":"Python, Django","Links":"https://a/2"}]"#,
        )
        .unwrap()
    }

    fn sender() -> SenderIdentity {
        SenderIdentity {
            name: "Mohan".to_string(),
            company: "AtliQ".to_string(),
            ..SenderIdentity::default()
        }
    }

    fn states(transitions: &[Transition]) -> Vec<RunState> {
        transitions.iter().map(|t| t.state.clone()).collect()
    }

    #[tokio::test]
    async fn test_run_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let embedder = Arc::new(HashingEmbedder::new(512).unwrap());
        let index = Arc::new(
            SqliteIndex::open(dir.path(), PORTFOLIO_COLLECTION, embedder)
                .await
                .unwrap(),
        );
        let fetcher = Arc::new(StaticFetcher::returning(PAGE));
        let llm = Arc::new(ScriptedCompletion::new([
            JOB_JSON,
            "Dear hiring manager, AtliQ can help.",
        ]));
        let pipeline = pipeline(fetcher.clone(), llm.clone(), index);
        let corpus = corpus();

        let output = pipeline
            .run_pipeline(Some(&corpus), "https://careers.example.com/jobs/1", &sender())
            .await
            .unwrap();

        assert_eq!(fetcher.fetched(), vec!["https://careers.example.com/jobs/1"]);
        assert_eq!(output.scraped_chars, PAGE.chars().count());
        assert_eq!(output.job.role, "Backend Engineer");
        assert_eq!(output.job.skills, vec!["Python", "Django"]);
        let links = output.matches.links();
        assert_eq!(links[0], "https://a/2");
        assert_eq!(links[1], "https://a/1");
        assert!(!output.email.is_empty());

        let prompts = llm.prompts();
        assert!(prompts[0].contains(PAGE));
        assert!(prompts[1].contains("https://a/2"));
        assert!(prompts[1].contains("AtliQ"));

        assert_eq!(
            states(&output.transitions),
            vec![
                RunState::Idle,
                RunState::Fetching,
                RunState::Extracting,
                RunState::Matching,
                RunState::Composing,
                RunState::Done,
            ]
        );
        assert_eq!(pipeline.store().count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_repeated_runs_load_corpus_once() {
        let dir = tempfile::tempdir().unwrap();
        let embedder = Arc::new(HashingEmbedder::new(512).unwrap());
        let index = Arc::new(
            SqliteIndex::open(dir.path(), PORTFOLIO_COLLECTION, embedder)
                .await
                .unwrap(),
        );
        let llm = Arc::new(ScriptedCompletion::new([JOB_JSON, "email 1", JOB_JSON, "email 2"]));
        let pipeline = pipeline(Arc::new(StaticFetcher::returning(PAGE)), llm, index);
        let corpus = corpus();

        for _ in 0..2 {
            pipeline
                .run_pipeline(Some(&corpus), "https://example.com/job", &sender())
                .await
                .unwrap();
        }
        assert_eq!(pipeline.store().count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_fetch_failure_stops_run() {
        let llm = Arc::new(ScriptedCompletion::default());
        let pipeline = pipeline(
            Arc::new(StaticFetcher::failing()),
            llm.clone(),
            Arc::new(RecordingIndex::default()),
        );

        let failure = pipeline
            .run_pipeline(None, "https://example.com/job", &sender())
            .await
            .unwrap_err();

        assert_eq!(failure.stage, Stage::Fetching);
        assert!(matches!(failure.source, StageError::Fetch(FetchError::NoContent { .. })));
        assert!(llm.prompts().is_empty());
        assert!(matches!(
            failure.transitions.last().map(|t| &t.state),
            Some(RunState::Failed {
                stage: Stage::Fetching,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_extraction_failure_is_reported_with_stage() {
        let index = Arc::new(RecordingIndex::default());
        let pipeline = pipeline(
            Arc::new(StaticFetcher::returning(PAGE)),
            Arc::new(ScriptedCompletion::new([r#"{"role":"Backend Engineer"}"#])),
            index.clone(),
        );

        let failure = pipeline
            .run_pipeline(None, "https://example.com/job", &sender())
            .await
            .unwrap_err();

        assert_eq!(failure.stage, Stage::Extracting);
        match &failure.source {
            StageError::Extraction(e) => {
                assert!(matches!(e.kind, ExtractionErrorKind::MissingFields(_)))
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(index.queries().is_empty());
        assert!(failure.to_string().starts_with("run failed during extracting"));
    }

    #[tokio::test]
    async fn test_storage_failure_during_load_fails_matching() {
        let pipeline = pipeline(
            Arc::new(StaticFetcher::returning(PAGE)),
            Arc::new(ScriptedCompletion::new([JOB_JSON, "email"])),
            Arc::new(FailingIndex),
        );
        let corpus = corpus();

        let failure = pipeline
            .run_pipeline(Some(&corpus), "https://example.com/job", &sender())
            .await
            .unwrap_err();

        assert_eq!(failure.stage, Stage::Matching);
        assert!(matches!(failure.source, StageError::Storage(_)));
    }

    #[tokio::test]
    async fn test_query_failure_still_composes_email() {
        let pipeline = pipeline(
            Arc::new(StaticFetcher::returning(PAGE)),
            Arc::new(ScriptedCompletion::new([JOB_JSON, "email without links"])),
            Arc::new(FailingIndex),
        );

        let output = pipeline
            .run_pipeline(None, "https://example.com/job", &sender())
            .await
            .unwrap();

        assert!(output.matches.is_empty());
        assert_eq!(output.email, "email without links");
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_runs_fetch_one_at_a_time() {
        let fetcher = Arc::new(StaticFetcher::returning(PAGE).with_delay(Duration::from_secs(1)));
        // Every reply parses as a job and also serves as an email, so
        // interleaved runs may consume them in any order.
        let llm = Arc::new(ScriptedCompletion::new([JOB_JSON; 4]));
        let pipeline = pipeline(fetcher.clone(), llm, Arc::new(RecordingIndex::default()));
        let sender = sender();

        let (first, second) = tokio::join!(
            pipeline.run_pipeline(None, "https://example.com/jobs/1", &sender),
            pipeline.run_pipeline(None, "https://example.com/jobs/2", &sender),
        );

        first.unwrap();
        second.unwrap();
        assert_eq!(fetcher.fetched().len(), 2);
        assert_eq!(fetcher.max_in_flight(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_completion_times_out() {
        let llm = Arc::new(
            ScriptedCompletion::new([JOB_JSON]).with_delay(Duration::from_secs(30)),
        );
        let pipeline = pipeline(
            Arc::new(StaticFetcher::returning(PAGE)),
            llm,
            Arc::new(RecordingIndex::default()),
        )
        .with_timeouts(Duration::from_secs(5), Duration::from_secs(60));

        let failure = pipeline
            .run_pipeline(None, "https://example.com/job", &sender())
            .await
            .unwrap_err();

        assert_eq!(failure.stage, Stage::Extracting);
        assert!(matches!(failure.source, StageError::Timeout(d) if d == Duration::from_secs(5)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_deadline_clips_call_timeout() {
        let llm = Arc::new(
            ScriptedCompletion::new([JOB_JSON]).with_delay(Duration::from_secs(30)),
        );
        let pipeline = pipeline(
            Arc::new(StaticFetcher::returning(PAGE)),
            llm,
            Arc::new(RecordingIndex::default()),
        )
        .with_timeouts(Duration::from_secs(60), Duration::from_secs(10));

        let failure = pipeline
            .run_pipeline(None, "https://example.com/job", &sender())
            .await
            .unwrap_err();

        assert!(matches!(failure.source, StageError::Timeout(d) if d <= Duration::from_secs(10)));
    }

    #[test]
    fn test_state_transitions() {
        assert!(RunState::Idle.can_transition_to(&RunState::Fetching));
        assert!(RunState::Composing.can_transition_to(&RunState::Done));
        assert!(!RunState::Fetching.can_transition_to(&RunState::Composing));
        assert!(!RunState::Done.can_transition_to(&RunState::Fetching));

        let failed = |stage| RunState::Failed {
            stage,
            error: "x".to_string(),
        };
        assert!(RunState::Extracting.can_transition_to(&failed(Stage::Extracting)));
        assert!(!RunState::Extracting.can_transition_to(&failed(Stage::Composing)));
        assert!(!RunState::Idle.can_transition_to(&failed(Stage::Fetching)));
        assert!(!failed(Stage::Matching).can_transition_to(&RunState::Composing));
    }

    #[test]
    fn test_tracker_records_failure() {
        let mut run = RunTracker::new();
        run.enter(Stage::Fetching);
        assert_eq!(run.state, RunState::Fetching);

        let failure = run.fail(Stage::Fetching, StageError::Timeout(Duration::from_secs(1)));
        assert_eq!(failure.transitions.len(), 3);
        assert_eq!(
            serde_json::to_value(&failure.transitions[2].state).unwrap(),
            serde_json::json!({"state": "failed", "stage": "fetching", "error": "timed out after 1s"})
        );
    }
}
