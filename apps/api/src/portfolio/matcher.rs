use std::sync::Arc;

use tracing::debug;

use super::store::PortfolioStore;
use crate::models::job::JobRecord;
use crate::models::portfolio::MatchResult;

/// Default number of matches returned per skill.
pub const DEFAULT_MATCH_LIMIT: usize = 2;

/// Looks up portfolio entries for a job's skills. Never fails: store trouble
/// surfaces as an empty result.
#[derive(Clone)]
pub struct PortfolioMatcher {
    store: Arc<PortfolioStore>,
    limit: usize,
}

impl PortfolioMatcher {
    pub fn new(store: Arc<PortfolioStore>) -> Self {
        Self {
            store,
            limit: DEFAULT_MATCH_LIMIT,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn store(&self) -> &Arc<PortfolioStore> {
        &self.store
    }

    pub async fn match_job(&self, job: &JobRecord) -> MatchResult {
        let result = self.store.query(&job.skills, self.limit).await;
        debug!(
            "Matched {} portfolio records for {} skills",
            result.len(),
            job.skills.len()
        );
        result
    }
}
