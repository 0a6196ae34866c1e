//! Portfolio Store: owns the persisted corpus and its similarity index.
//!
//! Error policy is asymmetric: `load` surfaces storage failures,
//! `query` logs them and returns an empty match so email generation can proceed.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use super::index::{IndexError, SimilarityIndex};
use crate::models::portfolio::{MatchResult, Metadata, PortfolioEntry, LINK_KEY};

/// Collection name the corpus is stored under.
pub const PORTFOLIO_COLLECTION: &str = "portfolio";

#[derive(Debug, Error)]
pub enum PortfolioError {
    #[error("portfolio row {row}: {reason}")]
    InvalidEntry { row: usize, reason: String },

    #[error(transparent)]
    Storage(#[from] IndexError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LoadOutcome {
    Loaded { added: usize },
    /// The store already held entries; nothing was written.
    Skipped { existing: usize },
}

pub struct PortfolioStore {
    index: Arc<dyn SimilarityIndex>,
    /// Serializes loads within this process. Another process writing the same
    /// index can still race the emptiness check.
    load_gate: Mutex<()>,
    dedupe: bool,
}

impl PortfolioStore {
    pub fn new(index: Arc<dyn SimilarityIndex>) -> Self {
        Self {
            index,
            load_gate: Mutex::new(()),
            dedupe: false,
        }
    }

    /// Drop repeated links when concatenating per-skill results.
    pub fn with_dedupe(mut self, dedupe: bool) -> Self {
        self.dedupe = dedupe;
        self
    }

    pub async fn count(&self) -> Result<usize, PortfolioError> {
        Ok(self.index.count().await?)
    }

    /// Bulk-loads `entries` unless the store already holds any entry.
    ///
    /// Every row is validated before anything is written. Idempotence only
    /// distinguishes empty from non-empty: a changed corpus is not detected.
    pub async fn load(&self, entries: &[PortfolioEntry]) -> Result<LoadOutcome, PortfolioError> {
        validate_entries(entries)?;

        let _guard = self.load_gate.lock().await;

        let existing = self.index.count().await?;
        if existing > 0 {
            info!("Portfolio already holds {existing} entries; skipping load");
            return Ok(LoadOutcome::Skipped { existing });
        }

        let documents: Vec<String> = entries.iter().map(|e| e.techstack.trim().to_string()).collect();
        let metadatas: Vec<Metadata> = entries.iter().map(PortfolioEntry::to_metadata).collect();
        let ids: Vec<String> = entries.iter().map(|_| Uuid::new_v4().to_string()).collect();

        self.index.add(&documents, &metadatas, &ids).await?;

        info!("Loaded {} portfolio entries", entries.len());
        Ok(LoadOutcome::Loaded {
            added: entries.len(),
        })
    }

    /// Nearest portfolio entries for each skill, concatenated in skill order.
    ///
    /// Blank skills are ignored; with no skills left the result is empty and the
    /// index is not consulted. Each skill contributes at most `limit` records.
    /// Index failures are logged and yield an empty result.
    pub async fn query(&self, skills: &[String], limit: usize) -> MatchResult {
        let skills: Vec<String> = skills
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if skills.is_empty() || limit == 0 {
            return MatchResult::empty();
        }

        let result = match self.index.query(&skills, limit).await {
            Ok(result) => result,
            Err(e) => {
                warn!("Portfolio query failed, continuing without matches: {e}");
                return MatchResult::empty();
            }
        };

        let records = result.metadatas.into_iter().flatten();
        let records: Vec<Metadata> = if self.dedupe {
            let mut seen = HashSet::new();
            records
                .filter(|m| match m.get(LINK_KEY).and_then(Value::as_str) {
                    Some(link) => seen.insert(link.to_string()),
                    None => true,
                })
                .collect()
        } else {
            records.collect()
        };

        MatchResult(records)
    }
}

/// Rejects rows with a blank techstack or link, reporting the first offending row.
pub(crate) fn validate_entries(entries: &[PortfolioEntry]) -> Result<(), PortfolioError> {
    for (row, entry) in entries.iter().enumerate() {
        if entry.techstack.trim().is_empty() {
            return Err(PortfolioError::InvalidEntry {
                row,
                reason: "techstack is empty".to_string(),
            });
        }
        if entry.link.trim().is_empty() {
            return Err(PortfolioError::InvalidEntry {
                row,
                reason: "link is empty".to_string(),
            });
        }
    }
    Ok(())
}
