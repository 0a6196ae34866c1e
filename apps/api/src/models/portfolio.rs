use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Metadata record stored alongside each indexed document.
pub type Metadata = Map<String, Value>;

/// Metadata key holding the work-sample link.
pub const LINK_KEY: &str = "link";
/// Metadata key holding the techstack text the entry was indexed under.
pub const TECHSTACK_KEY: &str = "techstack";

/// One row of the uploaded portfolio corpus.
///
/// Accepts the column names of the spreadsheet layout (`Techstack`, `Links`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortfolioEntry {
    #[serde(alias = "Techstack")]
    pub techstack: String,
    #[serde(alias = "Links", alias = "links")]
    pub link: String,
}

impl PortfolioEntry {
    pub fn new(techstack: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            techstack: techstack.into(),
            link: link.into(),
        }
    }

    pub fn to_metadata(&self) -> Metadata {
        let mut metadata = Metadata::new();
        metadata.insert(LINK_KEY.to_string(), Value::String(self.link.clone()));
        metadata.insert(
            TECHSTACK_KEY.to_string(),
            Value::String(self.techstack.clone()),
        );
        metadata
    }
}

/// Matched portfolio metadata, best match first within each queried skill.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatchResult(pub Vec<Metadata>);

impl MatchResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Links in match order. Records without a string `link` are skipped.
    pub fn links(&self) -> Vec<&str> {
        self.0
            .iter()
            .filter_map(|m| m.get(LINK_KEY).and_then(Value::as_str))
            .collect()
    }
}
