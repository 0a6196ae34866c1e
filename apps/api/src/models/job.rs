use serde::{Deserialize, Serialize};

/// Structured job posting produced by the extractor.
///
/// Field order is fixed; the composer serializes this struct into its prompt and
/// relies on the order being stable.
///
/// Values are the completion's field values after normalization: strings are
/// trimmed, a numeric experience becomes its decimal text, and skills that are
/// blank after trimming are dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub role: String,
    /// Free-form, e.g. "3+ years" or "Senior".
    pub experience: String,
    /// Ordered; each skill becomes one query against the portfolio store.
    pub skills: Vec<String>,
    pub description: String,
}

/// Keys a completion must provide for a posting to be accepted.
pub const REQUIRED_FIELDS: [&str; 4] = ["role", "experience", "skills", "description"];
