//! JD Parser: turns scraped job-posting text into a validated `JobRecord`.
//!
//! The completion is not trusted to be clean JSON. It is normalized (code fences
//! stripped, surrounding prose cut away), unwrapped when the model returned a list
//! of postings, and validated field by field. A missing field is always an error.

use std::sync::Arc;

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::generation::prompts::PromptTemplate;
use crate::llm_client::{LlmError, TextCompletion};
use crate::models::job::{JobRecord, REQUIRED_FIELDS};

#[derive(Debug, Error)]
pub enum ExtractionErrorKind {
    #[error("completion failed: {0}")]
    Completion(#[source] LlmError),

    #[error("completion returned an empty response")]
    EmptyResponse,

    #[error("failed to parse JSON from completion: {0}")]
    InvalidJson(String),

    #[error("completion returned an empty list of job postings")]
    NoPosting,

    #[error("expected a JSON object, found {0}")]
    NotAnObject(&'static str),

    #[error("missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),

    #[error("field '{field}' {problem}")]
    InvalidField {
        field: &'static str,
        problem: &'static str,
    },
}

/// Extraction failure with the text that caused it, for diagnosis.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct ExtractionError {
    pub kind: ExtractionErrorKind,
    /// Normalized completion text when available, otherwise the raw response.
    pub text: String,
}

impl ExtractionError {
    fn new(kind: ExtractionErrorKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }
}

/// The Job Detail Extractor. One completion per call, no retries.
#[derive(Clone)]
pub struct JobExtractor {
    llm: Arc<dyn TextCompletion>,
    template: PromptTemplate,
}

impl JobExtractor {
    pub fn new(llm: Arc<dyn TextCompletion>) -> Self {
        Self::with_template(llm, PromptTemplate::extraction_default())
    }

    pub fn with_template(llm: Arc<dyn TextCompletion>, template: PromptTemplate) -> Self {
        Self { llm, template }
    }

    pub fn render_prompt(&self, raw_text: &str) -> String {
        self.template.render(&[("page_content", raw_text)])
    }

    pub async fn extract(&self, raw_text: &str) -> Result<JobRecord, ExtractionError> {
        let prompt = self.render_prompt(raw_text);
        let response = self
            .llm
            .complete(&prompt)
            .await
            .map_err(|e| ExtractionError::new(ExtractionErrorKind::Completion(e), ""))?;

        debug!("Raw extraction response: {response}");
        let job = parse_job_response(&response)?;
        info!(
            "Extracted job '{}' with {} skills",
            job.role,
            job.skills.len()
        );
        Ok(job)
    }
}

/// Normalizes and validates a completion response into a `JobRecord`.
pub fn parse_job_response(response: &str) -> Result<JobRecord, ExtractionError> {
    if response.trim().is_empty() {
        return Err(ExtractionError::new(
            ExtractionErrorKind::EmptyResponse,
            response,
        ));
    }

    let normalized = normalize_completion(response);
    let value: Value = serde_json::from_str(&normalized).map_err(|e| {
        ExtractionError::new(ExtractionErrorKind::InvalidJson(e.to_string()), &*normalized)
    })?;

    let posting = select_posting(value)
        .map_err(|kind| ExtractionError::new(kind, &*normalized))?;
    record_from_object(&posting).map_err(|kind| ExtractionError::new(kind, &*normalized))
}

/// Strips code fences, trims, and cuts the text down to its JSON payload.
///
/// Text that already parses as a JSON object or array is kept whole. Otherwise the
/// first balanced `{...}` span is used; when braces never balance, the span from
/// the first `{` to the last `}`.
pub fn normalize_completion(response: &str) -> String {
    let stripped = strip_code_fences(response);
    let trimmed = stripped.trim();

    if (trimmed.starts_with('{') || trimmed.starts_with('['))
        && serde_json::from_str::<Value>(trimmed).is_ok()
    {
        return trimmed.to_string();
    }

    find_object_span(trimmed).unwrap_or(trimmed).to_string()
}

/// Replaces every closed ```` ``` ```` / ```` ```json ```` block with its contents.
fn strip_code_fences(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(open) = rest.find("```") {
        let after_open = &rest[open + 3..];
        let Some(close) = after_open.find("```") else {
            break;
        };
        out.push_str(&rest[..open]);

        let inner = &after_open[..close];
        let inner = inner
            .strip_prefix("json")
            .or_else(|| inner.strip_prefix("JSON"))
            .unwrap_or(inner);
        let inner = inner
            .strip_prefix("\r\n")
            .or_else(|| inner.strip_prefix('\n'))
            .unwrap_or(inner);
        out.push_str(inner);

        rest = &after_open[close + 3..];
    }

    out.push_str(rest);
    out
}

fn find_object_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }

    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Picks the single posting this pipeline handles.
///
/// A list (bare, or under a `jobs` key) yields its first element; the rest are
/// dropped with a warning. One job per run is a known limitation.
fn select_posting(value: Value) -> Result<Map<String, Value>, ExtractionErrorKind> {
    let value = match value {
        Value::Object(mut map) if matches!(map.get("jobs"), Some(Value::Array(_))) => {
            map.remove("jobs").unwrap_or(Value::Null)
        }
        other => other,
    };

    let value = match value {
        Value::Array(items) => {
            if items.len() > 1 {
                warn!(
                    "Completion returned {} job postings; using the first",
                    items.len()
                );
            }
            items
                .into_iter()
                .next()
                .ok_or(ExtractionErrorKind::NoPosting)?
        }
        other => other,
    };

    match value {
        Value::Object(map) => Ok(map),
        other => Err(ExtractionErrorKind::NotAnObject(json_type(&other))),
    }
}

fn record_from_object(map: &Map<String, Value>) -> Result<JobRecord, ExtractionErrorKind> {
    let missing: Vec<&'static str> = REQUIRED_FIELDS
        .iter()
        .copied()
        .filter(|field| map.get(*field).map_or(true, Value::is_null))
        .collect();
    if !missing.is_empty() {
        return Err(ExtractionErrorKind::MissingFields(missing));
    }

    Ok(JobRecord {
        role: string_field(map, "role")?,
        experience: experience_field(map)?,
        skills: skills_field(map)?,
        description: string_field(map, "description")?,
    })
}

fn string_field(map: &Map<String, Value>, field: &'static str) -> Result<String, ExtractionErrorKind> {
    match map.get(field) {
        Some(Value::String(s)) => Ok(s.trim().to_string()),
        _ => Err(ExtractionErrorKind::InvalidField {
            field,
            problem: "must be a string",
        }),
    }
}

/// Experience is free-form; a bare number such as `3` is kept as "3".
fn experience_field(map: &Map<String, Value>) -> Result<String, ExtractionErrorKind> {
    match map.get("experience") {
        Some(Value::String(s)) => Ok(s.trim().to_string()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(ExtractionErrorKind::InvalidField {
            field: "experience",
            problem: "must be a string or number",
        }),
    }
}

/// Skills as a list of strings, or one comma-separated string. Blank items are dropped.
fn skills_field(map: &Map<String, Value>) -> Result<Vec<String>, ExtractionErrorKind> {
    let invalid = ExtractionErrorKind::InvalidField {
        field: "skills",
        problem: "must be a list of strings",
    };
    let skills: Vec<String> = match map.get("skills") {
        Some(Value::Array(items)) => {
            let mut skills = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::String(s) => skills.push(s.trim().to_string()),
                    _ => return Err(invalid),
                }
            }
            skills
        }
        Some(Value::String(s)) => s.split(',').map(|s| s.trim().to_string()).collect(),
        _ => return Err(invalid),
    };
    Ok(skills.into_iter().filter(|s| !s.is_empty()).collect())
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
