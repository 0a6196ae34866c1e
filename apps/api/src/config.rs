use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::models::sender::SenderIdentity;

/// Selector cascade tried in order before falling back to the whole page body.
pub const DEFAULT_FETCH_SELECTORS: [&str; 5] = [
    ".jd-info",
    "[class*='job-description']",
    "[class*='description']",
    "article",
    "main",
];

/// Application configuration loaded from environment variables.
/// Startup fails if a required variable is missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub rust_log: String,
    /// Directory holding the similarity index's on-disk storage.
    pub vectorstore_dir: PathBuf,
    pub llm: LlmSettings,
    pub embedding: EmbeddingSettings,
    pub fetch: FetchSettings,
    pub pipeline: PipelineSettings,
    pub extract_prompt_path: Option<PathBuf>,
    pub email_prompt_path: Option<PathBuf>,
    /// Used when an outreach request does not name a sender.
    pub default_sender: Option<SenderIdentity>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    /// Any OpenAI-compatible chat-completions endpoint (Groq by default).
    OpenAi,
    Anthropic,
}

impl FromStr for LlmProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" | "groq" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            other => bail!("unknown LLM provider '{other}' (expected openai or anthropic)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub provider: LlmProvider,
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub max_retries: u32,
    /// Per-attempt HTTP timeout. Every attempt plus backoff must fit inside
    /// `PipelineSettings::call_timeout` for retries to ever run.
    pub timeout: Duration,
    pub temperature: f32,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: LlmProvider::OpenAi,
            api_key: String::new(),
            model: "llama-3.1-70b-versatile".to_string(),
            base_url: "https://api.groq.com/openai/v1".to_string(),
            max_retries: 2,
            timeout: Duration::from_secs(25),
            temperature: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmbeddingSettings {
    /// Local feature-hashing embedder; no network access.
    Hashing { dimensions: usize },
    OpenAi {
        api_key: String,
        base_url: String,
        model: String,
        dimensions: Option<usize>,
    },
}

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub selectors: Vec<String>,
    /// Bounded wait for the page to arrive.
    pub wait: Duration,
    /// Scraped text is truncated to this many characters before prompting.
    pub max_chars: usize,
    pub user_agent: String,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            selectors: DEFAULT_FETCH_SELECTORS.iter().map(|s| s.to_string()).collect(),
            wait: Duration::from_secs(10),
            max_chars: 12_000,
            user_agent: format!("outreach/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Matches returned per skill.
    pub n_results: usize,
    /// Drop repeated links across per-skill result sets.
    pub dedupe_matches: bool,
    pub call_timeout: Duration,
    pub run_timeout: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            n_results: 2,
            dedupe_matches: false,
            call_timeout: Duration::from_secs(90),
            run_timeout: Duration::from_secs(300),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(&lookup);

        let provider: LlmProvider = vars.parse_or("LLM_PROVIDER", LlmProvider::OpenAi)?;
        let llm_defaults = LlmSettings::default();
        let (default_model, default_base_url, key_fallback) = match provider {
            LlmProvider::OpenAi => (
                llm_defaults.model.clone(),
                llm_defaults.base_url.clone(),
                "GROQ_API_KEY",
            ),
            LlmProvider::Anthropic => (
                "claude-sonnet-4-5".to_string(),
                "https://api.anthropic.com".to_string(),
                "ANTHROPIC_API_KEY",
            ),
        };
        let api_key = vars
            .get("LLM_API_KEY")
            .or_else(|| vars.get(key_fallback))
            .with_context(|| {
                format!("Required environment variable 'LLM_API_KEY' (or '{key_fallback}') is not set")
            })?;

        let llm = LlmSettings {
            provider,
            api_key,
            model: vars.get("LLM_MODEL").unwrap_or(default_model),
            base_url: vars.get("LLM_BASE_URL").unwrap_or(default_base_url),
            max_retries: vars.parse_or("LLM_MAX_RETRIES", llm_defaults.max_retries)?,
            timeout: vars.secs_or("LLM_TIMEOUT_SECS", llm_defaults.timeout)?,
            temperature: vars.parse_or("LLM_TEMPERATURE", llm_defaults.temperature)?,
        };

        let embedding = match vars
            .get("EMBEDDING_PROVIDER")
            .unwrap_or_else(|| "hashing".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "hashing" => EmbeddingSettings::Hashing {
                dimensions: vars.parse_or("EMBEDDING_DIMENSIONS", 512)?,
            },
            "openai" => EmbeddingSettings::OpenAi {
                api_key: vars
                    .get("EMBEDDING_API_KEY")
                    .or_else(|| vars.get("OPENAI_API_KEY"))
                    .context("Required environment variable 'EMBEDDING_API_KEY' is not set")?,
                base_url: vars
                    .get("EMBEDDING_BASE_URL")
                    .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
                model: vars
                    .get("EMBEDDING_MODEL")
                    .unwrap_or_else(|| "text-embedding-3-small".to_string()),
                dimensions: vars
                    .get("EMBEDDING_DIMENSIONS")
                    .map(|v| v.parse::<usize>())
                    .transpose()
                    .context("EMBEDDING_DIMENSIONS must be a positive integer")?,
            },
            other => bail!("unknown EMBEDDING_PROVIDER '{other}' (expected hashing or openai)"),
        };

        let fetch_defaults = FetchSettings::default();
        let fetch = FetchSettings {
            selectors: vars
                .get("FETCH_SELECTORS")
                .map(|raw| split_list(&raw))
                .unwrap_or(fetch_defaults.selectors),
            wait: vars.secs_or("FETCH_WAIT_SECS", fetch_defaults.wait)?,
            max_chars: vars.parse_or("FETCH_MAX_CHARS", fetch_defaults.max_chars)?,
            user_agent: vars
                .get("FETCH_USER_AGENT")
                .unwrap_or(fetch_defaults.user_agent),
        };

        let pipeline_defaults = PipelineSettings::default();
        let pipeline = PipelineSettings {
            n_results: vars.parse_or("MATCH_RESULTS", pipeline_defaults.n_results)?,
            dedupe_matches: vars.parse_or("MATCH_DEDUPE", pipeline_defaults.dedupe_matches)?,
            call_timeout: vars.secs_or("CALL_TIMEOUT_SECS", pipeline_defaults.call_timeout)?,
            run_timeout: vars.secs_or("RUN_TIMEOUT_SECS", pipeline_defaults.run_timeout)?,
        };
        if pipeline.n_results == 0 {
            bail!("MATCH_RESULTS must be at least 1");
        }

        let default_sender = match (vars.get("SENDER_NAME"), vars.get("SENDER_COMPANY")) {
            (Some(name), Some(company)) => Some(SenderIdentity {
                name,
                company,
                email: vars.get("SENDER_EMAIL").unwrap_or_default(),
                phone: vars.get("SENDER_PHONE").unwrap_or_default(),
            }),
            _ => None,
        };

        Ok(Config {
            port: vars
                .get("PORT")
                .unwrap_or_else(|| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: vars.get("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            vectorstore_dir: vars
                .get("VECTORSTORE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("vectorstore")),
            llm,
            embedding,
            fetch,
            pipeline,
            extract_prompt_path: vars.get("EXTRACT_PROMPT_PATH").map(PathBuf::from),
            email_prompt_path: vars.get("EMAIL_PROMPT_PATH").map(PathBuf::from),
            default_sender,
        })
    }
}

struct Vars<'a, F>(&'a F);

impl<F> Vars<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Blank values count as unset.
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn parse_or<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(key) {
            Some(raw) => raw
                .trim()
                .parse::<T>()
                .map_err(|e| anyhow::anyhow!("{key} is invalid ('{raw}'): {e}")),
            None => Ok(default),
        }
    }

    fn secs_or(&self, key: &str, default: Duration) -> Result<Duration> {
        let secs: u64 = self.parse_or(key, default.as_secs())?;
        Ok(Duration::from_secs(secs))
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
