// Outreach generation: job extraction, email composition and the run pipeline.
// All LLM calls go through llm_client; nothing here talks to a provider directly.

pub mod composer;
pub mod handlers;
pub mod jd_parser;
pub mod pipeline;
pub mod prompts;
