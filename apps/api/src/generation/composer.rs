//! Email Composer: writes the cold email for one job from its matched portfolio links.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::generation::prompts::PromptTemplate;
use crate::llm_client::{LlmError, TextCompletion};
use crate::models::job::JobRecord;
use crate::models::portfolio::MatchResult;
use crate::models::sender::SenderIdentity;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("completion failed: {0}")]
    Completion(#[from] LlmError),

    #[error("failed to serialize prompt input: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Clone)]
pub struct EmailComposer {
    llm: Arc<dyn TextCompletion>,
    template: PromptTemplate,
}

impl EmailComposer {
    pub fn new(llm: Arc<dyn TextCompletion>) -> Self {
        Self::with_template(llm, PromptTemplate::email_default())
    }

    pub fn with_template(llm: Arc<dyn TextCompletion>, template: PromptTemplate) -> Self {
        Self { llm, template }
    }

    /// Renders the email prompt. The same inputs always give the same prompt.
    pub fn render_prompt(
        &self,
        job: &JobRecord,
        links: &MatchResult,
        sender: &SenderIdentity,
    ) -> Result<String, GenerationError> {
        let job_description = serde_json::to_string_pretty(job)?;
        let link_list = serde_json::to_string(links)?;
        let contact = sender_contact(sender);

        Ok(self.template.render(&[
            ("job_description", job_description.as_str()),
            ("link_list", link_list.as_str()),
            ("sender_name", sender.name.trim()),
            ("sender_company", sender.company.trim()),
            ("sender_email", sender.email.trim()),
            ("sender_phone", sender.phone.trim()),
            ("sender_contact", contact.as_str()),
        ]))
    }

    /// One completion; the response text is returned as-is.
    pub async fn compose(
        &self,
        job: &JobRecord,
        links: &MatchResult,
        sender: &SenderIdentity,
    ) -> Result<String, GenerationError> {
        let prompt = self.render_prompt(job, links, sender)?;
        let email = self.llm.complete(&prompt).await?;
        info!(
            "Composed email for '{}' ({} chars, {} links offered)",
            job.role,
            email.chars().count(),
            links.len()
        );
        Ok(email)
    }
}

fn sender_contact(sender: &SenderIdentity) -> String {
    let parts: Vec<&str> = [sender.email.trim(), sender.phone.trim()]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect();
    if parts.is_empty() {
        "not provided".to_string()
    } else {
        parts.join(" | ")
    }
}
