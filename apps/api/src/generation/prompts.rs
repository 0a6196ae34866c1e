// All prompt templates for the outreach pipeline.
// Templates are data: main.rs may replace either one with a file from configuration,
// so every template is validated for its placeholders when it is built.

use thiserror::Error;

use crate::llm_client::prompts::{JSON_ONLY_INSTRUCTION, NO_PREAMBLE_INSTRUCTION};

/// Placeholders the extraction template must contain.
pub const EXTRACT_PLACEHOLDERS: [&str; 1] = ["page_content"];

/// Placeholders the email template must contain. `{sender_email}`, `{sender_phone}`
/// and `{sender_contact}` are available but optional.
pub const EMAIL_PLACEHOLDERS: [&str; 4] = [
    "job_description",
    "link_list",
    "sender_name",
    "sender_company",
];

/// Extraction prompt. Replace `{page_content}` before sending.
pub fn default_extract_template() -> String {
    format!(
        r#"## SCRAPED TEXT FROM WEBSITE ##
{{page_content}}

## INSTRUCTION ##
The scraped text is from the career page of a website.
Your job is to extract the job posting details and return them in JSON format with the following keys:
'role', 'experience', 'skills', and 'description'.
'skills' must be a JSON array of strings.

{JSON_ONLY_INSTRUCTION}

## JSON OUTPUT:
"#
    )
}

/// Cold email prompt.
pub fn default_email_template() -> String {
    format!(
        r#"### JOB DESCRIPTION:
{{job_description}}

### INSTRUCTION:
You are {{sender_name}}, a business development executive at {{sender_company}}.
Your job is to write a cold email to the client regarding the job mentioned above,
describing {{sender_company}}'s capability to fulfill their needs.
Also add the most relevant ones from the following links to showcase {{sender_company}}'s portfolio: {{link_list}}
Sign the email as {{sender_name}}, {{sender_company}}. Contact details: {{sender_contact}}
Remember you are {{sender_name}} at {{sender_company}}.
{NO_PREAMBLE_INSTRUCTION}

### EMAIL (NO PREAMBLE):
"#
    )
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("prompt template is missing placeholder(s): {}", .missing.join(", "))]
pub struct TemplateError {
    pub missing: Vec<String>,
}

/// A prompt with `{name}` placeholders, substituted in a single pass.
///
/// Substituted values are never rescanned, so scraped text containing `{link_list}`
/// cannot inject into later placeholders. Unknown `{...}` spans are left as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    text: String,
}

impl PromptTemplate {
    pub fn new(text: impl Into<String>, required: &[&str]) -> Result<Self, TemplateError> {
        let text = text.into();
        let missing: Vec<String> = required
            .iter()
            .filter(|name| !text.contains(&format!("{{{name}}}")))
            .map(|name| name.to_string())
            .collect();
        if missing.is_empty() {
            Ok(Self { text })
        } else {
            Err(TemplateError { missing })
        }
    }

    pub fn extraction_default() -> Self {
        Self {
            text: default_extract_template(),
        }
    }

    pub fn email_default() -> Self {
        Self {
            text: default_email_template(),
        }
    }

    pub fn render(&self, vars: &[(&str, &str)]) -> String {
        let mut out = String::with_capacity(self.text.len());
        let mut rest = self.text.as_str();

        while let Some(start) = rest.find('{') {
            out.push_str(&rest[..start]);
            let after = &rest[start + 1..];
            let Some(end) = after.find('}') else {
                out.push_str(&rest[start..]);
                rest = "";
                break;
            };
            let name = &after[..end];
            match vars.iter().find(|(key, _)| *key == name) {
                Some((_, value)) => {
                    out.push_str(value);
                    rest = &after[end + 1..];
                }
                None => {
                    out.push('{');
                    rest = after;
                }
            }
        }

        out.push_str(rest);
        out
    }
}
