// Cross-cutting prompt fragments shared by the extraction and composition prompts.
// Each stage keeps its own templates in generation/prompts.rs.

/// Appended to prompts whose output is parsed as JSON.
pub const JSON_ONLY_INSTRUCTION: &str = "The response must be a valid JSON object with these exact keys. \
    Do not include any additional text, markdown formatting, or code block markers.";

/// Appended to prompts whose output is shown to the user verbatim.
pub const NO_PREAMBLE_INSTRUCTION: &str = "Do not provide a preamble.";
