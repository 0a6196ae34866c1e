use serde::{Deserialize, Serialize};

/// Identity the outreach email is written on behalf of.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderIdentity {
    pub name: String,
    pub company: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
}

impl SenderIdentity {
    /// Returns the names of required fields that are blank.
    /// Only `name` and `company` are required; contact details are optional.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.name.trim().is_empty() {
            missing.push("name");
        }
        if self.company.trim().is_empty() {
            missing.push("company");
        }
        missing
    }
}
