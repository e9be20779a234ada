use serde::{Deserialize, Serialize};

use crate::error::McaiError;
use crate::targets::Target;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub target: Target,
    pub request_text: String,
    pub current_code: Option<String>,
}

impl GenerationRequest {
    pub fn new(
        target: Target,
        request_text: &str,
        current_code: Option<&str>,
    ) -> Result<Self, McaiError> {
        if request_text.trim().is_empty() {
            return Err(McaiError::MissingField("request"));
        }
        Ok(Self {
            target,
            request_text: request_text.to_string(),
            current_code: current_code
                .filter(|code| !code.trim().is_empty())
                .map(str::to_string),
        })
    }
}

/// What a caller gets back. `code` is never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationOutcome {
    pub code: String,
    pub feedback: Vec<String>,
}
