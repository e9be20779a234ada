/// Error taxonomy shared by every surface that hands results to a caller.
///
/// A failed compliance check is not listed here; it only steers the retry
/// loop and never reaches the caller.
#[derive(Debug, thiserror::Error)]
pub enum McaiError {
    #[error("Preset not allowed: {0}")]
    InvalidPreset(String),

    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("Missing {0}")]
    MissingField(&'static str),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("{provider} request failed: {detail}")]
    Provider { provider: String, detail: String },

    #[error("{0}")]
    EditorNotFound(String),

    #[error("No snapshot to revert to.")]
    NothingToRevert,

    #[error("config store {path}: {detail}")]
    Config { path: String, detail: String },
}

impl McaiError {
    /// Input errors are reported straight back and never retried.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidPreset(_) | Self::InvalidTarget(_) | Self::MissingField(_)
        )
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidPreset(_) | Self::InvalidTarget(_) | Self::MissingField(_) => 400,
            Self::Unauthorized => 401,
            Self::Provider { .. } => 502,
            Self::EditorNotFound(_) | Self::NothingToRevert => 409,
            Self::Config { .. } => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::McaiError;

    #[test]
    fn caller_errors_map_to_bad_request() {
        for err in [
            McaiError::InvalidPreset("nope".to_string()),
            McaiError::InvalidTarget("nes".to_string()),
            McaiError::MissingField("request"),
        ] {
            assert!(err.is_caller_error());
            assert_eq!(err.status_code(), 400);
        }
    }

    #[test]
    fn provider_error_is_a_service_failure() {
        let err = McaiError::Provider {
            provider: "openrouter".to_string(),
            detail: "OPENROUTER_API_KEY missing".to_string(),
        };
        assert!(!err.is_caller_error());
        assert_eq!(err.status_code(), 502);
        assert_eq!(
            err.to_string(),
            "openrouter request failed: OPENROUTER_API_KEY missing"
        );
    }

    #[test]
    fn messages_match_wire_errors() {
        assert_eq!(McaiError::MissingField("preset").to_string(), "Missing preset");
        assert_eq!(McaiError::Unauthorized.to_string(), "Unauthorized");
        assert_eq!(
            McaiError::InvalidTarget("nes".to_string()).to_string(),
            "Invalid target: nes"
        );
    }
}
