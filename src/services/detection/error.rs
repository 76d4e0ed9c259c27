// Analysis Errors
// Failures that cross the classifier boundary

use thiserror::Error;

use crate::models::ModelRole;
use crate::services::providers::ProviderError;

/// Generic text shown to end users when an analysis cannot be completed.
pub const ANALYSIS_FAILED_MESSAGE: &str = "Analysis failed, please try again.";

#[derive(Error, Debug)]
pub enum AnalysisError {
    /// The completion endpoint could not be reached or refused the call.
    #[error("{role} model call failed: {source}")]
    Transport {
        role: ModelRole,
        #[source]
        source: ProviderError,
    },
    /// Rejected before any model was invoked.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("configuration error: {0}")]
    Config(String),
}

impl AnalysisError {
    pub fn is_transport(&self) -> bool {
        matches!(self, AnalysisError::Transport { .. })
    }

    pub fn user_message(&self) -> &'static str {
        ANALYSIS_FAILED_MESSAGE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_names_role() {
        let err = AnalysisError::Transport {
            role: ModelRole::Tuned,
            source: ProviderError::ApiError {
                status: 503,
                message: "unavailable".to_string(),
            },
        };
        assert!(err.is_transport());
        let text = err.to_string();
        assert!(text.starts_with("tuned model call failed"));
        assert!(text.contains("503"));
    }

    #[test]
    fn test_invalid_input_is_not_transport() {
        let err = AnalysisError::InvalidInput("empty".to_string());
        assert!(!err.is_transport());
        assert_eq!(err.user_message(), ANALYSIS_FAILED_MESSAGE);
    }
}
