// Detection Module
// Scam classification core organized into specialized submodules:
// - sanitizer: Turns raw model output into a structured verdict (never fails)
// - prompts: Per content kind and per model role prompt templates
// - model_adapter: Wraps one completion endpoint and sanitizes its answer
// - aggregation: Weighted confidence, decision gate and cross-validation
// - ensemble: Runs both models concurrently and merges their verdicts
// - error: Failures that cross the classifier boundary

pub mod sanitizer;
pub mod prompts;
pub mod model_adapter;
pub mod aggregation;
pub mod ensemble;
pub mod error;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used items
pub use sanitizer::{normalize_confidence, sanitize};
pub use prompts::{prompts_for, PromptSet, PromptTemplate};
pub use model_adapter::{AdapterOutcome, ModelAdapter};
pub use aggregation::{
    combine_reasons,
    cross_validation_score,
    decide,
    decide_single,
    is_cross_validated,
    meets_threshold,
    weighted_confidence,
    EnsembleDecision,
};
pub use ensemble::EnsembleClassifier;
pub use error::{AnalysisError, ANALYSIS_FAILED_MESSAGE};
