// Scam Checker Core Services

pub mod config_store;
pub mod providers;
pub mod media;
pub mod detection;

pub use config_store::*;
pub use providers::*;
pub use media::*;

// Re-export detection entry points
pub use detection::{
    prompts_for,
    sanitize,
    AnalysisError,
    EnsembleClassifier,
    ModelAdapter,
    ANALYSIS_FAILED_MESSAGE,
};
