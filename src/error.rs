//! Error types for artifact loading and scoring

use std::path::PathBuf;
use thiserror::Error;

/// Fatal startup errors. A process that hits one of these must not serve traffic.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact not found: {}", .0.display())]
    Missing(PathBuf),

    #[error("failed to read artifact {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse artifact {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid artifact: {0}")]
    Invalid(String),

    #[error("artifacts are inconsistent: {0}")]
    Inconsistent(String),

    #[error("failed to load classifier: {0}")]
    Classifier(String),
}

/// Per-request errors returned by the scoring pipeline.
#[derive(Debug, Error)]
pub enum PredictError {
    /// The payload is not a single flat key-value object.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The classifier failed or returned an unusable probability.
    #[error("scoring failed: {0}")]
    Scoring(String),
}

impl PredictError {
    /// Stable machine-readable kind used in replies and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            PredictError::InvalidInput(_) => "invalid_input",
            PredictError::Scoring(_) => "scoring_failed",
        }
    }

    /// Whether the caller is at fault.
    pub fn is_client_error(&self) -> bool {
        matches!(self, PredictError::InvalidInput(_))
    }
}
