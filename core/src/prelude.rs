use serde::{Deserialize, Serialize};

/// Current status of a pipeline stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageStatus {
    /// No input has been supplied yet.
    Idle,
    /// The last recompute succeeded.
    Ready,
    /// The last recompute failed. Configuration and data failures leave an
    /// empty output; worker failures leave the previously staged output.
    Error(String),
}

/// Common error type for stage execution.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StageError {
    #[error("invalid configuration: {0}")]
    Configuration(String),
    #[error("invalid data: {0}")]
    Data(String),
    #[error("computation failed: {0}")]
    Computation(String),
}

pub type StageResult<T> = Result<T, StageError>;
