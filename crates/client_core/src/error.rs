use shared::domain::Category;
use thiserror::Error;

/// Failure taxonomy shared by every workflow operation. Errors are cloneable because the last
/// failure of each slot stays visible in the projections handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("document {category}/{identifier} not found")]
    NotFound {
        category: Category,
        identifier: String,
    },
    #[error("document rejected by backend: {0}")]
    ValidationError(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),
    #[error("generation failed: {0}")]
    GenerationError(String),
    #[error("document cannot be saved: {0}")]
    NotSavable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Transport,
    Missing,
    Validation,
    Generation,
}

impl WorkflowError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            WorkflowError::BackendUnavailable(_) => ErrorCategory::Transport,
            WorkflowError::NotFound { .. } => ErrorCategory::Missing,
            WorkflowError::ValidationError(_)
            | WorkflowError::InvalidInput(_)
            | WorkflowError::InvalidIdentifier(_)
            | WorkflowError::NotSavable(_) => ErrorCategory::Validation,
            WorkflowError::GenerationError(_) => ErrorCategory::Generation,
        }
    }
}
