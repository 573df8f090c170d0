//! Error types for execution repositories

use conduit_core::domain::ExecutionType;
use thiserror::Error;

/// Result type alias for repository operations
pub type Result<T> = std::result::Result<T, RepositoryError>;

/// Errors that can occur when using an execution repository
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Execution id or correlation id could not be resolved
    #[error("Execution not found: {0}")]
    ExecutionNotFound(String),

    /// Pause requested for an execution that is not running
    #[error("Unpausable pipeline: {0}")]
    UnpausablePipeline(String),

    /// Resume requested for an execution that is not paused
    #[error("Unresumable pipeline: {0}")]
    UnresumablePipeline(String),

    /// Resource references a parent that does not exist
    #[error("Orphaned resource: {0}")]
    OrphanedResource(String),

    /// Non-synthetic stage passed to `add_stage`
    #[error("Only synthetic stages can be inserted ad hoc (stage: {stage_id})")]
    SyntheticStageRequired { stage_id: String },

    /// Transient failure of the underlying store (I/O, timeout, ...)
    #[error("Backend error: {message}")]
    Backend {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl RepositoryError {
    /// Create a not found error for an execution id
    pub fn not_found(execution_type: ExecutionType, id: &str) -> Self {
        Self::ExecutionNotFound(format!("No {} found for {}", execution_type, id))
    }

    /// Create a backend error from a message
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
            source: None,
        }
    }

    /// Create a backend error wrapping the underlying store error
    pub fn backend_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Backend {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Check if this error is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ExecutionNotFound(_))
    }

    /// Check if the operation may succeed when attempted again
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Backend { .. })
    }
}
