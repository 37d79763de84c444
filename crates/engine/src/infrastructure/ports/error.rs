//! Error types for port operations.

use std::time::Duration;

/// Repository operation errors with context for debugging.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    /// Database operation failed - includes operation name for tracing.
    #[error("Database error in {operation}: {message}")]
    Database {
        operation: &'static str,
        message: String,
    },

    /// Serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl RepoError {
    /// Create a Database error with operation context.
    pub fn database(operation: &'static str, message: impl ToString) -> Self {
        Self::Database {
            operation,
            message: message.to_string(),
        }
    }

    /// Create a Serialization error.
    pub fn serialization(message: impl ToString) -> Self {
        Self::Serialization(message.to_string())
    }
}

/// Failure of a single provider call.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmError {
    #[error("LLM call timed out after {0:?}")]
    Timeout(Duration),
    #[error("LLM provider rate limited: {0}")]
    RateLimited(String),
    #[error("LLM request failed: {0}")]
    RequestFailed(String),
    /// The provider answered, but not with something the schema accepts.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    /// Configuration or authorization problems that retrying cannot fix.
    #[error("LLM provider unusable: {0}")]
    Fatal(String),
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ImageGenError {
    #[error("Generation failed: {0}")]
    GenerationFailed(String),
    #[error("Service unavailable")]
    Unavailable,
}

/// Media work never fails a turn; these only mark media as unavailable.
#[derive(Debug, Clone, thiserror::Error)]
pub enum MediaError {
    #[error("Media pipeline unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Render(#[from] ImageGenError),
    #[error("Could not store media: {0}")]
    Storage(String),
    #[error("Media job cancelled")]
    Cancelled,
}
