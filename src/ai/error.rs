//! Failures surfaced by reply generation

use crate::mail::BodyError;

/// Everything that can stop a generation request, in the terms the user sees.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    #[error("API key was rejected; check it with `draftwise setup`")]
    InvalidCredential,
    #[error("rate limited by the generation service, try again shortly")]
    RateLimited,
    #[error("request rejected by the content policy: {0}")]
    ContentPolicy(String),
    #[error("generation service unavailable: {0}")]
    Network(String),
    #[error("generation cancelled")]
    Cancelled,
    #[error("email has no content to reply to")]
    NoContent,
    #[error("{0}")]
    Body(String),
    #[error("generation failed: {0}")]
    Unknown(String),
}

impl GenerationError {
    /// Whether re-running the same request might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GenerationError::RateLimited | GenerationError::Network(_) | GenerationError::Cancelled
        )
    }
}

impl From<BodyError> for GenerationError {
    fn from(e: BodyError) -> Self {
        GenerationError::Body(e.to_string())
    }
}
