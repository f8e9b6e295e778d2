use thiserror::Error;

pub type Result<T> = std::result::Result<T, CareError>;

/// Error taxonomy for the orchestration core.
#[derive(Debug, Error)]
pub enum CareError {
    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("routing error: {0}")]
    Routing(String),

    #[error("handler {handler} failed: {message}")]
    HandlerFailure { handler: String, message: String },

    #[error("document persistence failed: {0}")]
    Persistence(String),

    #[error("invalid request: {0}")]
    Validation(String),

    #[error(transparent)]
    Generation(#[from] GenerationError),
}

impl CareError {
    /// Stable machine-readable kind, surfaced verbatim in API error bodies
    /// and terminal stream events.
    pub fn kind(&self) -> &'static str {
        match self {
            CareError::SessionNotFound(_) => "not_found",
            CareError::Routing(_) => "routing_error",
            CareError::HandlerFailure { .. } => "handler_failure",
            CareError::Generation(_) => "handler_failure",
            CareError::Persistence(_) => "persistence_error",
            CareError::Validation(_) => "validation_error",
        }
    }
}

/// Failure modes of the external text-generation capability.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation backend unavailable: {0}")]
    Unavailable(String),

    #[error("generation backend rate limited")]
    RateLimited,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(CareError::SessionNotFound("x".into()).kind(), "not_found");
        assert_eq!(CareError::Routing("x".into()).kind(), "routing_error");
        assert_eq!(
            CareError::Generation(GenerationError::RateLimited).kind(),
            "handler_failure"
        );
        assert_eq!(CareError::Validation("x".into()).kind(), "validation_error");
    }
}
