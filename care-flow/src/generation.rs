use async_trait::async_trait;

use crate::error::GenerationError;
use crate::store::Turn;

/// Contract for the external text-generation capability.
///
/// Implementations wrap a concrete model provider; the orchestration core
/// only sees this seam. Both failure modes are handler-level failures, not
/// turn-level ones.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Produce a completion for `input` given a system prompt and the
    /// conversation so far.
    async fn generate(
        &self,
        prompt: &str,
        history: &[Turn],
        input: &str,
    ) -> std::result::Result<String, GenerationError>;
}
