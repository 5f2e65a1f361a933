use async_trait::async_trait;

use crate::error::AiError;
use crate::schema::StructuredOutput;

// =============================================================================
// Completion
// =============================================================================

/// Token counts reported by the provider for one request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// A typed response plus the usage the provider billed for it.
#[derive(Debug, Clone)]
pub struct Completion<T> {
    pub value: T,
    /// `None` when the provider omitted usage from the response.
    pub usage: Option<TokenUsage>,
}

// =============================================================================
// StructuredAgent Trait
// =============================================================================

/// An LLM backend that can answer a system/user prompt pair with JSON
/// matching the schema of `T`.
#[async_trait]
pub trait StructuredAgent: Clone + Send + Sync {
    /// Short provider identifier, e.g. `"anthropic"`.
    fn provider(&self) -> &'static str;

    fn model(&self) -> &str;

    /// False when the agent has no credentials and every call would fail.
    fn is_configured(&self) -> bool;

    async fn extract<T>(&self, system: &str, user: &str) -> Result<Completion<T>, AiError>
    where
        T: StructuredOutput + Send + 'static;
}
