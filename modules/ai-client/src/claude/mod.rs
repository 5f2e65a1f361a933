mod client;
pub(crate) mod types;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::AiError;
use crate::schema::StructuredOutput;
use crate::traits::{Completion, StructuredAgent};
use crate::transport::DEFAULT_TIMEOUT;

use client::ClaudeClient;
use types::*;

const STRUCTURED_TOOL: &str = "structured_response";

// =============================================================================
// Claude Agent
// =============================================================================

#[derive(Clone)]
pub struct Claude {
    api_key: String,
    pub(crate) model: String,
    base_url: Option<String>,
    timeout: Duration,
    max_tokens: u32,
}

impl Claude {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: None,
            timeout: DEFAULT_TIMEOUT,
            max_tokens: 8192,
        }
    }

    pub fn from_env(model: impl Into<String>) -> Result<Self, AiError> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| AiError::Config("ANTHROPIC_API_KEY environment variable not set".into()))?;
        Ok(Self::new(api_key, model))
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn client(&self) -> Result<ClaudeClient, AiError> {
        let client = ClaudeClient::new(&self.api_key, self.timeout)?;
        Ok(match self.base_url {
            Some(ref url) => client.with_base_url(url),
            None => client,
        })
    }

    pub async fn chat_completion(
        &self,
        system: impl Into<String>,
        user: impl Into<String>,
    ) -> Result<String, AiError> {
        let request = ChatRequest::new(&self.model)
            .system(system)
            .message(WireMessage::user(user))
            .max_tokens(self.max_tokens)
            .temperature(0.0);

        let response = self.client()?.chat(&request).await?;

        response
            .text()
            .ok_or_else(|| AiError::Parse("No text in Claude response".into()))
    }
}

// =============================================================================
// StructuredAgent Implementation
// =============================================================================

#[async_trait]
impl StructuredAgent for Claude {
    fn provider(&self) -> &'static str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    /// Structured output via a forced tool call whose input schema is `T`.
    async fn extract<T>(&self, system: &str, user: &str) -> Result<Completion<T>, AiError>
    where
        T: StructuredOutput + Send + 'static,
    {
        let request = ChatRequest::new(&self.model)
            .system(system)
            .message(WireMessage::user(user))
            .max_tokens(self.max_tokens)
            .temperature(0.0)
            .forced_tool(ToolDefinitionWire {
                name: STRUCTURED_TOOL.to_string(),
                description: "Return the structured analysis of the input.".to_string(),
                input_schema: T::strict_schema(),
            });

        let response = self.client()?.chat(&request).await?;

        let input = response
            .tool_input(STRUCTURED_TOOL)
            .ok_or_else(|| AiError::Parse("No structured output in Claude response".into()))?;
        let value = T::deserialize(input).map_err(|e| {
            AiError::Parse(format!("Failed to deserialize {}: {e}", T::type_name()))
        })?;

        Ok(Completion {
            value,
            usage: response.usage.map(Into::into),
        })
    }
}
