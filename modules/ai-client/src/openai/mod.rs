mod client;
pub(crate) mod types;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::AiError;
use crate::schema::StructuredOutput;
use crate::traits::{Completion, StructuredAgent};
use crate::transport::DEFAULT_TIMEOUT;

use client::OpenAiClient;
use types::{ChatRequest, WireMessage};

// =============================================================================
// OpenAi Agent
// =============================================================================

#[derive(Clone)]
pub struct OpenAi {
    api_key: String,
    pub(crate) model: String,
    base_url: Option<String>,
    timeout: Duration,
    max_tokens: u32,
}

impl OpenAi {
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
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| AiError::Config("OPENAI_API_KEY environment variable not set".into()))?;
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

    /// Get the model name.
    pub fn model(&self) -> &str {
        &self.model
    }

    fn client(&self) -> Result<OpenAiClient, AiError> {
        let client = OpenAiClient::new(&self.api_key, self.timeout)?;
        Ok(match self.base_url {
            Some(ref url) => client.with_base_url(url),
            None => client,
        })
    }

    /// Simple chat completion.
    pub async fn chat_completion(
        &self,
        system: impl Into<String>,
        user: impl Into<String>,
    ) -> Result<String, AiError> {
        let request = ChatRequest::new(&self.model)
            .message(WireMessage::system(system))
            .message(WireMessage::user(user))
            .limits_for_model(self.max_tokens);

        self.client()?
            .chat(&request)
            .await?
            .into_content()
            .ok_or_else(|| AiError::Parse("No response from OpenAI".into()))
    }
}

// =============================================================================
// StructuredAgent Implementation
// =============================================================================

#[async_trait]
impl StructuredAgent for OpenAi {
    fn provider(&self) -> &'static str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    async fn extract<T>(&self, system: &str, user: &str) -> Result<Completion<T>, AiError>
    where
        T: StructuredOutput + Send + 'static,
    {
        let request = ChatRequest::new(&self.model)
            .message(WireMessage::system(system))
            .message(WireMessage::user(user))
            .limits_for_model(self.max_tokens)
            .json_schema(T::strict_schema());

        let response = self.client()?.chat(&request).await?;
        let usage = response.usage.map(Into::into);

        let json_str = response
            .into_content()
            .ok_or_else(|| AiError::Parse("No response from OpenAI".into()))?;
        let value = serde_json::from_str(&json_str).map_err(|e| {
            AiError::Parse(format!("Failed to deserialize {}: {e}", T::type_name()))
        })?;

        Ok(Completion { value, usage })
    }
}
