mod client;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::AiError;
use crate::openai::types::{ChatRequest, WireMessage};
use crate::schema::StructuredOutput;
use crate::traits::{Completion, StructuredAgent};
use crate::transport::DEFAULT_TIMEOUT;
use crate::util::extract_json_object;

use client::OpenRouterClient;

// =============================================================================
// OpenRouter Agent
// =============================================================================

/// OpenRouter gateway. Routes to many upstream models (DeepSeek, Llama, ...)
/// through the OpenAI chat-completions dialect.
#[derive(Clone)]
pub struct OpenRouter {
    api_key: String,
    pub(crate) model: String,
    app_name: Option<String>,
    site_url: Option<String>,
    timeout: Duration,
    max_tokens: u32,
}

impl OpenRouter {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            app_name: None,
            site_url: None,
            timeout: DEFAULT_TIMEOUT,
            max_tokens: 8192,
        }
    }

    pub fn from_env(model: impl Into<String>) -> Result<Self, AiError> {
        let api_key = std::env::var("OPENROUTER_API_KEY").map_err(|_| {
            AiError::Config("OPENROUTER_API_KEY environment variable not set".into())
        })?;
        Ok(Self::new(api_key, model))
    }

    pub fn with_app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = Some(name.into());
        self
    }

    pub fn with_site_url(mut self, url: impl Into<String>) -> Self {
        self.site_url = Some(url.into());
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

    fn client(&self) -> Result<OpenRouterClient, AiError> {
        let mut client = OpenRouterClient::new(&self.api_key, self.timeout)?;
        if let Some(ref name) = self.app_name {
            client = client.with_app_name(name);
        }
        if let Some(ref url) = self.site_url {
            client = client.with_site_url(url);
        }
        Ok(client)
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
            .ok_or_else(|| AiError::Parse("No response from OpenRouter".into()))
    }
}

// =============================================================================
// StructuredAgent Implementation
// =============================================================================

#[async_trait]
impl StructuredAgent for OpenRouter {
    fn provider(&self) -> &'static str {
        "openrouter"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    /// Not every upstream model honors `json_schema`; responses wrapped in
    /// prose or code fences are unwrapped before decoding.
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

        let content = response
            .into_content()
            .ok_or_else(|| AiError::Parse("No response from OpenRouter".into()))?;
        let json_str = extract_json_object(&content)
            .ok_or_else(|| AiError::Parse("No JSON object in OpenRouter response".into()))?;
        let value = serde_json::from_str(json_str).map_err(|e| {
            AiError::Parse(format!("Failed to deserialize {}: {e}", T::type_name()))
        })?;

        Ok(Completion { value, usage })
    }
}
