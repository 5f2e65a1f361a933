use serde::{Deserialize, Serialize};

use crate::traits::TokenUsage;

// Chat-completions wire format. OpenRouter speaks the same dialect and
// reuses these types.

// =============================================================================
// Messages
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct WireMessage {
    pub role: Role,
    #[serde(default)]
    pub content: Option<String>,
}

impl WireMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: Some(content.into()),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Some(content.into()),
        }
    }
}

// =============================================================================
// Chat Request
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ChatRequest {
    pub model: String,
    pub messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<serde_json::Value>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            messages: Vec::new(),
            temperature: None,
            max_tokens: None,
            max_completion_tokens: None,
            response_format: None,
        }
    }

    pub fn message(mut self, message: WireMessage) -> Self {
        self.messages.push(message);
        self
    }

    /// Apply the token limit and temperature the model family accepts.
    /// Reasoning models reject `max_tokens` and a non-default temperature.
    pub fn limits_for_model(mut self, max_tokens: u32) -> Self {
        if uses_max_completion_tokens(&self.model) {
            self.max_completion_tokens = Some(max_tokens);
        } else {
            self.max_tokens = Some(max_tokens);
            self.temperature = Some(0.0);
        }
        self
    }

    pub fn json_schema(mut self, schema: serde_json::Value) -> Self {
        self.response_format = Some(serde_json::json!({
            "type": "json_schema",
            "json_schema": {
                "name": "structured_response",
                "strict": true,
                "schema": schema,
            }
        }));
        self
    }
}

// =============================================================================
// Chat Response
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ChatResponse {
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

impl ChatResponse {
    pub fn into_content(self) -> Option<String> {
        self.choices.into_iter().next().and_then(|c| c.message.content)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Choice {
    pub message: WireMessage,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub(crate) struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl From<Usage> for TokenUsage {
    fn from(u: Usage) -> Self {
        TokenUsage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
        }
    }
}

// =============================================================================
// Utilities
// =============================================================================

/// Check if a model requires max_completion_tokens instead of max_tokens.
pub(crate) fn uses_max_completion_tokens(model: &str) -> bool {
    model.starts_with("o1")
        || model.starts_with("o3")
        || model.starts_with("o4")
        || model.starts_with("gpt-5")
        || model.contains("-o1")
        || model.contains("-o3")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reasoning_models_use_completion_token_limit() {
        let request = ChatRequest::new("gpt-5-mini").limits_for_model(2048);
        assert_eq!(request.max_completion_tokens, Some(2048));
        assert_eq!(request.max_tokens, None);
        assert_eq!(request.temperature, None);
    }

    #[test]
    fn chat_models_use_max_tokens_and_zero_temperature() {
        let request = ChatRequest::new("gpt-4o-mini").limits_for_model(2048);
        assert_eq!(request.max_tokens, Some(2048));
        assert_eq!(request.temperature, Some(0.0));
    }

    #[test]
    fn json_schema_response_format_is_strict() {
        let request =
            ChatRequest::new("gpt-4o-mini").json_schema(serde_json::json!({"type": "object"}));
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["response_format"]["type"], "json_schema");
        assert_eq!(body["response_format"]["json_schema"]["strict"], true);
    }

    #[test]
    fn usage_maps_to_token_usage() {
        let raw = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "{}"}}],
            "usage": {"prompt_tokens": 100, "completion_tokens": 20, "total_tokens": 120}
        });
        let response: ChatResponse = serde_json::from_value(raw).unwrap();
        let usage: TokenUsage = response.usage.unwrap().into();
        assert_eq!(usage.total(), 120);
        assert_eq!(response.into_content().as_deref(), Some("{}"));
    }
}
