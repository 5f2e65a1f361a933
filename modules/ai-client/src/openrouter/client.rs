use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use tracing::debug;

use crate::error::AiError;
use crate::openai::types::{ChatRequest, ChatResponse};
use crate::transport::{http_client, post_json};

const OPENROUTER_API_URL: &str = "https://openrouter.ai/api/v1";

pub(crate) struct OpenRouterClient {
    api_key: String,
    http: reqwest::Client,
    app_name: Option<String>,
    site_url: Option<String>,
}

impl OpenRouterClient {
    pub fn new(api_key: &str, timeout: Duration) -> Result<Self, AiError> {
        Ok(Self {
            api_key: api_key.to_string(),
            http: http_client(timeout)?,
            app_name: None,
            site_url: None,
        })
    }

    pub fn with_app_name(mut self, name: &str) -> Self {
        self.app_name = Some(name.to_string());
        self
    }

    pub fn with_site_url(mut self, url: &str) -> Self {
        self.site_url = Some(url.to_string());
        self
    }

    fn headers(&self) -> Result<HeaderMap, AiError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        // Attribution headers are optional; a bad value is dropped, not fatal.
        if let Some(val) = self.site_url.as_deref().and_then(|u| HeaderValue::from_str(u).ok()) {
            headers.insert("HTTP-Referer", val);
        }
        if let Some(val) = self.app_name.as_deref().and_then(|n| HeaderValue::from_str(n).ok()) {
            headers.insert("X-Title", val);
        }

        Ok(headers)
    }

    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AiError> {
        let url = format!("{}/chat/completions", OPENROUTER_API_URL);

        debug!(model = %request.model, "OpenRouter chat request");

        post_json(&self.http, &url, self.headers()?, request).await
    }
}
