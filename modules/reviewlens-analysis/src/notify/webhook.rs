use async_trait::async_trait;
use serde_json::json;
use tracing::warn;

use super::backend::{AlertSink, ProviderFailure, ProviderRecovery};

/// Slack-compatible incoming webhook. Posts `{"text": ...}` plus the raw
/// event under `event` for receivers that parse it.
pub struct WebhookSink {
    webhook_url: String,
    http: reqwest::Client,
}

impl WebhookSink {
    pub fn new(webhook_url: impl Into<String>) -> Self {
        Self {
            webhook_url: webhook_url.into(),
            http: reqwest::Client::new(),
        }
    }

    /// `None` when `ALERT_WEBHOOK_URL` is unset or blank.
    pub fn from_env() -> Option<Self> {
        std::env::var("ALERT_WEBHOOK_URL")
            .ok()
            .filter(|url| !url.trim().is_empty())
            .map(Self::new)
    }

    async fn post(&self, payload: serde_json::Value) -> anyhow::Result<()> {
        let resp = self
            .http
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "Alert webhook returned non-success");
            anyhow::bail!("Alert webhook returned {status}");
        }

        Ok(())
    }
}

fn failure_text(event: &ProviderFailure) -> String {
    format!(
        ":rotating_light: *Provider failure: {}*\n*Kind:* {}\n*Context:* {}\n\n{}",
        event.provider, event.error_kind, event.context, event.message,
    )
}

fn recovery_text(event: &ProviderRecovery) -> String {
    format!(
        ":white_check_mark: *Provider recovered: {}* after {} consecutive failure(s)",
        event.provider, event.after_failures,
    )
}

#[async_trait]
impl AlertSink for WebhookSink {
    async fn provider_failed(&self, event: &ProviderFailure) -> anyhow::Result<()> {
        self.post(json!({
            "text": failure_text(event),
            "unfurl_links": false,
            "event": event,
        }))
        .await
    }

    async fn provider_recovered(&self, event: &ProviderRecovery) -> anyhow::Result<()> {
        self.post(json!({
            "text": recovery_text(event),
            "unfurl_links": false,
            "event": event,
        }))
        .await
    }
}
