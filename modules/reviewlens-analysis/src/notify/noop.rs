use async_trait::async_trait;

use super::backend::{AlertSink, ProviderFailure, ProviderRecovery};

/// Discards every alert. Used when no webhook is configured.
pub struct NoopSink;

#[async_trait]
impl AlertSink for NoopSink {
    async fn provider_failed(&self, _event: &ProviderFailure) -> anyhow::Result<()> {
        Ok(())
    }

    async fn provider_recovered(&self, _event: &ProviderRecovery) -> anyhow::Result<()> {
        Ok(())
    }
}
