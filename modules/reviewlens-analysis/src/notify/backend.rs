use async_trait::async_trait;
use serde::Serialize;

use reviewlens_common::ErrorKind;

/// Raw failure signal for one provider call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderFailure {
    pub provider: String,
    pub error_kind: ErrorKind,
    pub message: String,
    /// Where the call happened, e.g. `us/B00TEST chunk 2/3`.
    pub context: String,
}

/// First success after a failure streak.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderRecovery {
    pub provider: String,
    pub after_failures: u64,
}

/// Pluggable destination for provider alerts. Thresholds and escalation
/// live with the receiver, not here.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn provider_failed(&self, event: &ProviderFailure) -> anyhow::Result<()>;

    async fn provider_recovered(&self, event: &ProviderRecovery) -> anyhow::Result<()>;
}
