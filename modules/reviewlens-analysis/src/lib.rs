pub mod chunked;
pub mod dedup;
pub mod health;
pub mod jobs;
pub mod normalize;
pub mod notify;
pub mod orchestrator;
pub mod providers;
pub mod reconcile;
pub mod router;
pub mod store;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use chunked::{AnalysisOutcome, ChunkedAnalyzer};
pub use health::{HealthTracker, HealthTransition, ProviderHealthTracker};
pub use jobs::{AnalysisQueue, QueueError};
pub use orchestrator::{AnalysisOrchestrator, AnalysisReport, AnalysisRequest};
pub use providers::{LlmAnalyzer, Pricing, ReviewAnalyzer};
pub use reconcile::{MetricsReconciler, ReconciledMetrics};
pub use router::ProviderRouter;
