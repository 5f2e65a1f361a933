pub mod backend;
pub mod noop;
pub mod webhook;

pub use backend::{AlertSink, ProviderFailure, ProviderRecovery};
pub use noop::NoopSink;
pub use webhook::WebhookSink;
