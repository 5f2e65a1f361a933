pub mod config;
pub mod error;
pub mod grade;
pub mod types;

pub use config::{AnalysisConfig, ProviderKeys};
pub use error::{ErrorKind, ReviewLensError};
pub use grade::Grade;
pub use types::*;
