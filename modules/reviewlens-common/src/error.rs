use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReviewLensError {
    /// `last_error` carries the failure that excluded the last provider.
    #[error("No analysis provider available{}", unavailable_detail(.excluded, .last_error))]
    ProviderUnavailable {
        excluded: Vec<String>,
        last_error: Option<String>,
    },

    #[error("Provider {provider} call failed ({kind}): {message}")]
    ProviderCallFailed {
        provider: String,
        kind: ErrorKind,
        message: String,
    },

    #[error("Data integrity violation: {0}")]
    DataIntegrityViolation(String),

    #[error("Reconciliation left no reviews out of {input} submitted")]
    ReconciliationImpossible { input: usize },

    #[error("Analysis exceeded its time budget of {0}s")]
    BudgetExceeded(u64),

    #[error("Storage error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

fn unavailable_detail(excluded: &[String], last_error: &Option<String>) -> String {
    let mut detail = String::new();
    if !excluded.is_empty() {
        detail.push_str(&format!(" (excluded: {})", excluded.join(", ")));
    }
    if let Some(last) = last_error {
        detail.push_str(&format!("; last error: {last}"));
    }
    detail
}

/// Classification of a provider failure, carried on alert events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Network,
    Timeout,
    Api,
    RateLimited,
    Parse,
    Config,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Network => "network",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Api => "api",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Parse => "parse",
            ErrorKind::Config => "config",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_unavailable_lists_exclusions() {
        let none = ReviewLensError::ProviderUnavailable {
            excluded: vec![],
            last_error: None,
        };
        assert_eq!(none.to_string(), "No analysis provider available");

        let some = ReviewLensError::ProviderUnavailable {
            excluded: vec!["openai".into(), "anthropic".into()],
            last_error: None,
        };
        assert_eq!(
            some.to_string(),
            "No analysis provider available (excluded: openai, anthropic)"
        );
    }

    #[test]
    fn provider_unavailable_keeps_last_failure() {
        let err = ReviewLensError::ProviderUnavailable {
            excluded: vec!["only".into()],
            last_error: Some("Provider only call failed (api): status 500".into()),
        };
        assert_eq!(
            err.to_string(),
            "No analysis provider available (excluded: only); last error: Provider only call failed (api): status 500"
        );
    }

    #[test]
    fn call_failed_message_names_kind() {
        let err = ReviewLensError::ProviderCallFailed {
            provider: "openai".into(),
            kind: ErrorKind::Timeout,
            message: "chunk 2 timed out".into(),
        };
        assert_eq!(
            err.to_string(),
            "Provider openai call failed (timeout): chunk 2 timed out"
        );
    }
}
