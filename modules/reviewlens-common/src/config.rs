use std::env;
use std::str::FromStr;
use std::time::Duration;

use tracing::info;

use crate::error::ReviewLensError;

/// Tunable analysis policy. Built once and handed to the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisConfig {
    /// Score at or above which a review counts as fake.
    pub fake_threshold: u8,
    /// Score at or above which an unlabeled review is called suspicious.
    pub suspicious_threshold: u8,
    /// Upper bound on reviews per provider call.
    pub chunk_size: usize,
    /// Chunk calls in flight at once within one analysis.
    pub chunk_concurrency: usize,
    pub max_fake_examples: usize,
    /// Fraction of reviews that must be scored for a run to complete.
    pub min_coverage: f64,
    pub provider_timeout: Duration,
    /// Budget for the whole attempt + fallback path.
    pub total_timeout: Duration,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            fake_threshold: 85,
            suspicious_threshold: 40,
            chunk_size: 80,
            chunk_concurrency: 2,
            max_fake_examples: 5,
            min_coverage: 0.5,
            provider_timeout: Duration::from_secs(120),
            total_timeout: Duration::from_secs(600),
        }
    }
}

impl AnalysisConfig {
    /// Defaults overridden by `REVIEWLENS_*` variables.
    pub fn from_env() -> Result<Self, ReviewLensError> {
        let defaults = Self::default();
        let config = Self {
            fake_threshold: env_or("REVIEWLENS_FAKE_THRESHOLD", defaults.fake_threshold)?,
            suspicious_threshold: env_or(
                "REVIEWLENS_SUSPICIOUS_THRESHOLD",
                defaults.suspicious_threshold,
            )?,
            chunk_size: env_or("REVIEWLENS_CHUNK_SIZE", defaults.chunk_size)?,
            chunk_concurrency: env_or("REVIEWLENS_CHUNK_CONCURRENCY", defaults.chunk_concurrency)?,
            max_fake_examples: env_or("REVIEWLENS_MAX_FAKE_EXAMPLES", defaults.max_fake_examples)?,
            min_coverage: env_or("REVIEWLENS_MIN_COVERAGE", defaults.min_coverage)?,
            provider_timeout: Duration::from_secs(env_or(
                "REVIEWLENS_PROVIDER_TIMEOUT_SECS",
                defaults.provider_timeout.as_secs(),
            )?),
            total_timeout: Duration::from_secs(env_or(
                "REVIEWLENS_TOTAL_TIMEOUT_SECS",
                defaults.total_timeout.as_secs(),
            )?),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ReviewLensError> {
        if self.fake_threshold > 100 || self.suspicious_threshold > self.fake_threshold {
            return Err(ReviewLensError::Config(format!(
                "thresholds must satisfy suspicious ({}) <= fake ({}) <= 100",
                self.suspicious_threshold, self.fake_threshold
            )));
        }
        if self.chunk_size == 0 || self.chunk_concurrency == 0 {
            return Err(ReviewLensError::Config(
                "chunk_size and chunk_concurrency must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.min_coverage) {
            return Err(ReviewLensError::Config(format!(
                "min_coverage must be within 0..=1, got {}",
                self.min_coverage
            )));
        }
        Ok(())
    }
}

fn env_or<T>(key: &str, default: T) -> Result<T, ReviewLensError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| ReviewLensError::Config(format!("{key}={raw:?}: {e}"))),
        _ => Ok(default),
    }
}

/// Provider credentials and model choices. A missing key leaves that
/// provider unavailable rather than failing startup.
#[derive(Debug, Clone, Default)]
pub struct ProviderKeys {
    pub anthropic_api_key: String,
    pub openai_api_key: String,
    pub openrouter_api_key: String,
    pub anthropic_model: String,
    pub openai_model: String,
    pub openrouter_model: String,
}

impl ProviderKeys {
    pub fn from_env() -> Self {
        Self {
            anthropic_api_key: env::var("ANTHROPIC_API_KEY").unwrap_or_default(),
            openai_api_key: env::var("OPENAI_API_KEY").unwrap_or_default(),
            openrouter_api_key: env::var("OPENROUTER_API_KEY").unwrap_or_default(),
            anthropic_model: env::var("REVIEWLENS_ANTHROPIC_MODEL")
                .unwrap_or_else(|_| "claude-3-5-haiku-20241022".to_string()),
            openai_model: env::var("REVIEWLENS_OPENAI_MODEL")
                .unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            openrouter_model: env::var("REVIEWLENS_OPENROUTER_MODEL")
                .unwrap_or_else(|_| "deepseek/deepseek-chat".to_string()),
        }
    }

    /// Log which providers have credentials, never the credentials.
    pub fn log_redacted(&self) {
        info!(
            anthropic = redact(&self.anthropic_api_key),
            anthropic_model = %self.anthropic_model,
            openai = redact(&self.openai_api_key),
            openai_model = %self.openai_model,
            openrouter = redact(&self.openrouter_api_key),
            openrouter_model = %self.openrouter_model,
            "Provider configuration"
        );
    }
}

fn redact(key: &str) -> &'static str {
    if key.trim().is_empty() {
        "missing"
    } else {
        "set"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AnalysisConfig::default();
        assert_eq!(config.fake_threshold, 85);
        assert_eq!(config.chunk_size, 80);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_inverted_thresholds() {
        let config = AnalysisConfig {
            suspicious_threshold: 90,
            ..AnalysisConfig::default()
        };
        assert!(matches!(config.validate(), Err(ReviewLensError::Config(_))));
    }

    #[test]
    fn validate_rejects_zero_chunk_size() {
        let config = AnalysisConfig {
            chunk_size: 0,
            ..AnalysisConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn env_or_parses_and_reports_bad_values() {
        // Unique keys so parallel tests don't race on the environment.
        env::set_var("REVIEWLENS_TEST_ENV_OR_OK", " 42 ");
        env::set_var("REVIEWLENS_TEST_ENV_OR_BAD", "forty");
        assert_eq!(env_or::<usize>("REVIEWLENS_TEST_ENV_OR_OK", 1).unwrap(), 42);
        assert_eq!(env_or::<usize>("REVIEWLENS_TEST_ENV_OR_UNSET", 7).unwrap(), 7);
        let err = env_or::<usize>("REVIEWLENS_TEST_ENV_OR_BAD", 1).unwrap_err();
        assert!(err.to_string().contains("REVIEWLENS_TEST_ENV_OR_BAD"));
    }

    #[test]
    fn redact_hides_values() {
        assert_eq!(redact("sk-secret"), "set");
        assert_eq!(redact("  "), "missing");
    }
}
