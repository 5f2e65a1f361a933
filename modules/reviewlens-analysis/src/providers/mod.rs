pub mod llm;
pub mod prompt;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use ai_client::{AiError, TokenUsage};
use reviewlens_common::{ErrorKind, Review};

pub use llm::LlmAnalyzer;

// =============================================================================
// Pricing
// =============================================================================

/// Assumed prompt footprint of one review.
pub const INPUT_TOKENS_PER_REVIEW: u64 = 120;
/// Assumed verdict footprint of one review.
pub const OUTPUT_TOKENS_PER_REVIEW: u64 = 60;
/// System prompt and framing sent with every call.
pub const PROMPT_OVERHEAD_TOKENS: u64 = 600;

/// USD per million tokens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Pricing {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl Pricing {
    pub const fn new(input_per_million: f64, output_per_million: f64) -> Self {
        Self {
            input_per_million,
            output_per_million,
        }
    }

    /// Deterministic cost estimate for analyzing `review_count` reviews in
    /// batches of at most `max_batch_size`.
    pub fn estimate(&self, review_count: usize, max_batch_size: usize) -> f64 {
        if review_count == 0 {
            return 0.0;
        }
        let calls = review_count.div_ceil(max_batch_size.max(1)) as u64;
        let n = review_count as u64;
        let input_tokens = n * INPUT_TOKENS_PER_REVIEW + calls * PROMPT_OVERHEAD_TOKENS;
        let output_tokens = n * OUTPUT_TOKENS_PER_REVIEW;

        (input_tokens as f64 * self.input_per_million
            + output_tokens as f64 * self.output_per_million)
            / 1_000_000.0
    }
}

// =============================================================================
// Provider output
// =============================================================================

/// One review verdict as the provider returned it, before validation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawVerdict {
    pub review_id: String,
    /// Unclamped; providers occasionally answer outside 0-100.
    pub score: i64,
    pub label: Option<String>,
    pub confidence: Option<f64>,
    pub explanation: Option<String>,
    pub red_flags: Vec<String>,
}

/// Everything one provider call produced for one chunk.
#[derive(Debug, Clone, Default)]
pub struct ProviderBatch {
    pub verdicts: Vec<RawVerdict>,
    pub key_patterns: Vec<String>,
    pub usage: Option<TokenUsage>,
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind}: {message}")]
pub struct ProviderError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<AiError> for ProviderError {
    fn from(e: AiError) -> Self {
        let kind = match &e {
            AiError::Config(_) => ErrorKind::Config,
            AiError::Network(_) => ErrorKind::Network,
            AiError::Timeout(_) => ErrorKind::Timeout,
            AiError::Api { status: 429, .. } => ErrorKind::RateLimited,
            AiError::Api { .. } => ErrorKind::Api,
            AiError::Parse(_) => ErrorKind::Parse,
        };
        Self::new(kind, e.to_string())
    }
}

// =============================================================================
// ReviewAnalyzer
// =============================================================================

/// A backend that scores reviews for authenticity. The router and the
/// chunked analyzer depend only on this trait.
#[async_trait]
pub trait ReviewAnalyzer: Send + Sync {
    /// Stable identifier used for routing, health and alerts.
    fn name(&self) -> &str;

    /// False when the backend is not configured (e.g. no API key).
    fn is_available(&self) -> bool;

    /// Most reviews accepted in one call.
    fn max_batch_size(&self) -> usize;

    fn pricing(&self) -> Pricing;

    fn estimated_cost(&self, review_count: usize) -> f64 {
        self.pricing().estimate(review_count, self.max_batch_size())
    }

    /// Score one chunk. Callers keep chunks within `max_batch_size`.
    async fn analyze(&self, reviews: &[Review]) -> Result<ProviderBatch, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_counts_overhead_per_call() {
        let pricing = Pricing::new(1.0, 2.0);
        // 100 reviews in batches of 40 -> 3 calls.
        let expected = ((100 * 120 + 3 * 600) as f64 * 1.0 + (100 * 60) as f64 * 2.0) / 1e6;
        assert!((pricing.estimate(100, 40) - expected).abs() < 1e-12);
    }

    #[test]
    fn estimate_is_zero_for_no_reviews() {
        assert_eq!(Pricing::new(3.0, 15.0).estimate(0, 50), 0.0);
    }

    #[test]
    fn estimate_grows_with_review_count() {
        let pricing = Pricing::new(0.15, 0.6);
        let mut previous = 0.0;
        for n in 1..300 {
            let cost = pricing.estimate(n, 80);
            assert!(cost > previous);
            previous = cost;
        }
    }

    #[test]
    fn ai_errors_map_to_kinds() {
        let rate = ProviderError::from(AiError::Api {
            status: 429,
            message: "slow down".into(),
        });
        assert_eq!(rate.kind, ErrorKind::RateLimited);

        let server = ProviderError::from(AiError::Api {
            status: 503,
            message: "unavailable".into(),
        });
        assert_eq!(server.kind, ErrorKind::Api);

        let parse = ProviderError::from(AiError::Parse("bad json".into()));
        assert_eq!(parse.kind, ErrorKind::Parse);
    }
}
