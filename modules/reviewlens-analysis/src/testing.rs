// Test mocks for the analysis pipeline.
//
// - MockAnalyzer (ReviewAnalyzer): scripted scores, failures and delays
// - RecordingAlertSink (AlertSink): keeps every alert for assertions
//
// Plus review fixtures.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use ai_client::TokenUsage;
use reviewlens_common::{ErrorKind, Review};

use crate::notify::{AlertSink, ProviderFailure, ProviderRecovery};
use crate::providers::{Pricing, ProviderBatch, ProviderError, RawVerdict, ReviewAnalyzer};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// `n` reviews with ids `r0..r{n-1}`, unique text, ratings cycling 1-5.
pub fn review_set(n: usize) -> Vec<Review> {
    (0..n)
        .map(|i| review(&format!("r{i}"), &format!("Review number {i} about the product"), (i % 5) as u8 + 1))
        .collect()
}

pub fn review(id: &str, text: &str, rating: u8) -> Review {
    Review {
        id: id.to_string(),
        text: text.to_string(),
        rating,
        verified: true,
        posted_at: None,
    }
}

// ---------------------------------------------------------------------------
// MockAnalyzer
// ---------------------------------------------------------------------------

/// Scripted provider. Every review gets `default_score` unless overridden.
/// Chunks are addressed by a review id they contain, since concurrent chunk
/// calls may start in any order.
pub struct MockAnalyzer {
    name: String,
    available: bool,
    max_batch_size: usize,
    pricing: Pricing,
    default_score: i64,
    scores: HashMap<String, i64>,
    explanations: HashMap<String, String>,
    key_patterns: Vec<String>,
    extra_verdicts: Vec<RawVerdict>,
    fail_all: Option<ErrorKind>,
    chunk_failures: HashMap<String, ErrorKind>,
    chunk_delays: HashMap<String, Duration>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl MockAnalyzer {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            available: true,
            max_batch_size: 100,
            pricing: Pricing::new(1.0, 2.0),
            default_score: 10,
            scores: HashMap::new(),
            explanations: HashMap::new(),
            key_patterns: Vec::new(),
            extra_verdicts: Vec::new(),
            fail_all: None,
            chunk_failures: HashMap::new(),
            chunk_delays: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    pub fn with_max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = size;
        self
    }

    pub fn with_pricing(mut self, input_per_million: f64, output_per_million: f64) -> Self {
        self.pricing = Pricing::new(input_per_million, output_per_million);
        self
    }

    pub fn with_default_score(mut self, score: i64) -> Self {
        self.default_score = score;
        self
    }

    /// Raw score for one review; may be outside 0-100.
    pub fn with_score(mut self, review_id: &str, score: i64) -> Self {
        self.scores.insert(review_id.to_string(), score);
        self
    }

    pub fn with_explanation(mut self, review_id: &str, explanation: &str) -> Self {
        self.explanations.insert(review_id.to_string(), explanation.to_string());
        self
    }

    pub fn with_pattern(mut self, pattern: &str) -> Self {
        self.key_patterns.push(pattern.to_string());
        self
    }

    /// Verdict appended to every response, e.g. for an id nobody sent.
    pub fn with_extra_verdict(mut self, review_id: &str, score: i64) -> Self {
        self.extra_verdicts.push(RawVerdict {
            review_id: review_id.to_string(),
            score,
            ..Default::default()
        });
        self
    }

    pub fn fail_all(mut self, kind: ErrorKind) -> Self {
        self.fail_all = Some(kind);
        self
    }

    /// Fail whichever chunk contains `review_id`.
    pub fn fail_chunk_with(mut self, review_id: &str, kind: ErrorKind) -> Self {
        self.chunk_failures.insert(review_id.to_string(), kind);
        self
    }

    /// Stall whichever chunk contains `review_id`.
    pub fn delay_chunk_with(mut self, review_id: &str, delay: Duration) -> Self {
        self.chunk_delays.insert(review_id.to_string(), delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Chunk sizes in the order calls started.
    pub fn call_sizes(&self) -> Vec<usize> {
        self.calls.lock().unwrap().iter().map(Vec::len).collect()
    }

    /// Review ids of every call, in the order calls started.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReviewAnalyzer for MockAnalyzer {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    fn pricing(&self) -> Pricing {
        self.pricing
    }

    async fn analyze(&self, reviews: &[Review]) -> Result<ProviderBatch, ProviderError> {
        let ids: Vec<String> = reviews.iter().map(|r| r.id.clone()).collect();
        self.calls.lock().unwrap().push(ids.clone());

        if let Some(delay) = ids.iter().find_map(|id| self.chunk_delays.get(id)) {
            tokio::time::sleep(*delay).await;
        }
        if let Some(kind) = self.fail_all {
            return Err(ProviderError::new(kind, format!("{} is down", self.name)));
        }
        if let Some(kind) = ids.iter().find_map(|id| self.chunk_failures.get(id)) {
            return Err(ProviderError::new(*kind, format!("{} rejected chunk", self.name)));
        }

        let mut verdicts: Vec<RawVerdict> = ids
            .iter()
            .map(|id| RawVerdict {
                review_id: id.clone(),
                score: self.scores.get(id).copied().unwrap_or(self.default_score),
                label: None,
                confidence: Some(0.8),
                explanation: self.explanations.get(id).cloned(),
                red_flags: Vec::new(),
            })
            .collect();
        verdicts.extend(self.extra_verdicts.iter().cloned());

        Ok(ProviderBatch {
            verdicts,
            key_patterns: self.key_patterns.clone(),
            usage: Some(TokenUsage {
                input_tokens: 100 * reviews.len() as u32,
                output_tokens: 50 * reviews.len() as u32,
            }),
        })
    }
}

// ---------------------------------------------------------------------------
// RecordingAlertSink
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingAlertSink {
    failures: Mutex<Vec<ProviderFailure>>,
    recoveries: Mutex<Vec<ProviderRecovery>>,
}

impl RecordingAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failures(&self) -> Vec<ProviderFailure> {
        self.failures.lock().unwrap().clone()
    }

    pub fn recoveries(&self) -> Vec<ProviderRecovery> {
        self.recoveries.lock().unwrap().clone()
    }
}

#[async_trait]
impl AlertSink for RecordingAlertSink {
    async fn provider_failed(&self, event: &ProviderFailure) -> anyhow::Result<()> {
        self.failures.lock().unwrap().push(event.clone());
        Ok(())
    }

    async fn provider_recovered(&self, event: &ProviderRecovery) -> anyhow::Result<()> {
        self.recoveries.lock().unwrap().push(event.clone());
        Ok(())
    }
}
