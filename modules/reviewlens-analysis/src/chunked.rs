use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use tracing::{error, info, warn};

use ai_client::{truncate_to_char_boundary, TokenUsage};
use reviewlens_common::{
    AnalysisArtifact, AnalysisConfig, Assessment, ErrorKind, FakeExample, Review, ReviewLensError,
    ReviewScore, ScoreLabel, ScoreMap,
};

use crate::health::{HealthTracker, HealthTransition};
use crate::normalize::normalize;
use crate::notify::{AlertSink, ProviderFailure, ProviderRecovery};
use crate::providers::{ProviderBatch, ProviderError, RawVerdict, ReviewAnalyzer};

/// Longest review excerpt kept on a fake example, in bytes.
pub const EXCERPT_MAX_BYTES: usize = 200;

// =============================================================================
// Outcome
// =============================================================================

#[derive(Debug, Clone)]
pub struct ChunkFailure {
    /// Zero-based chunk position.
    pub index: usize,
    pub review_count: usize,
    pub error: ProviderError,
}

/// Merged result of every chunk one provider analyzed.
#[derive(Debug, Clone, Default)]
pub struct AnalysisOutcome {
    pub provider: String,
    pub scores: ScoreMap,
    pub artifact: AnalysisArtifact,
    /// Review ids with no score, in review order.
    pub missing: Vec<String>,
    pub chunk_count: usize,
    pub failed_chunks: Vec<ChunkFailure>,
    pub clamped_scores: usize,
    /// Verdicts for ids that were not part of the chunk.
    pub discarded_verdicts: usize,
    /// Review ids that received more than one score.
    pub collisions: usize,
    pub usage: TokenUsage,
}

impl AnalysisOutcome {
    /// Every chunk failed. An empty review set is never a failure.
    pub fn is_total_failure(&self) -> bool {
        self.chunk_count > 0 && self.failed_chunks.len() == self.chunk_count
    }

    pub fn is_partial(&self) -> bool {
        !self.missing.is_empty() && !self.is_total_failure()
    }

    /// Fraction of `total` reviews that received a score.
    pub fn coverage(&self, total: usize) -> f64 {
        if total == 0 {
            1.0
        } else {
            self.scores.len() as f64 / total as f64
        }
    }

    pub fn first_error(&self) -> Option<&ProviderError> {
        self.failed_chunks.first().map(|f| &f.error)
    }
}

// =============================================================================
// ChunkedAnalyzer
// =============================================================================

/// Splits a review set into provider-sized chunks, calls the provider for
/// each, and merges the results. Chunk failures are contained: the outcome
/// carries whatever succeeded plus the ids left unscored.
pub struct ChunkedAnalyzer {
    config: AnalysisConfig,
    health: Arc<dyn HealthTracker>,
    alerts: Arc<dyn AlertSink>,
}

impl ChunkedAnalyzer {
    pub fn new(
        config: AnalysisConfig,
        health: Arc<dyn HealthTracker>,
        alerts: Arc<dyn AlertSink>,
    ) -> Self {
        Self {
            config,
            health,
            alerts,
        }
    }

    pub fn chunk_size_for(&self, provider: &dyn ReviewAnalyzer) -> usize {
        self.config.chunk_size.min(provider.max_batch_size()).max(1)
    }

    /// `context` identifies the product in logs and alerts.
    pub async fn analyze(
        &self,
        provider: &dyn ReviewAnalyzer,
        reviews: &[Review],
        context: &str,
    ) -> AnalysisOutcome {
        let chunk_size = self.chunk_size_for(provider);
        let chunks: Vec<&[Review]> = reviews.chunks(chunk_size).collect();
        let chunk_count = chunks.len();

        info!(
            provider = provider.name(),
            context,
            reviews = reviews.len(),
            chunk_size,
            chunks = chunk_count,
            "Starting chunked analysis"
        );

        // Chunk futures are built up front: a borrowing `map` closure inside
        // the stream would make the whole analysis non-`Send`. `buffered` yields in submission order, so the merge below sees
        // chunks in a fixed order regardless of completion order.
        let calls: Vec<_> = chunks
            .into_iter()
            .enumerate()
            .map(|(index, chunk)| self.run_chunk(provider, chunk, index, chunk_count, context))
            .collect();
        let results: Vec<Result<ProviderBatch, ProviderError>> = stream::iter(calls)
            .buffered(self.config.chunk_concurrency.max(1))
            .collect()
            .await;

        let outcome = merge_chunks(provider.name(), reviews, chunk_size, results, &self.config);

        info!(
            provider = provider.name(),
            context,
            scored = outcome.scores.len(),
            missing = outcome.missing.len(),
            failed_chunks = outcome.failed_chunks.len(),
            clamped = outcome.clamped_scores,
            "Chunked analysis finished"
        );
        outcome
    }

    async fn run_chunk(
        &self,
        provider: &dyn ReviewAnalyzer,
        chunk: &[Review],
        index: usize,
        chunk_count: usize,
        context: &str,
    ) -> Result<ProviderBatch, ProviderError> {
        let started = Instant::now();
        let call = tokio::time::timeout(self.config.provider_timeout, provider.analyze(chunk));
        let result = match call.await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::new(
                ErrorKind::Timeout,
                format!(
                    "no response within {}s",
                    self.config.provider_timeout.as_secs_f64()
                ),
            )),
        };
        let latency = started.elapsed();

        let transition = self.health.record_result(provider.name(), result.is_ok(), latency);

        match (&result, transition) {
            (Err(e), _) => {
                warn!(
                    provider = provider.name(),
                    context,
                    chunk = index + 1,
                    chunks = chunk_count,
                    kind = %e.kind,
                    error = %e.message,
                    "Chunk analysis failed"
                );
                let event = ProviderFailure {
                    provider: provider.name().to_string(),
                    error_kind: e.kind,
                    message: e.message.clone(),
                    context: format!("{context} chunk {}/{chunk_count}", index + 1),
                };
                if let Err(alert_err) = self.alerts.provider_failed(&event).await {
                    warn!(error = %alert_err, "Failed to send provider failure alert");
                }
            }
            (Ok(_), HealthTransition::Recovered { after_failures }) => {
                info!(provider = provider.name(), after_failures, "Provider recovered");
                let event = ProviderRecovery {
                    provider: provider.name().to_string(),
                    after_failures,
                };
                if let Err(alert_err) = self.alerts.provider_recovered(&event).await {
                    warn!(error = %alert_err, "Failed to send provider recovery alert");
                }
            }
            (Ok(_), _) => {}
        }

        result
    }
}

// =============================================================================
// Merge
// =============================================================================

/// Fold per-chunk results (in chunk order) into one outcome. `results[i]`
/// belongs to `reviews.chunks(chunk_size).nth(i)`.
pub fn merge_chunks(
    provider: &str,
    reviews: &[Review],
    chunk_size: usize,
    results: Vec<Result<ProviderBatch, ProviderError>>,
    config: &AnalysisConfig,
) -> AnalysisOutcome {
    let mut outcome = AnalysisOutcome {
        provider: provider.to_string(),
        chunk_count: results.len(),
        ..Default::default()
    };

    let mut position: HashMap<&str, usize> = HashMap::with_capacity(reviews.len());
    for (i, review) in reviews.iter().enumerate() {
        position.entry(review.id.as_str()).or_insert(i);
    }

    let mut candidates: Vec<(usize, FakeExample)> = Vec::new();
    let mut pattern_keys: HashSet<String> = HashSet::new();

    for (index, (chunk, result)) in reviews.chunks(chunk_size.max(1)).zip(results).enumerate() {
        let batch = match result {
            Ok(batch) => batch,
            Err(error) => {
                outcome.failed_chunks.push(ChunkFailure {
                    index,
                    review_count: chunk.len(),
                    error,
                });
                continue;
            }
        };

        if let Some(usage) = batch.usage {
            outcome.usage.input_tokens += usage.input_tokens;
            outcome.usage.output_tokens += usage.output_tokens;
        }

        let chunk_reviews: HashMap<&str, &Review> =
            chunk.iter().map(|r| (r.id.as_str(), r)).collect();

        for verdict in batch.verdicts {
            let Some(review) = chunk_reviews.get(verdict.review_id.as_str()) else {
                warn!(
                    provider,
                    chunk = index + 1,
                    review_id = verdict.review_id.as_str(),
                    "Provider returned verdict for unknown review_id, discarding"
                );
                outcome.discarded_verdicts += 1;
                continue;
            };

            let (assessment, clamped) = assess(verdict, config);
            if clamped {
                outcome.clamped_scores += 1;
            }

            if outcome.scores.contains_key(&assessment.review_id) {
                let violation = ReviewLensError::DataIntegrityViolation(format!(
                    "review_id {} scored more than once (chunk {})",
                    assessment.review_id,
                    index + 1
                ));
                error!(provider, error = %violation, "Keeping first score");
                outcome.collisions += 1;
                continue;
            }

            if assessment.score >= config.fake_threshold {
                let pos = position.get(review.id.as_str()).copied().unwrap_or(usize::MAX);
                candidates.push((
                    pos,
                    FakeExample {
                        review_id: review.id.clone(),
                        score: assessment.score,
                        excerpt: truncate_to_char_boundary(&review.text, EXCERPT_MAX_BYTES)
                            .to_string(),
                        reason: assessment.explanation.clone(),
                    },
                ));
            }

            outcome
                .scores
                .insert(assessment.review_id.clone(), ReviewScore::Assessed(assessment));
        }

        for pattern in batch.key_patterns {
            let pattern = pattern.trim();
            let key = normalize(pattern);
            if !key.is_empty() && pattern_keys.insert(key) {
                outcome.artifact.key_patterns.push(pattern.to_string());
            }
        }
    }

    outcome.artifact.fake_examples = top_fake_examples(candidates, config.max_fake_examples);

    let mut reported_missing: HashSet<&str> = HashSet::new();
    outcome.missing = reviews
        .iter()
        .filter(|r| !outcome.scores.contains_key(&r.id) && reported_missing.insert(r.id.as_str()))
        .map(|r| r.id.clone())
        .collect();

    outcome
}

/// Highest scores first, ties in original review order, one per review.
fn top_fake_examples(mut candidates: Vec<(usize, FakeExample)>, limit: usize) -> Vec<FakeExample> {
    candidates.sort_by(|(pa, a), (pb, b)| b.score.cmp(&a.score).then(pa.cmp(pb)));
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|(_, example)| seen.insert(example.review_id.clone()))
        .map(|(_, example)| example)
        .take(limit)
        .collect()
}

/// Validate one raw verdict. Returns the assessment and whether the score
/// had to be clamped.
fn assess(verdict: RawVerdict, config: &AnalysisConfig) -> (Assessment, bool) {
    let clamped_score = verdict.score.clamp(0, 100);
    let clamped = clamped_score != verdict.score;
    if clamped {
        warn!(
            review_id = verdict.review_id.as_str(),
            raw_score = verdict.score,
            clamped_score,
            "Provider score out of range, clamped"
        );
    }
    let score = clamped_score as u8;

    let label = verdict
        .label
        .as_deref()
        .and_then(ScoreLabel::parse)
        .unwrap_or_else(|| label_for_score(score, config));

    let confidence = verdict
        .confidence
        .filter(|c| c.is_finite())
        .map(|c| c.clamp(0.0, 1.0) as f32)
        .unwrap_or(0.0);

    let mut flags = HashSet::new();
    let red_flags = verdict
        .red_flags
        .into_iter()
        .map(|f| f.trim().to_string())
        .filter(|f| !f.is_empty() && flags.insert(f.to_lowercase()))
        .collect();

    let assessment = Assessment {
        review_id: verdict.review_id,
        score,
        label,
        confidence,
        explanation: verdict.explanation.map(|e| e.trim().to_string()).unwrap_or_default(),
        red_flags,
    };
    (assessment, clamped)
}

pub fn label_for_score(score: u8, config: &AnalysisConfig) -> ScoreLabel {
    if score >= config.fake_threshold {
        ScoreLabel::Fake
    } else if score >= config.suspicious_threshold {
        ScoreLabel::Suspicious
    } else {
        ScoreLabel::Genuine
    }
}
