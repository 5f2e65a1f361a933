use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use typed_builder::TypedBuilder;
use uuid::Uuid;

use reviewlens_common::{
    AnalysisConfig, AnalysisStatus, ErrorKind, ProductKey, ProductRecord, RawReview, Review,
    ReviewLensError,
};

use crate::chunked::{AnalysisOutcome, ChunkedAnalyzer};
use crate::dedup::{dedupe, ensure_unique_ids, reconcile_against_total};
use crate::notify::AlertSink;
use crate::reconcile::{MetricsReconciler, ReconciledMetrics};
use crate::router::ProviderRouter;
use crate::store::ProductStore;

/// Selected provider plus at most one fallback.
const MAX_ATTEMPTS: usize = 2;

// =============================================================================
// Request / Report
// =============================================================================

/// One product's scraped reviews, ready for analysis.
#[derive(Debug, Clone, TypedBuilder, Deserialize)]
pub struct AnalysisRequest {
    #[builder(setter(into))]
    pub asin: String,
    #[builder(setter(into))]
    pub country: String,
    pub reviews: Vec<RawReview>,
    /// Review count the marketplace reports; 0 when unknown.
    #[builder(default)]
    #[serde(default)]
    pub reported_total: u32,
    /// Marketplace star rating, when the scraper captured it.
    #[builder(default, setter(strip_option))]
    #[serde(default)]
    pub amazon_rating: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttemptSummary {
    pub provider: String,
    pub scored: usize,
    pub failed_chunks: usize,
    pub accepted: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub run_id: Uuid,
    pub input_reviews: usize,
    pub duplicates_removed: usize,
    pub truncated: usize,
    /// Reviews whose id repeated an earlier one and was renamed.
    pub renamed_ids: usize,
    pub clamped_scores: usize,
    /// Review ids scored by more than one chunk; the first score was kept.
    pub score_collisions: usize,
    pub missing_review_ids: Vec<String>,
    pub attempts: Vec<AttemptSummary>,
    pub metrics: ReconciledMetrics,
    pub record: ProductRecord,
}

// =============================================================================
// AnalysisOrchestrator
// =============================================================================

/// normalize -> dedupe -> route -> analyze (chunked) -> reconcile -> persist.
///
/// A record only reaches `completed` with a full score set from a single
/// provider. When both the selected provider and its fallback fail, the
/// record is marked `failed` and no scores are written.
pub struct AnalysisOrchestrator {
    config: AnalysisConfig,
    router: Arc<ProviderRouter>,
    chunked: ChunkedAnalyzer,
    reconciler: MetricsReconciler,
    store: Arc<dyn ProductStore>,
}

impl AnalysisOrchestrator {
    pub fn new(
        config: AnalysisConfig,
        router: Arc<ProviderRouter>,
        store: Arc<dyn ProductStore>,
        alerts: Arc<dyn AlertSink>,
    ) -> Self {
        let chunked = ChunkedAnalyzer::new(config.clone(), Arc::clone(router.health()), alerts);
        Self {
            reconciler: MetricsReconciler::from_config(&config),
            config,
            router,
            chunked,
            store,
        }
    }

    pub fn router(&self) -> &Arc<ProviderRouter> {
        &self.router
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub async fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisReport, ReviewLensError> {
        let run_id = Uuid::new_v4();
        let key = ProductKey::new(&request.asin, &request.country);
        let input_reviews = request.reviews.len();
        let reported_total = request.reported_total;
        let amazon_rating = request.amazon_rating;

        let reviews: Vec<Review> = request
            .reviews
            .into_iter()
            .enumerate()
            .map(|(position, raw)| raw.into_review(position))
            .collect();
        let (reviews, renamed_ids) = ensure_unique_ids(reviews);

        let deduped = dedupe(reviews);
        let duplicates_removed = input_reviews - deduped.len();
        let deduped_len = deduped.len();
        let reviews = reconcile_against_total(deduped, reported_total);
        let truncated = deduped_len - reviews.len();

        info!(
            %run_id,
            product = %key,
            input_reviews,
            duplicates_removed,
            truncated,
            renamed_ids,
            analyzed = reviews.len(),
            "Starting analysis"
        );

        if reviews.is_empty() && input_reviews > 0 {
            let err = ReviewLensError::ReconciliationImpossible {
                input: input_reviews,
            };
            return Err(self.fail(&key, err).await);
        }

        self.store
            .update_status(&key, AnalysisStatus::Analyzing, None)
            .await?;

        let mut attempts = Vec::new();
        let outcome = match tokio::time::timeout(
            self.config.total_timeout,
            self.run_attempts(&key, &reviews, &mut attempts),
        )
        .await
        {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(err)) => return Err(self.fail(&key, err).await),
            Err(_) => {
                let err = ReviewLensError::BudgetExceeded(self.config.total_timeout.as_secs());
                return Err(self.fail(&key, err).await);
            }
        };

        let metrics = self.reconciler.reconcile(&reviews, &outcome.scores);
        let record = self.build_record(
            key,
            reviews,
            reported_total,
            amazon_rating,
            &metrics,
            &outcome,
            &attempts,
        );

        if !record.within_reported_total() {
            let err = ReviewLensError::DataIntegrityViolation(format!(
                "{} reviews exceed reported total {}",
                record.reviews.len(),
                record.reported_total
            ));
            return Err(self.fail(&record.key, err).await);
        }

        self.store.save(&record).await?;

        info!(
            %run_id,
            product = %record.key,
            provider = record.provider.as_deref().unwrap_or("none"),
            fake_percentage = metrics.fake_percentage,
            grade = %metrics.grade,
            adjusted_rating = metrics.adjusted_rating,
            partial = record.partial_note.is_some(),
            "Analysis completed"
        );

        Ok(AnalysisReport {
            run_id,
            input_reviews,
            duplicates_removed,
            truncated,
            renamed_ids,
            clamped_scores: outcome.clamped_scores,
            score_collisions: outcome.collisions,
            missing_review_ids: outcome.missing,
            attempts,
            metrics,
            record,
        })
    }

    /// Try the best provider, then once more with the next best if the first
    /// failed outright or scored too little of the set.
    async fn run_attempts(
        &self,
        key: &ProductKey,
        reviews: &[Review],
        attempts: &mut Vec<AttemptSummary>,
    ) -> Result<AnalysisOutcome, ReviewLensError> {
        if reviews.is_empty() {
            return Ok(AnalysisOutcome::default());
        }

        let context = key.to_string();
        let mut excluded: Vec<String> = Vec::new();
        let mut last_error: Option<ReviewLensError> = None;

        for attempt in 1..=MAX_ATTEMPTS {
            let Some(provider) = self.router.select_optimal(&excluded) else {
                warn!(product = %key, excluded = ?excluded, "No provider left to try");
                return Err(ReviewLensError::ProviderUnavailable {
                    excluded,
                    last_error: last_error.map(|e| e.to_string()),
                });
            };
            let name = provider.name().to_string();
            if attempt > 1 {
                info!(product = %key, provider = %name, excluded = ?excluded, "Falling back to next provider");
            }

            let outcome = self.chunked.analyze(provider.as_ref(), reviews, &context).await;
            let coverage = outcome.coverage(reviews.len());
            let accepted = !outcome.is_total_failure() && coverage >= self.config.min_coverage;

            attempts.push(AttemptSummary {
                provider: name.clone(),
                scored: outcome.scores.len(),
                failed_chunks: outcome.failed_chunks.len(),
                accepted,
            });

            if accepted {
                return Ok(outcome);
            }

            let (kind, message) = match outcome.first_error() {
                Some(e) if outcome.is_total_failure() => (e.kind, e.message.clone()),
                Some(e) => (
                    e.kind,
                    format!(
                        "scored {} of {} reviews, below minimum coverage: {}",
                        outcome.scores.len(),
                        reviews.len(),
                        e.message
                    ),
                ),
                None => (
                    ErrorKind::Parse,
                    format!(
                        "scored {} of {} reviews, below minimum coverage",
                        outcome.scores.len(),
                        reviews.len()
                    ),
                ),
            };
            warn!(product = %key, provider = %name, kind = %kind, error = %message, "Provider attempt failed");
            last_error = Some(ReviewLensError::ProviderCallFailed {
                provider: name.clone(),
                kind,
                message,
            });
            excluded.push(name);
        }

        Err(last_error.unwrap_or(ReviewLensError::ProviderUnavailable {
            excluded,
            last_error: None,
        }))
    }

    #[allow(clippy::too_many_arguments)]
    fn build_record(
        &self,
        key: ProductKey,
        reviews: Vec<Review>,
        reported_total: u32,
        amazon_rating: Option<f64>,
        metrics: &ReconciledMetrics,
        outcome: &AnalysisOutcome,
        attempts: &[AttemptSummary],
    ) -> ProductRecord {
        let provider = (!outcome.provider.is_empty()).then(|| outcome.provider.clone());
        let estimated_cost = provider
            .as_deref()
            .and_then(|name| self.router.estimate_cost(name, reviews.len()))
            .unwrap_or(0.0);

        let partial_note = (!outcome.missing.is_empty()).then(|| {
            format!(
                "Partial analysis: {} of {} reviews scored; {} of {} chunks failed.",
                outcome.scores.len(),
                reviews.len(),
                outcome.failed_chunks.len(),
                outcome.chunk_count
            )
        });

        let mut explanation = metrics.summary();
        if let Some(note) = &partial_note {
            explanation.push(' ');
            explanation.push_str(note);
        }
        let failed: Vec<&str> = attempts
            .iter()
            .filter(|a| !a.accepted)
            .map(|a| a.provider.as_str())
            .collect();
        if let (Some(name), false) = (&provider, failed.is_empty()) {
            explanation.push_str(&format!(" Scored by {name} after {} failed.", failed.join(", ")));
        }

        ProductRecord {
            key,
            reported_total,
            scores: outcome.scores.clone(),
            artifact: outcome.artifact.clone(),
            fake_percentage: metrics.fake_percentage,
            grade: Some(metrics.grade),
            amazon_rating: amazon_rating.unwrap_or(metrics.original_rating),
            adjusted_rating: metrics.adjusted_rating,
            status: AnalysisStatus::Completed,
            error_message: None,
            explanation: Some(explanation),
            partial_note,
            provider,
            estimated_cost,
            analyzed_at: Some(Utc::now()),
            reviews,
        }
    }

    /// Mark the record failed and hand back the error. A store failure here
    /// is logged; the analysis error is what the caller needs.
    async fn fail(&self, key: &ProductKey, err: ReviewLensError) -> ReviewLensError {
        error!(product = %key, error = %err, "Analysis failed");
        let message = err.to_string();
        if let Err(store_err) = self
            .store
            .update_status(key, AnalysisStatus::Failed, Some(&message))
            .await
        {
            error!(product = %key, error = %store_err, "Failed to record failed status");
        }
        err
    }
}
