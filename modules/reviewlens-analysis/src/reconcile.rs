use serde::Serialize;

use reviewlens_common::{AnalysisConfig, Grade, Review, ScoreMap};

/// Aggregates derived from a review set and its scores.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciledMetrics {
    pub total_reviews: usize,
    pub fake_count: usize,
    /// 0-100, one decimal.
    pub fake_percentage: f64,
    pub grade: Grade,
    /// Mean rating over every rated review, two decimals.
    pub original_rating: f64,
    /// Mean rating over rated reviews not counted as fake, two decimals.
    pub adjusted_rating: f64,
}

impl ReconciledMetrics {
    /// One-line human summary for the product record.
    pub fn summary(&self) -> String {
        format!(
            "Analyzed {} reviews: {} flagged as fake ({:.1}%), grade {}. Adjusted rating {:.2} vs original {:.2}.",
            self.total_reviews,
            self.fake_count,
            self.fake_percentage,
            self.grade,
            self.adjusted_rating,
            self.original_rating,
        )
    }
}

/// Recomputes fake percentage, grade and adjusted rating. Pure: the same
/// reviews and scores always produce the same metrics.
#[derive(Debug, Clone, Copy)]
pub struct MetricsReconciler {
    fake_threshold: u8,
}

impl MetricsReconciler {
    pub fn new(fake_threshold: u8) -> Self {
        Self { fake_threshold }
    }

    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self::new(config.fake_threshold)
    }

    pub fn is_fake(&self, review: &Review, scores: &ScoreMap) -> bool {
        scores
            .get(&review.id)
            .is_some_and(|s| s.score() >= self.fake_threshold)
    }

    /// Scores for ids not in `reviews` are ignored, so stale scores from a
    /// larger set never inflate the count.
    pub fn reconcile(&self, reviews: &[Review], scores: &ScoreMap) -> ReconciledMetrics {
        let fake_count = reviews.iter().filter(|r| self.is_fake(r, scores)).count();

        let fake_percentage = if reviews.is_empty() {
            0.0
        } else {
            round_to(fake_count as f64 / reviews.len() as f64 * 100.0, 1)
        };

        let original = mean_rating(reviews.iter());
        let adjusted = mean_rating(reviews.iter().filter(|r| !self.is_fake(r, scores))).or(original);

        ReconciledMetrics {
            total_reviews: reviews.len(),
            fake_count,
            fake_percentage,
            grade: Grade::from_fake_percentage(fake_percentage),
            original_rating: round_to(original.unwrap_or(0.0), 2),
            adjusted_rating: round_to(adjusted.unwrap_or(0.0), 2),
        }
    }
}

/// Mean over rated reviews only; `None` when nothing is rated.
fn mean_rating<'a>(reviews: impl Iterator<Item = &'a Review>) -> Option<f64> {
    let (sum, count) = reviews
        .filter(|r| r.has_rating())
        .fold((0u64, 0u64), |(sum, count), r| (sum + r.rating as u64, count + 1));
    (count > 0).then(|| sum as f64 / count as f64)
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use reviewlens_common::{Assessment, ReviewScore, ScoreLabel};

    use super::*;
    use crate::testing::review;

    fn scored(entries: &[(&str, u8)]) -> ScoreMap {
        entries
            .iter()
            .map(|(id, score)| {
                (
                    id.to_string(),
                    ReviewScore::Assessed(Assessment {
                        review_id: id.to_string(),
                        score: *score,
                        label: ScoreLabel::Genuine,
                        confidence: 1.0,
                        explanation: String::new(),
                        red_flags: vec![],
                    }),
                )
            })
            .collect()
    }

    #[test]
    fn empty_set_is_zero_percent() {
        let metrics = MetricsReconciler::new(85).reconcile(&[], &ScoreMap::new());
        assert_eq!(metrics.fake_percentage, 0.0);
        assert_eq!(metrics.grade, Grade::A);
        assert_eq!(metrics.adjusted_rating, 0.0);
    }

    #[test]
    fn fake_reviews_are_excluded_from_adjusted_rating() {
        let reviews = vec![
            review("a", "x", 5),
            review("b", "y", 5),
            review("c", "z", 2),
            review("d", "w", 3),
        ];
        let scores = scored(&[("a", 95), ("b", 85), ("c", 10), ("d", 84)]);
        let metrics = MetricsReconciler::new(85).reconcile(&reviews, &scores);

        assert_eq!(metrics.fake_count, 2);
        assert_eq!(metrics.fake_percentage, 50.0);
        assert_eq!(metrics.grade, Grade::C);
        assert_eq!(metrics.original_rating, 3.75);
        assert_eq!(metrics.adjusted_rating, 2.5);
    }

    #[test]
    fn all_fake_falls_back_to_unadjusted_average() {
        let reviews = vec![review("a", "x", 5), review("b", "y", 4)];
        let scores = scored(&[("a", 99), ("b", 90)]);
        let metrics = MetricsReconciler::new(85).reconcile(&reviews, &scores);

        assert_eq!(metrics.fake_percentage, 100.0);
        assert_eq!(metrics.grade, Grade::F);
        assert_eq!(metrics.adjusted_rating, 4.5);
    }

    #[test]
    fn percentage_rounds_to_one_decimal() {
        let reviews: Vec<Review> = (0..3).map(|i| review(&format!("r{i}"), "t", 4)).collect();
        let scores = scored(&[("r0", 90)]);
        let metrics = MetricsReconciler::new(85).reconcile(&reviews, &scores);
        assert_eq!(metrics.fake_percentage, 33.3);
        assert_eq!(metrics.grade, Grade::C);
    }

    #[test]
    fn unrated_and_unscored_reviews() {
        let reviews = vec![review("a", "x", 0), review("b", "y", 4), review("c", "z", 2)];
        // "c" has no score and is treated as not fake; "stale" is not in the set.
        let scores = scored(&[("a", 99), ("b", 20), ("stale", 99)]);
        let metrics = MetricsReconciler::new(85).reconcile(&reviews, &scores);

        assert_eq!(metrics.fake_count, 1);
        assert_eq!(metrics.original_rating, 3.0);
        assert_eq!(metrics.adjusted_rating, 3.0);
    }

    #[test]
    fn legacy_scores_count_toward_fake_percentage() {
        let reviews = vec![review("a", "x", 5), review("b", "y", 3)];
        let mut scores = ScoreMap::new();
        scores.insert(
            "a".into(),
            ReviewScore::Legacy {
                review_id: "a".into(),
                score: 88,
            },
        );
        let metrics = MetricsReconciler::new(85).reconcile(&reviews, &scores);
        assert_eq!(metrics.fake_count, 1);
        assert_eq!(metrics.adjusted_rating, 3.0);
    }

    #[test]
    fn reconcile_is_idempotent() {
        let reviews: Vec<Review> = (0..17).map(|i| review(&format!("r{i}"), "t", (i % 5) as u8 + 1)).collect();
        let scores = scored(&[("r1", 90), ("r4", 86), ("r9", 40), ("r16", 100)]);
        let reconciler = MetricsReconciler::new(85);
        assert_eq!(
            reconciler.reconcile(&reviews, &scores),
            reconciler.reconcile(&reviews, &scores)
        );
    }

    #[test]
    fn summary_mentions_grade_and_ratings() {
        let reviews = vec![review("a", "x", 5), review("b", "y", 3)];
        let metrics = MetricsReconciler::new(85).reconcile(&reviews, &scored(&[("a", 90)]));
        let summary = metrics.summary();
        assert!(summary.contains("Analyzed 2 reviews: 1 flagged as fake (50.0%), grade C"));
        assert!(summary.contains("Adjusted rating 3.00 vs original 4.00"));
    }
}
