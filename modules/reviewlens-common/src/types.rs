use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::grade::Grade;

// =============================================================================
// Reviews
// =============================================================================

/// One user-submitted review as stored and analyzed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    /// Stable across re-analysis of the same product.
    pub id: String,
    pub text: String,
    /// Star rating 1-5. `0` marks a review the source published without a
    /// rating; unrated reviews are excluded from rating averages.
    pub rating: u8,
    pub verified: bool,
    pub posted_at: Option<NaiveDate>,
}

impl Review {
    pub fn has_rating(&self) -> bool {
        (1..=5).contains(&self.rating)
    }
}

/// A review as delivered by the scraping layer. Every field may be missing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawReview {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, alias = "review_text", alias = "body")]
    pub text: Option<String>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default, alias = "verified_purchase")]
    pub verified: Option<bool>,
    #[serde(default, alias = "date")]
    pub posted_at: Option<String>,
}

impl RawReview {
    /// Fill gaps so the review can enter the pipeline. `position` is the
    /// review's index in the scraped list and backs a synthetic id when the
    /// source gave none.
    pub fn into_review(self, position: usize) -> Review {
        let id = self
            .id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| format!("review-{position}"));
        let rating = self
            .rating
            .filter(|r| r.is_finite())
            .map(|r| r.round().clamp(0.0, 5.0) as u8)
            .unwrap_or(0);
        let posted_at = self.posted_at.as_deref().and_then(parse_review_date);

        Review {
            id,
            text: self.text.unwrap_or_default(),
            rating,
            verified: self.verified.unwrap_or(false),
            posted_at,
        }
    }
}

fn parse_review_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
        .or_else(|| NaiveDate::parse_from_str(raw, "%B %d, %Y").ok())
}

// =============================================================================
// Scores
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreLabel {
    Genuine,
    Suspicious,
    Fake,
    /// Score carried over from the old bare-number format.
    Legacy,
}

impl ScoreLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScoreLabel::Genuine => "genuine",
            ScoreLabel::Suspicious => "suspicious",
            ScoreLabel::Fake => "fake",
            ScoreLabel::Legacy => "legacy",
        }
    }

    /// Parse a provider-supplied label. `Legacy` is never accepted from a
    /// provider.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "genuine" | "authentic" | "real" => Some(ScoreLabel::Genuine),
            "suspicious" | "uncertain" => Some(ScoreLabel::Suspicious),
            "fake" => Some(ScoreLabel::Fake),
            _ => None,
        }
    }
}

impl fmt::Display for ScoreLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Full provider assessment of one review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub review_id: String,
    /// Probability of being fake, 0-100.
    pub score: u8,
    pub label: ScoreLabel,
    /// 0.0-1.0
    pub confidence: f32,
    pub explanation: String,
    #[serde(default)]
    pub red_flags: Vec<String>,
}

/// Result of analyzing one review. Older records only kept a bare number;
/// they load as `Legacy` and every consumer matches on the variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReviewScore {
    Assessed(Assessment),
    Legacy { review_id: String, score: u8 },
}

impl ReviewScore {
    pub fn review_id(&self) -> &str {
        match self {
            ReviewScore::Assessed(a) => &a.review_id,
            ReviewScore::Legacy { review_id, .. } => review_id,
        }
    }

    pub fn score(&self) -> u8 {
        match self {
            ReviewScore::Assessed(a) => a.score,
            ReviewScore::Legacy { score, .. } => *score,
        }
    }

    pub fn label(&self) -> ScoreLabel {
        match self {
            ReviewScore::Assessed(a) => a.label,
            ReviewScore::Legacy { .. } => ScoreLabel::Legacy,
        }
    }

    pub fn confidence(&self) -> f32 {
        match self {
            ReviewScore::Assessed(a) => a.confidence,
            ReviewScore::Legacy { .. } => 0.0,
        }
    }

    pub fn explanation(&self) -> &str {
        match self {
            ReviewScore::Assessed(a) => &a.explanation,
            ReviewScore::Legacy { .. } => "",
        }
    }

    pub fn red_flags(&self) -> &[String] {
        match self {
            ReviewScore::Assessed(a) => &a.red_flags,
            ReviewScore::Legacy { .. } => &[],
        }
    }

    pub fn is_legacy(&self) -> bool {
        matches!(self, ReviewScore::Legacy { .. })
    }
}

/// Map of reviewId to score, ordered by id so serialized records are stable.
pub type ScoreMap = BTreeMap<String, ReviewScore>;

/// Deserialize a score map whose values are either tagged `ReviewScore`s or
/// bare numbers from the legacy format.
pub fn deserialize_score_map<'de, D>(deserializer: D) -> Result<ScoreMap, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StoredScore {
        Bare(f64),
        Tagged(ReviewScore),
    }

    let raw = BTreeMap::<String, StoredScore>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(review_id, stored)| {
            let score = match stored {
                StoredScore::Bare(value) => ReviewScore::Legacy {
                    review_id: review_id.clone(),
                    score: value.round().clamp(0.0, 100.0) as u8,
                },
                StoredScore::Tagged(score) => score,
            };
            (review_id, score)
        })
        .collect())
}

// =============================================================================
// Artifacts
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FakeExample {
    pub review_id: String,
    pub score: u8,
    pub excerpt: String,
    pub reason: String,
}

/// Cross-review findings for one analyzed batch. Both lists are unique.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisArtifact {
    /// Highest-scoring reviews, best first, unique by review id.
    pub fake_examples: Vec<FakeExample>,
    /// Detected manipulation patterns, unique by normalized text.
    pub key_patterns: Vec<String>,
}

// =============================================================================
// Product Record
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProductKey {
    pub asin: String,
    pub country: String,
}

impl ProductKey {
    pub fn new(asin: impl Into<String>, country: impl Into<String>) -> Self {
        Self {
            asin: asin.into().trim().to_ascii_uppercase(),
            country: country.into().trim().to_ascii_lowercase(),
        }
    }
}

impl fmt::Display for ProductKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.country, self.asin)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    #[default]
    Pending,
    Analyzing,
    Completed,
    Failed,
}

impl AnalysisStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisStatus::Pending => "pending",
            AnalysisStatus::Analyzing => "analyzing",
            AnalysisStatus::Completed => "completed",
            AnalysisStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(AnalysisStatus::Pending),
            "analyzing" => Some(AnalysisStatus::Analyzing),
            "completed" => Some(AnalysisStatus::Completed),
            "failed" => Some(AnalysisStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The unit of persistence: one product on one marketplace.
///
/// Invariant once analyzed: `reviews.len() <= reported_total` whenever
/// `reported_total > 0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub key: ProductKey,
    pub reviews: Vec<Review>,
    /// Total review count the marketplace reports; 0 when unknown.
    pub reported_total: u32,
    #[serde(default, deserialize_with = "deserialize_score_map")]
    pub scores: ScoreMap,
    #[serde(default)]
    pub artifact: AnalysisArtifact,
    pub fake_percentage: f64,
    pub grade: Option<Grade>,
    pub amazon_rating: f64,
    pub adjusted_rating: f64,
    pub status: AnalysisStatus,
    pub error_message: Option<String>,
    pub explanation: Option<String>,
    pub partial_note: Option<String>,
    pub provider: Option<String>,
    pub estimated_cost: f64,
    pub analyzed_at: Option<DateTime<Utc>>,
}

impl ProductRecord {
    pub fn new(key: ProductKey) -> Self {
        Self {
            key,
            reviews: Vec::new(),
            reported_total: 0,
            scores: ScoreMap::new(),
            artifact: AnalysisArtifact::default(),
            fake_percentage: 0.0,
            grade: None,
            amazon_rating: 0.0,
            adjusted_rating: 0.0,
            status: AnalysisStatus::Pending,
            error_message: None,
            explanation: None,
            partial_note: None,
            provider: None,
            estimated_cost: 0.0,
            analyzed_at: None,
        }
    }

    pub fn within_reported_total(&self) -> bool {
        self.reported_total == 0 || self.reviews.len() <= self.reported_total as usize
    }
}

// =============================================================================
// Provider Health
// =============================================================================

/// Point-in-time view of one provider's health counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderHealth {
    pub provider: String,
    pub available: bool,
    pub success_count: u64,
    pub failure_count: u64,
    #[serde(with = "duration_secs")]
    pub total_latency: Duration,
    pub request_count: u64,
    pub consecutive_failures: u64,
    pub health_score: f64,
}

impl ProviderHealth {
    /// `None` until the provider has at least one recorded call.
    pub fn success_rate(&self) -> Option<f64> {
        let total = self.success_count + self.failure_count;
        (total > 0).then(|| self.success_count as f64 / total as f64)
    }

    pub fn avg_latency(&self) -> Option<Duration> {
        (self.request_count > 0).then(|| {
            Duration::from_secs_f64(self.total_latency.as_secs_f64() / self.request_count as f64)
        })
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_review_fills_missing_fields() {
        let raw: RawReview = serde_json::from_str(r#"{"review_text": "Works fine", "rating": 4.0}"#).unwrap();
        let review = raw.into_review(7);
        assert_eq!(review.id, "review-7");
        assert_eq!(review.text, "Works fine");
        assert_eq!(review.rating, 4);
        assert!(!review.verified);
        assert_eq!(review.posted_at, None);
    }

    #[test]
    fn raw_review_clamps_rating_and_parses_dates() {
        let raw = RawReview {
            id: Some(" R1 ".into()),
            rating: Some(9.0),
            posted_at: Some("March 4, 2024".into()),
            ..Default::default()
        };
        let review = raw.into_review(0);
        assert_eq!(review.id, "R1");
        assert_eq!(review.rating, 5);
        assert_eq!(review.posted_at, NaiveDate::from_ymd_opt(2024, 3, 4));
        assert!(review.text.is_empty());
    }

    #[test]
    fn legacy_score_defaults() {
        let score = ReviewScore::Legacy {
            review_id: "R1".into(),
            score: 72,
        };
        assert!(score.is_legacy());
        assert_eq!(score.label(), ScoreLabel::Legacy);
        assert_eq!(score.confidence(), 0.0);
        assert_eq!(score.explanation(), "");
        assert!(score.red_flags().is_empty());
    }

    #[test]
    fn stored_record_accepts_bare_number_scores() {
        let mut record = ProductRecord::new(ProductKey::new("b00test", "US"));
        record.scores.insert(
            "R2".into(),
            ReviewScore::Assessed(Assessment {
                review_id: "R2".into(),
                score: 91,
                label: ScoreLabel::Fake,
                confidence: 0.8,
                explanation: "template phrasing".into(),
                red_flags: vec!["generic".into()],
            }),
        );
        let mut json = serde_json::to_value(&record).unwrap();
        json["scores"]["R1"] = serde_json::json!(64.6);

        let loaded: ProductRecord = serde_json::from_value(json).unwrap();
        assert_eq!(loaded.key.asin, "B00TEST");
        assert_eq!(loaded.key.country, "us");
        assert_eq!(
            loaded.scores["R1"],
            ReviewScore::Legacy {
                review_id: "R1".into(),
                score: 65
            }
        );
        assert_eq!(loaded.scores["R2"].label(), ScoreLabel::Fake);
    }

    #[test]
    fn provider_label_parsing() {
        assert_eq!(ScoreLabel::parse(" FAKE "), Some(ScoreLabel::Fake));
        assert_eq!(ScoreLabel::parse("authentic"), Some(ScoreLabel::Genuine));
        assert_eq!(ScoreLabel::parse("legacy"), None);
    }

    #[test]
    fn health_rates_are_none_without_calls() {
        let health = ProviderHealth {
            provider: "openai".into(),
            available: true,
            success_count: 0,
            failure_count: 0,
            total_latency: Duration::ZERO,
            request_count: 0,
            consecutive_failures: 0,
            health_score: 50.0,
        };
        assert_eq!(health.success_rate(), None);
        assert_eq!(health.avg_latency(), None);
    }

    #[test]
    fn avg_latency_handles_counts_beyond_u32() {
        let request_count = u64::from(u32::MAX) + 1;
        let health = ProviderHealth {
            provider: "openai".into(),
            available: true,
            success_count: request_count,
            failure_count: 0,
            total_latency: Duration::from_secs(request_count * 2),
            request_count,
            consecutive_failures: 0,
            health_score: 100.0,
        };
        assert_eq!(health.avg_latency(), Some(Duration::from_secs(2)));
    }
}
