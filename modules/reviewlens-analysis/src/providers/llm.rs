use std::collections::HashMap;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::debug;

use ai_client::{Claude, OpenAi, OpenRouter, StructuredAgent};
use reviewlens_common::Review;

use super::prompt::{system_prompt, user_prompt};
use super::{Pricing, ProviderBatch, ProviderError, RawVerdict, ReviewAnalyzer};

// =============================================================================
// Types for LLM structured output
// =============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct BatchAssessment {
    /// One verdict per submitted review
    pub reviews: Vec<ReviewVerdict>,
    /// Manipulation patterns seen across several reviews
    pub key_patterns: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ReviewVerdict {
    /// Review id, copied from the <review> tag
    pub id: String,
    /// Probability the review is fake, 0-100
    pub score: i64,
    /// "genuine", "suspicious" or "fake"
    pub label: Option<String>,
    /// 0.0-1.0
    pub confidence: Option<f64>,
    /// One-sentence justification
    pub explanation: Option<String>,
    /// Short tags for the signals observed
    pub red_flags: Vec<String>,
}

// =============================================================================
// LlmAnalyzer
// =============================================================================

/// [`ReviewAnalyzer`] over any structured-output LLM backend.
#[derive(Clone)]
pub struct LlmAnalyzer<A> {
    agent: A,
    name: String,
    max_batch_size: usize,
    pricing: Pricing,
}

impl<A: StructuredAgent> LlmAnalyzer<A> {
    pub fn new(agent: A, max_batch_size: usize, pricing: Pricing) -> Self {
        Self {
            name: agent.provider().to_string(),
            agent,
            max_batch_size: max_batch_size.max(1),
            pricing,
        }
    }

    pub fn model(&self) -> &str {
        self.agent.model()
    }
}

impl LlmAnalyzer<Claude> {
    pub fn anthropic(agent: Claude) -> Self {
        Self::new(agent, 100, Pricing::new(0.80, 4.00))
    }
}

impl LlmAnalyzer<OpenAi> {
    pub fn openai(agent: OpenAi) -> Self {
        Self::new(agent, 80, Pricing::new(0.15, 0.60))
    }
}

impl LlmAnalyzer<OpenRouter> {
    pub fn openrouter(agent: OpenRouter) -> Self {
        Self::new(agent, 50, Pricing::new(0.14, 0.28))
    }
}

#[async_trait]
impl<A> ReviewAnalyzer for LlmAnalyzer<A>
where
    A: StructuredAgent + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn is_available(&self) -> bool {
        self.agent.is_configured()
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    fn pricing(&self) -> Pricing {
        self.pricing
    }

    async fn analyze(&self, reviews: &[Review]) -> Result<ProviderBatch, ProviderError> {
        let user = user_prompt(reviews);
        let completion = self
            .agent
            .extract::<BatchAssessment>(system_prompt(), &user)
            .await?;

        debug!(
            provider = %self.name,
            model = self.agent.model(),
            reviews = reviews.len(),
            verdicts = completion.value.reviews.len(),
            "Provider batch response"
        );

        Ok(into_batch(completion.value, reviews, completion.usage))
    }
}

/// Ids are echoed back as they appeared in the prompt; map attribute-escaped
/// forms back to the real id.
fn into_batch(
    assessment: BatchAssessment,
    reviews: &[Review],
    usage: Option<ai_client::TokenUsage>,
) -> ProviderBatch {
    let escaped: HashMap<String, &str> = reviews
        .iter()
        .filter(|r| r.id.contains(['&', '"', '<']))
        .map(|r| {
            let attr = r.id.replace('&', "&amp;").replace('"', "&quot;").replace('<', "&lt;");
            (attr, r.id.as_str())
        })
        .collect();

    let verdicts = assessment
        .reviews
        .into_iter()
        .map(|v| {
            let id = v.id.trim();
            let review_id = escaped.get(id).map(|s| s.to_string()).unwrap_or_else(|| id.to_string());
            RawVerdict {
                review_id,
                score: v.score,
                label: v.label,
                confidence: v.confidence,
                explanation: v.explanation,
                red_flags: v.red_flags,
            }
        })
        .collect();

    ProviderBatch {
        verdicts,
        key_patterns: assessment.key_patterns,
        usage,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analyzer_takes_provider_name_and_availability() {
        let analyzer = LlmAnalyzer::openai(OpenAi::new("sk-test", "gpt-4o-mini"));
        assert_eq!(analyzer.name(), "openai");
        assert!(analyzer.is_available());
        assert_eq!(analyzer.max_batch_size(), 80);
        assert_eq!(analyzer.model(), "gpt-4o-mini");

        let keyless = LlmAnalyzer::anthropic(Claude::new("", "claude-3-5-haiku-20241022"));
        assert!(!keyless.is_available());
        assert_eq!(keyless.name(), "anthropic");
    }

    #[test]
    fn cheaper_provider_estimates_lower() {
        let openai = LlmAnalyzer::openai(OpenAi::new("k", "gpt-4o-mini"));
        let claude = LlmAnalyzer::anthropic(Claude::new("k", "claude-3-5-haiku-20241022"));
        assert!(openai.estimated_cost(200) < claude.estimated_cost(200));
    }

    #[test]
    fn batch_maps_escaped_ids_back() {
        let reviews = vec![Review {
            id: "R\"1".into(),
            text: "ok".into(),
            rating: 3,
            verified: false,
            posted_at: None,
        }];
        let assessment: BatchAssessment = serde_json::from_value(serde_json::json!({
            "reviews": [
                {"id": " R&quot;1 ", "score": 120, "label": "fake", "confidence": 0.9,
                 "explanation": "template", "red_flags": ["generic"]},
                {"id": "R9", "score": 10, "label": null, "confidence": null,
                 "explanation": null, "red_flags": []}
            ],
            "key_patterns": ["copy-paste praise"]
        }))
        .unwrap();

        let batch = into_batch(assessment, &reviews, None);
        assert_eq!(batch.verdicts[0].review_id, "R\"1");
        assert_eq!(batch.verdicts[0].score, 120);
        assert_eq!(batch.verdicts[1].review_id, "R9");
        assert_eq!(batch.key_patterns, vec!["copy-paste praise"]);
    }
}
