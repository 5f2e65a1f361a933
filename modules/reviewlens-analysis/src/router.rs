use std::cmp::Ordering;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use reviewlens_common::ProviderHealth;

use crate::health::HealthTracker;
use crate::providers::ReviewAnalyzer;

#[derive(Debug, Clone, Serialize)]
pub struct ProviderStatus {
    #[serde(flatten)]
    pub health: ProviderHealth,
    pub forced: bool,
    pub max_batch_size: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CostEstimate {
    pub provider: String,
    pub available: bool,
    pub review_count: usize,
    pub estimated_cost: f64,
}

/// Picks the provider for the next analysis from health scores and an
/// optional manual override. Never retries on its own; fallback belongs to
/// the orchestrator.
pub struct ProviderRouter {
    providers: Vec<Arc<dyn ReviewAnalyzer>>,
    health: Arc<dyn HealthTracker>,
    forced: RwLock<Option<String>>,
}

impl ProviderRouter {
    pub fn new(providers: Vec<Arc<dyn ReviewAnalyzer>>, health: Arc<dyn HealthTracker>) -> Self {
        Self {
            providers,
            health,
            forced: RwLock::new(None),
        }
    }

    pub fn health(&self) -> &Arc<dyn HealthTracker> {
        &self.health
    }

    pub fn providers(&self) -> &[Arc<dyn ReviewAnalyzer>] {
        &self.providers
    }

    pub fn provider(&self, name: &str) -> Option<Arc<dyn ReviewAnalyzer>> {
        self.providers.iter().find(|p| p.name() == name).cloned()
    }

    fn is_available(&self, provider: &dyn ReviewAnalyzer, health: &ProviderHealth) -> bool {
        provider.is_available() && health.available
    }

    /// Best available provider not in `excluding`: highest health score,
    /// ties broken by lowest average latency, then registration order. A
    /// forced provider wins while it stays available and is not excluded.
    pub fn select_optimal(&self, excluding: &[String]) -> Option<Arc<dyn ReviewAnalyzer>> {
        let excluded = |name: &str| excluding.iter().any(|e| e == name);

        if let Some(forced) = self.forced() {
            match self.provider(&forced) {
                Some(p) if !excluded(&forced) => {
                    let health = self.health.metrics(&forced);
                    if self.is_available(p.as_ref(), &health) {
                        debug!(provider = %forced, "Using forced provider");
                        return Some(p);
                    }
                    warn!(provider = %forced, "Forced provider unavailable, selecting by health");
                }
                _ => {}
            }
        }

        // One snapshot per provider so score and latency come from the same
        // moment even while other analyses record results.
        let mut best: Option<(&Arc<dyn ReviewAnalyzer>, ProviderHealth)> = None;
        for provider in &self.providers {
            if excluded(provider.name()) {
                continue;
            }
            let health = self.health.metrics(provider.name());
            if !self.is_available(provider.as_ref(), &health) {
                continue;
            }
            let better = match &best {
                None => true,
                Some((_, current)) => rank(&health, current) == Ordering::Greater,
            };
            if better {
                best = Some((provider, health));
            }
        }

        best.map(|(provider, health)| {
            info!(
                provider = provider.name(),
                health_score = health.health_score,
                "Selected provider"
            );
            Arc::clone(provider)
        })
    }

    /// Pin selection to `name`. False if unknown or unavailable.
    pub fn force_select(&self, name: &str) -> bool {
        let Some(provider) = self.provider(name) else {
            warn!(provider = name, "Cannot force unknown provider");
            return false;
        };
        let health = self.health.metrics(name);
        if !self.is_available(provider.as_ref(), &health) {
            warn!(provider = name, "Cannot force unavailable provider");
            return false;
        }
        *self.forced.write().unwrap_or_else(|e| e.into_inner()) = Some(name.to_string());
        info!(provider = name, "Provider forced");
        true
    }

    pub fn clear_forced(&self) {
        *self.forced.write().unwrap_or_else(|e| e.into_inner()) = None;
    }

    pub fn forced(&self) -> Option<String> {
        self.forced.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// `None` for an unknown provider.
    pub fn estimate_cost(&self, name: &str, review_count: usize) -> Option<f64> {
        self.provider(name).map(|p| p.estimated_cost(review_count))
    }

    /// Every configured provider, cheapest first.
    pub fn cost_comparison(&self, review_count: usize) -> Vec<CostEstimate> {
        let mut estimates: Vec<CostEstimate> = self
            .providers
            .iter()
            .map(|p| CostEstimate {
                provider: p.name().to_string(),
                available: self.is_available(p.as_ref(), &self.health.metrics(p.name())),
                review_count,
                estimated_cost: p.estimated_cost(review_count),
            })
            .collect();
        estimates.sort_by(|a, b| a.estimated_cost.total_cmp(&b.estimated_cost));
        estimates
    }

    pub fn status(&self) -> Vec<ProviderStatus> {
        let forced = self.forced();
        self.providers
            .iter()
            .map(|p| {
                let mut health = self.health.metrics(p.name());
                health.available = self.is_available(p.as_ref(), &health);
                ProviderStatus {
                    forced: forced.as_deref() == Some(p.name()),
                    max_batch_size: p.max_batch_size(),
                    health,
                }
            })
            .collect()
    }
}

/// Greater means `a` is the better pick.
fn rank(a: &ProviderHealth, b: &ProviderHealth) -> Ordering {
    a.health_score.total_cmp(&b.health_score).then_with(|| {
        let latency = |h: &ProviderHealth| h.avg_latency().unwrap_or(Duration::ZERO);
        latency(b).cmp(&latency(a))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::ProviderHealthTracker;
    use crate::testing::MockAnalyzer;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn router(tracker: Arc<ProviderHealthTracker>, providers: Vec<MockAnalyzer>) -> ProviderRouter {
        let providers = providers
            .into_iter()
            .map(|p| Arc::new(p) as Arc<dyn ReviewAnalyzer>)
            .collect();
        ProviderRouter::new(providers, tracker)
    }

    #[test]
    fn selects_highest_health_score() {
        let tracker = Arc::new(ProviderHealthTracker::new());
        tracker.record_result("a", true, secs(20));
        tracker.record_result("b", true, secs(2));
        let router = router(tracker, vec![MockAnalyzer::new("a"), MockAnalyzer::new("b")]);

        assert_eq!(router.select_optimal(&[]).unwrap().name(), "b");
    }

    #[test]
    fn ties_go_to_lower_latency() {
        let tracker = Arc::new(ProviderHealthTracker::new());
        // 70 + 30 * 0 = 70 for both, latencies differ beyond the ceiling.
        tracker.record_result("slow", true, secs(90));
        tracker.record_result("fast", true, secs(40));
        let router = router(
            tracker,
            vec![MockAnalyzer::new("slow"), MockAnalyzer::new("fast")],
        );

        assert_eq!(router.select_optimal(&[]).unwrap().name(), "fast");
    }

    #[test]
    fn skips_unavailable_and_excluded() {
        let tracker = Arc::new(ProviderHealthTracker::new());
        let router = router(
            tracker,
            vec![
                MockAnalyzer::new("a").unavailable(),
                MockAnalyzer::new("b"),
                MockAnalyzer::new("c"),
            ],
        );

        assert_eq!(router.select_optimal(&[]).unwrap().name(), "b");
        assert_eq!(router.select_optimal(&["b".into()]).unwrap().name(), "c");
        assert!(router
            .select_optimal(&["b".into(), "c".into()])
            .is_none());
    }

    #[test]
    fn tracker_availability_flag_is_respected() {
        let tracker = Arc::new(ProviderHealthTracker::new());
        tracker.set_available("a", false);
        let router = router(tracker, vec![MockAnalyzer::new("a"), MockAnalyzer::new("b")]);

        assert_eq!(router.select_optimal(&[]).unwrap().name(), "b");
        assert!(!router.status()[0].health.available);
    }

    #[test]
    fn forced_provider_wins_until_excluded() {
        let tracker = Arc::new(ProviderHealthTracker::new());
        tracker.record_result("a", true, secs(1));
        tracker.record_result("b", false, secs(1));
        let router = router(tracker, vec![MockAnalyzer::new("a"), MockAnalyzer::new("b")]);

        assert!(router.force_select("b"));
        assert_eq!(router.select_optimal(&[]).unwrap().name(), "b");
        assert_eq!(router.select_optimal(&["b".into()]).unwrap().name(), "a");

        router.clear_forced();
        assert_eq!(router.select_optimal(&[]).unwrap().name(), "a");
    }

    #[test]
    fn force_select_rejects_unknown_and_unavailable() {
        let tracker = Arc::new(ProviderHealthTracker::new());
        let router = router(tracker, vec![MockAnalyzer::new("a").unavailable()]);

        assert!(!router.force_select("a"));
        assert!(!router.force_select("missing"));
        assert_eq!(router.forced(), None);
    }

    #[test]
    fn cost_comparison_is_sorted_and_deterministic() {
        let tracker = Arc::new(ProviderHealthTracker::new());
        let router = router(
            tracker,
            vec![
                MockAnalyzer::new("pricey").with_pricing(3.0, 15.0),
                MockAnalyzer::new("cheap").with_pricing(0.1, 0.4),
            ],
        );

        let first = router.cost_comparison(500);
        let second = router.cost_comparison(500);
        assert_eq!(first[0].provider, "cheap");
        assert_eq!(first[1].provider, "pricey");
        assert_eq!(first[0].estimated_cost, second[0].estimated_cost);
        assert_eq!(router.estimate_cost("pricey", 500), Some(first[1].estimated_cost));
        assert_eq!(router.estimate_cost("missing", 500), None);
    }
}
