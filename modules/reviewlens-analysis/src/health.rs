use std::collections::HashMap;
use std::sync::{Mutex, RwLock};
use std::time::Duration;

use tracing::debug;

use reviewlens_common::ProviderHealth;

/// Score given to a provider that has never been called.
pub const NEUTRAL_SCORE: f64 = 50.0;

const SUCCESS_WEIGHT: f64 = 70.0;
const LATENCY_WEIGHT: f64 = 30.0;
const STREAK_PENALTY: f64 = 10.0;
/// Average latency at which the latency component reaches zero.
const LATENCY_CEILING: Duration = Duration::from_secs(30);

/// What changed for a provider as a result of one recorded call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthTransition {
    Steady,
    /// The call failed; `consecutive_failures` includes it.
    Failing { consecutive_failures: u64 },
    /// First success after a failure streak.
    Recovered { after_failures: u64 },
}

/// Process-wide provider reputation shared by every concurrent analysis.
pub trait HealthTracker: Send + Sync {
    fn record_result(&self, provider: &str, success: bool, latency: Duration) -> HealthTransition;

    /// 0-100. Providers with no recorded calls get [`NEUTRAL_SCORE`].
    fn health_score(&self, provider: &str) -> f64 {
        self.metrics(provider).health_score
    }

    /// Consistent snapshot of one provider's counters.
    fn metrics(&self, provider: &str) -> ProviderHealth;

    fn set_available(&self, provider: &str, available: bool);

    /// Zero all counters for `provider`. Availability is left alone.
    fn reset(&self, provider: &str);
}

#[derive(Debug, Clone)]
struct Counters {
    available: bool,
    success_count: u64,
    failure_count: u64,
    total_latency: Duration,
    request_count: u64,
    consecutive_failures: u64,
}

impl Default for Counters {
    fn default() -> Self {
        Self {
            available: true,
            success_count: 0,
            failure_count: 0,
            total_latency: Duration::ZERO,
            request_count: 0,
            consecutive_failures: 0,
        }
    }
}

impl Counters {
    fn score(&self) -> f64 {
        if self.request_count == 0 {
            return NEUTRAL_SCORE;
        }
        let attempts = self.success_count + self.failure_count;
        let success_rate = if attempts == 0 {
            0.0
        } else {
            self.success_count as f64 / attempts as f64
        };
        let avg_latency = self.total_latency.as_secs_f64() / self.request_count as f64;
        let latency_score = (1.0 - avg_latency / LATENCY_CEILING.as_secs_f64()).max(0.0);

        let score = SUCCESS_WEIGHT * success_rate + LATENCY_WEIGHT * latency_score
            - STREAK_PENALTY * self.consecutive_failures as f64;
        score.clamp(0.0, 100.0)
    }

    fn snapshot(&self, provider: &str) -> ProviderHealth {
        ProviderHealth {
            provider: provider.to_string(),
            available: self.available,
            success_count: self.success_count,
            failure_count: self.failure_count,
            total_latency: self.total_latency,
            request_count: self.request_count,
            consecutive_failures: self.consecutive_failures,
            health_score: self.score(),
        }
    }
}

#[derive(Default)]
struct Registry {
    index: HashMap<String, usize>,
    slots: Vec<Mutex<Counters>>,
}

/// Fixed slots indexed by provider name. A slot is created on first use and
/// never removed. Each slot has its own lock, so updates to one provider
/// never block another and every snapshot is internally consistent.
#[derive(Default)]
pub struct ProviderHealthTracker {
    registry: RwLock<Registry>,
}

impl ProviderHealthTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-create slots so `status` lists providers before their first call.
    pub fn with_providers<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let tracker = Self::new();
        for name in names {
            tracker.with_slot(name.as_ref(), |_| ());
        }
        tracker
    }

    pub fn providers(&self) -> Vec<String> {
        let registry = self.registry.read().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<(usize, String)> =
            registry.index.iter().map(|(name, i)| (*i, name.clone())).collect();
        names.sort();
        names.into_iter().map(|(_, name)| name).collect()
    }

    fn with_slot<R>(&self, provider: &str, f: impl FnOnce(&mut Counters) -> R) -> R {
        {
            let registry = self.registry.read().unwrap_or_else(|e| e.into_inner());
            if let Some(&i) = registry.index.get(provider) {
                let mut counters = registry.slots[i].lock().unwrap_or_else(|e| e.into_inner());
                return f(&mut counters);
            }
        }

        let mut registry = self.registry.write().unwrap_or_else(|e| e.into_inner());
        let i = match registry.index.get(provider) {
            Some(&i) => i,
            None => {
                let i = registry.slots.len();
                registry.slots.push(Mutex::new(Counters::default()));
                registry.index.insert(provider.to_string(), i);
                debug!(provider, slot = i, "Registered provider health slot");
                i
            }
        };
        let mut counters = registry.slots[i].lock().unwrap_or_else(|e| e.into_inner());
        f(&mut counters)
    }
}

impl HealthTracker for ProviderHealthTracker {
    fn record_result(&self, provider: &str, success: bool, latency: Duration) -> HealthTransition {
        self.with_slot(provider, |c| {
            c.request_count += 1;
            c.total_latency += latency;
            if success {
                c.success_count += 1;
                let streak = std::mem::take(&mut c.consecutive_failures);
                if streak > 0 {
                    HealthTransition::Recovered {
                        after_failures: streak,
                    }
                } else {
                    HealthTransition::Steady
                }
            } else {
                c.failure_count += 1;
                c.consecutive_failures += 1;
                HealthTransition::Failing {
                    consecutive_failures: c.consecutive_failures,
                }
            }
        })
    }

    fn metrics(&self, provider: &str) -> ProviderHealth {
        self.with_slot(provider, |c| c.snapshot(provider))
    }

    fn set_available(&self, provider: &str, available: bool) {
        self.with_slot(provider, |c| c.available = available);
    }

    fn reset(&self, provider: &str) {
        self.with_slot(provider, |c| {
            *c = Counters {
                available: c.available,
                ..Counters::default()
            }
        });
    }
}
