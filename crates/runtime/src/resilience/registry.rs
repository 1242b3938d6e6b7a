//! Per-key circuit breakers created on first use.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use super::circuit_breaker::{CircuitBreakerConfig, CircuitBreakerEngine, CircuitBreakerSnapshot};
use crate::error::ConfigResult;
use crate::metrics::MetricsRegistry;
use crate::time::{Clock, SystemClock};

/// Shared handle to one keyed breaker.
pub type SharedBreaker<C = SystemClock> = Arc<CircuitBreakerEngine<C>>;

/// Lazily populated map from key to [`CircuitBreakerEngine`]
///
/// As with caches, the configuration supplied when a key is first seen is
/// the one that sticks.
pub struct CircuitBreakerRegistry<C: Clock = SystemClock> {
    breakers: RwLock<HashMap<String, SharedBreaker<C>>>,
    metrics: Arc<MetricsRegistry>,
    default_config: CircuitBreakerConfig,
    clock: C,
}

impl<C: Clock> fmt::Debug for CircuitBreakerRegistry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreakerRegistry")
            .field("keys", &self.breakers.read().keys().collect::<Vec<_>>())
            .field("default_config", &self.default_config)
            .finish_non_exhaustive()
    }
}

impl CircuitBreakerRegistry<SystemClock> {
    pub fn new(metrics: Arc<MetricsRegistry>) -> Self {
        Self::with_clock(metrics, SystemClock)
    }
}

impl<C: Clock + Clone> CircuitBreakerRegistry<C> {
    pub fn with_clock(metrics: Arc<MetricsRegistry>, clock: C) -> Self {
        Self {
            breakers: RwLock::new(HashMap::new()),
            metrics,
            default_config: CircuitBreakerConfig::default(),
            clock,
        }
    }

    #[must_use]
    pub fn with_default_config(mut self, config: CircuitBreakerConfig) -> Self {
        self.default_config = config;
        self
    }

    pub fn default_config(&self) -> &CircuitBreakerConfig {
        &self.default_config
    }

    /// Breaker for `key`, created with the default configuration if absent
    pub fn get_or_create(&self, key: &str) -> ConfigResult<SharedBreaker<C>> {
        let config = self.default_config.clone();
        self.get_or_create_with(key, config)
    }

    /// Breaker for `key`, created with `config` if absent
    pub fn get_or_create_with(
        &self,
        key: &str,
        config: CircuitBreakerConfig,
    ) -> ConfigResult<SharedBreaker<C>> {
        if let Some(breaker) = self.breakers.read().get(key) {
            return Ok(Arc::clone(breaker));
        }

        let mut breakers = self.breakers.write();
        if let Some(breaker) = breakers.get(key) {
            if breaker.config() != &config {
                debug!(key, "circuit_breaker_config_ignored_existing_instance");
            }
            return Ok(Arc::clone(breaker));
        }

        let breaker = Arc::new(CircuitBreakerEngine::with_clock(
            key,
            config,
            Arc::clone(&self.metrics),
            self.clock.clone(),
        )?);
        info!(
            key,
            failure_threshold = breaker.config().failure_threshold,
            timeout_ms = breaker.config().timeout.as_millis() as u64,
            "circuit_breaker_created"
        );
        breakers.insert(key.to_owned(), Arc::clone(&breaker));
        Ok(breaker)
    }

    pub fn get(&self, key: &str) -> Option<SharedBreaker<C>> {
        self.breakers.read().get(key).map(Arc::clone)
    }

    pub fn remove(&self, key: &str) -> Option<SharedBreaker<C>> {
        self.breakers.write().remove(key)
    }

    /// Breaker keys in sorted order
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.breakers.read().keys().cloned().collect();
        keys.sort_unstable();
        keys
    }

    pub fn len(&self) -> usize {
        self.breakers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Force every breaker back to Closed
    pub fn reset_all(&self) {
        for breaker in self.handles() {
            breaker.reset();
        }
    }

    /// Snapshot of every breaker keyed by name
    pub fn snapshot_all(&self) -> BTreeMap<String, CircuitBreakerSnapshot> {
        self.handles()
            .into_iter()
            .map(|breaker| (breaker.key().to_owned(), breaker.snapshot()))
            .collect()
    }

    fn handles(&self) -> Vec<SharedBreaker<C>> {
        self.breakers.read().values().map(Arc::clone).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::resilience::CircuitState;
    use crate::time::MockClock;

    fn registry() -> CircuitBreakerRegistry<MockClock> {
        CircuitBreakerRegistry::with_clock(Arc::new(MetricsRegistry::new()), MockClock::new())
            .with_default_config(
                CircuitBreakerConfig::new().failure_threshold(1).build().expect("valid config"),
            )
    }

    #[test]
    fn get_or_create_returns_same_instance() {
        let registry = registry();
        let a = registry.get_or_create("billing").expect("valid config");
        let b = registry
            .get_or_create_with(
                "billing",
                CircuitBreakerConfig::new().failure_threshold(9).build().expect("valid config"),
            )
            .expect("valid config");

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(b.config().failure_threshold, 1);
        assert_eq!(registry.keys(), vec!["billing".to_string()]);
    }

    /// Validates key isolation between breakers.
    ///
    /// Assertions:
    /// - Confirms failures on one key never open another.
    /// - Confirms `snapshot_all` reports every key.
    #[test]
    fn breakers_are_isolated_per_key() {
        let registry = registry();
        let search = registry.get_or_create("search").expect("valid config");
        let billing = registry.get_or_create("billing").expect("valid config");

        search.record_call(false);

        let snapshots = registry.snapshot_all();
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots["search"].state, CircuitState::Open);
        assert_eq!(snapshots["billing"].state, CircuitState::Closed);
        assert!(billing.should_allow_call());
    }

    #[test]
    fn reset_all_closes_every_breaker() {
        let registry = registry();
        for key in ["a", "b", "c"] {
            registry.get_or_create(key).expect("valid config").record_call(false);
        }

        registry.reset_all();
        assert!(registry.snapshot_all().values().all(|s| s.state == CircuitState::Closed));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let registry = registry();
        let config = CircuitBreakerConfig { timeout: Duration::ZERO, ..Default::default() };
        assert!(registry.get_or_create_with("bad", config).is_err());
        assert!(registry.get("bad").is_none());
        assert!(registry.remove("bad").is_none());
    }
}
