//! Named cache instances created on first use.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use super::config::CacheConfig;
use super::core::{CacheEngine, SizeEstimator};
use super::key::CacheKey;
use crate::error::ConfigResult;
use crate::metrics::MetricsRegistry;
use crate::time::{Clock, SystemClock};

/// Shared handle to one named cache.
pub type SharedCache<V, C = SystemClock> = Arc<CacheEngine<CacheKey, V, C>>;

/// Lazily populated map from cache name to [`CacheEngine`].
///
/// The configuration passed on the first request for a name wins; later
/// requests return the existing instance unchanged.
///
/// ```rust
/// use std::sync::Arc;
///
/// use bulwark_runtime::cache::{CacheConfig, CacheKey, CacheRegistry};
/// use bulwark_runtime::metrics::MetricsRegistry;
///
/// let registry: CacheRegistry<String> = CacheRegistry::new(Arc::new(MetricsRegistry::new()));
/// let profiles = registry.get_or_create_with("UserService.profile", CacheConfig::lru(10)).unwrap();
/// profiles.set(CacheKey::new("user:1"), "Ada".to_string());
///
/// let again = registry.get_or_create("UserService.profile").unwrap();
/// assert_eq!(again.get(&CacheKey::new("user:1")), Some("Ada".to_string()));
/// ```
pub struct CacheRegistry<V, C = SystemClock>
where
    C: Clock,
{
    caches: RwLock<HashMap<String, SharedCache<V, C>>>,
    metrics: Arc<MetricsRegistry>,
    default_config: CacheConfig,
    clock: C,
    size_of: Option<SizeEstimator<V>>,
}

impl<V, C: Clock> fmt::Debug for CacheRegistry<V, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheRegistry")
            .field("caches", &self.names_unsorted())
            .field("default_config", &self.default_config)
            .finish_non_exhaustive()
    }
}

impl<V> CacheRegistry<V, SystemClock>
where
    V: Clone + 'static,
{
    pub fn new(metrics: Arc<MetricsRegistry>) -> Self {
        Self::with_clock(metrics, SystemClock)
    }
}

impl<V, C> CacheRegistry<V, C>
where
    V: Clone + 'static,
    C: Clock + Clone,
{
    /// Registry whose caches read time from `clock` (useful for testing)
    pub fn with_clock(metrics: Arc<MetricsRegistry>, clock: C) -> Self {
        Self {
            caches: RwLock::new(HashMap::new()),
            metrics,
            default_config: CacheConfig::default(),
            clock,
            size_of: None,
        }
    }

    /// Configuration used by [`get_or_create`](Self::get_or_create)
    #[must_use]
    pub fn with_default_config(mut self, config: CacheConfig) -> Self {
        self.default_config = config;
        self
    }

    /// Size estimator handed to every cache this registry creates
    #[must_use]
    pub fn with_size_estimator<F>(mut self, estimator: F) -> Self
    where
        F: Fn(&V) -> usize + Send + Sync + 'static,
    {
        self.size_of = Some(Arc::new(estimator));
        self
    }

    pub fn default_config(&self) -> &CacheConfig {
        &self.default_config
    }

    /// Cache `name`, created with the default configuration if absent
    pub fn get_or_create(&self, name: &str) -> ConfigResult<SharedCache<V, C>> {
        let config = self.default_config.clone();
        self.get_or_create_with(name, config)
    }

    /// Cache `name`, created with `config` if absent
    pub fn get_or_create_with(
        &self,
        name: &str,
        config: CacheConfig,
    ) -> ConfigResult<SharedCache<V, C>> {
        if let Some(cache) = self.caches.read().get(name) {
            return Ok(Arc::clone(cache));
        }

        let mut caches = self.caches.write();
        if let Some(cache) = caches.get(name) {
            if cache.config() != &config {
                debug!(cache = name, "cache_config_ignored_existing_instance");
            }
            return Ok(Arc::clone(cache));
        }

        let mut engine =
            CacheEngine::with_clock(name, config, Arc::clone(&self.metrics), self.clock.clone())?;
        if let Some(estimator) = &self.size_of {
            engine = engine.with_shared_size_estimator(Arc::clone(estimator));
        }
        info!(
            cache = name,
            policy = engine.config().eviction_policy.as_str(),
            max_entries = engine.config().max_entries,
            ttl_ms = engine.config().ttl.as_millis() as u64,
            "cache_created"
        );

        let engine = Arc::new(engine);
        caches.insert(name.to_owned(), Arc::clone(&engine));
        Ok(engine)
    }

    /// Existing cache `name`, if any
    pub fn get(&self, name: &str) -> Option<SharedCache<V, C>> {
        self.caches.read().get(name).map(Arc::clone)
    }

    /// Detach cache `name` from the registry
    pub fn remove(&self, name: &str) -> Option<SharedCache<V, C>> {
        self.caches.write().remove(name)
    }

    /// Cache names in sorted order
    pub fn names(&self) -> Vec<String> {
        let mut names = self.names_unsorted();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.caches.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clear the entries of every cache; instances stay registered
    pub fn clear_all(&self) {
        for cache in self.snapshot() {
            cache.clear();
        }
    }

    /// Sweep expired entries from every cache, returning the total removed
    pub fn perform_maintenance(&self) -> usize {
        self.snapshot().iter().map(|cache| cache.perform_maintenance()).sum()
    }

    /// Handles to every cache, taken so no registry lock is held while a
    /// cache lock is taken.
    fn snapshot(&self) -> Vec<SharedCache<V, C>> {
        self.caches.read().values().map(Arc::clone).collect()
    }
}

impl<V, C: Clock> CacheRegistry<V, C> {
    fn names_unsorted(&self) -> Vec<String> {
        self.caches.read().keys().cloned().collect()
    }
}
