//! TTL + eviction cache engine
//!
//! [`CacheEngine`] is one named cache instance: a `HashMap` of entries plus the
//! ordering index its eviction policy needs, both guarded by a single mutex.
//! Every `get`/`set` reports a hit, miss or write to the shared
//! [`MetricsRegistry`] under the cache name after the lock is released.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, info};

use super::config::{CacheConfig, EvictionPolicy};
use super::entry::CacheEntry;
use super::index::EvictionIndex;
use super::stats::{CacheCounters, CacheStats};
use crate::error::ConfigResult;
use crate::metrics::{MetricsRegistry, Outcome};
use crate::time::{Clock, SystemClock};

/// Estimates the in-memory size of a value for metrics reporting.
pub type SizeEstimator<V> = Arc<dyn Fn(&V) -> usize + Send + Sync>;

/// Storage and ordering index, always mutated together.
struct CacheInner<K, V> {
    storage: HashMap<K, CacheEntry<V>>,
    index: EvictionIndex<K>,
    next_seq: u64,
    tick: u64,
}

enum Lookup<V> {
    Hit { value: V, size_bytes: usize },
    Miss,
    Expired,
}

impl<K, V> CacheInner<K, V>
where
    K: Eq + Hash + Clone,
{
    fn new(policy: EvictionPolicy) -> Self {
        Self { storage: HashMap::new(), index: EvictionIndex::new(policy), next_seq: 0, tick: 0 }
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn read(&mut self, key: &K, now: Instant, config: &CacheConfig) -> Lookup<V>
    where
        V: Clone,
    {
        let valid = match self.storage.get(key) {
            Some(entry) => entry.is_valid(now),
            None => return Lookup::Miss,
        };
        if !valid {
            self.remove_entry(key);
            return Lookup::Expired;
        }

        let tick = self.next_tick();
        let Some(entry) = self.storage.get_mut(key) else {
            return Lookup::Miss;
        };
        let old = entry.position();
        entry.last_accessed = now;
        entry.access_count = entry.access_count.saturating_add(1);
        entry.recency = tick;
        if config.refresh_on_read {
            entry.expires_at = now.checked_add(config.ttl);
        }
        let new = entry.position();
        let value = entry.value.clone();
        let size_bytes = entry.size_bytes;

        self.index.reposition(key, old, new);
        Lookup::Hit { value, size_bytes }
    }

    /// Inserts or overwrites `key`, returning the key evicted to make room.
    fn write(
        &mut self,
        key: K,
        value: V,
        size_bytes: usize,
        now: Instant,
        config: &CacheConfig,
    ) -> Option<K> {
        let expires_at = now.checked_add(config.ttl);
        let tick = self.next_tick();

        if let Some(entry) = self.storage.get_mut(&key) {
            let old = entry.position();
            entry.value = value;
            entry.size_bytes = size_bytes;
            entry.created_at = now;
            entry.last_accessed = now;
            entry.expires_at = expires_at;
            entry.recency = tick;
            let new = entry.position();
            self.index.reposition(&key, old, new);
            return None;
        }

        let evicted = if config.eviction_policy != EvictionPolicy::TimeOnly
            && self.storage.len() >= config.max_entries
        {
            self.evict_one()
        } else {
            None
        };

        let seq = self.next_seq;
        self.next_seq += 1;
        let entry = CacheEntry::new(value, size_bytes, now, expires_at, seq, tick);
        self.index.insert(key.clone(), entry.position());
        self.storage.insert(key, entry);
        evicted
    }

    fn evict_one(&mut self) -> Option<K> {
        let victim = self.index.victim().cloned()?;
        self.remove_entry(&victim);
        Some(victim)
    }

    fn remove_entry(&mut self, key: &K) -> Option<CacheEntry<V>> {
        let entry = self.storage.remove(key)?;
        self.index.remove(entry.position());
        Some(entry)
    }

    fn purge_expired(&mut self, now: Instant) -> usize {
        let expired: Vec<K> = self
            .storage
            .iter()
            .filter(|(_, entry)| !entry.is_valid(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            self.remove_entry(key);
        }
        expired.len()
    }

    fn clear(&mut self) {
        self.storage.clear();
        self.index.clear();
    }
}

/// A named, thread-safe cache with TTL expiry and a fixed eviction policy
///
/// # Type Parameters
/// - `K`: Key type (must be `Eq + Hash + Clone`)
/// - `V`: Value type (must be `Clone`)
/// - `C`: Clock type for time-based operations (defaults to `SystemClock`)
///
/// # Example
/// ```
/// use std::sync::Arc;
///
/// use bulwark_runtime::cache::{CacheConfig, CacheEngine};
/// use bulwark_runtime::metrics::MetricsRegistry;
///
/// let metrics = Arc::new(MetricsRegistry::new());
/// let cache: CacheEngine<String, i32> =
///     CacheEngine::new("Pricing.quote", CacheConfig::lru(100), metrics.clone()).unwrap();
///
/// cache.set("sku-1".to_string(), 42);
/// assert_eq!(cache.get(&"sku-1".to_string()), Some(42));
/// assert_eq!(metrics.stats_for("Pricing.quote").unwrap().count, 2);
/// ```
pub struct CacheEngine<K, V, C = SystemClock>
where
    C: Clock,
{
    name: String,
    config: CacheConfig,
    inner: Mutex<CacheInner<K, V>>,
    counters: CacheCounters,
    metrics: Arc<MetricsRegistry>,
    clock: C,
    size_of: SizeEstimator<V>,
}

impl<K, V, C: Clock> fmt::Debug for CacheEngine<K, V, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheEngine")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("len", &self.inner.lock().storage.len())
            .finish_non_exhaustive()
    }
}

impl<K, V> CacheEngine<K, V, SystemClock>
where
    K: Eq + Hash + Clone,
    V: Clone + 'static,
{
    /// Create a cache using the system clock
    pub fn new(
        name: impl Into<String>,
        config: CacheConfig,
        metrics: Arc<MetricsRegistry>,
    ) -> ConfigResult<Self> {
        Self::with_clock(name, config, metrics, SystemClock)
    }
}

impl<K, V, C> CacheEngine<K, V, C>
where
    K: Eq + Hash + Clone,
    V: Clone + 'static,
    C: Clock,
{
    /// Create a cache with a custom clock (useful for testing)
    pub fn with_clock(
        name: impl Into<String>,
        config: CacheConfig,
        metrics: Arc<MetricsRegistry>,
        clock: C,
    ) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self {
            name: name.into(),
            inner: Mutex::new(CacheInner::new(config.eviction_policy)),
            config,
            counters: CacheCounters::default(),
            metrics,
            clock,
            size_of: Arc::new(|_: &V| std::mem::size_of::<V>()),
        })
    }

    /// Replace the default `size_of::<V>()` size estimate.
    #[must_use]
    pub fn with_size_estimator<F>(mut self, estimator: F) -> Self
    where
        F: Fn(&V) -> usize + Send + Sync + 'static,
    {
        self.size_of = Arc::new(estimator);
        self
    }

    pub(crate) fn with_shared_size_estimator(mut self, estimator: SizeEstimator<V>) -> Self {
        self.size_of = estimator;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Look up `key`
    ///
    /// An expired entry is removed, counted as an expiration and reported as
    /// a miss. A hit refreshes recency (and frequency for LFU).
    pub fn get(&self, key: &K) -> Option<V> {
        let started = Instant::now();
        let now = self.clock.now();
        let lookup = self.inner.lock().read(key, now, &self.config);

        match lookup {
            Lookup::Hit { value, size_bytes } => {
                self.counters.record_hit();
                self.metrics.record(&self.name, Outcome::hit(started.elapsed(), size_bytes));
                Some(value)
            }
            Lookup::Expired => {
                self.counters.record_miss();
                self.counters.record_expirations(1);
                debug!(cache = %self.name, "cache_entry_expired");
                self.metrics.record(&self.name, Outcome::miss(started.elapsed()));
                None
            }
            Lookup::Miss => {
                self.counters.record_miss();
                self.metrics.record(&self.name, Outcome::miss(started.elapsed()));
                None
            }
        }
    }

    /// Insert or overwrite `key`
    ///
    /// A new key arriving at a full cache first evicts one entry chosen by the
    /// policy. Overwrites always restart the TTL.
    pub fn set(&self, key: K, value: V) {
        let started = Instant::now();
        let now = self.clock.now();
        let size_bytes = (self.size_of)(&value);
        let evicted = self.inner.lock().write(key, value, size_bytes, now, &self.config);

        if evicted.is_some() {
            self.counters.record_eviction();
            debug!(
                cache = %self.name,
                policy = self.config.eviction_policy.as_str(),
                "cache_entry_evicted"
            );
        }
        self.counters.record_write();
        self.metrics.record(&self.name, Outcome::write(started.elapsed(), size_bytes));
    }

    /// Remove `key`, returning its value when present (expired or not)
    pub fn remove(&self, key: &K) -> Option<V> {
        self.inner.lock().remove_entry(key).map(|entry| entry.value)
    }

    /// Drop every entry; lifetime counters are kept
    pub fn clear(&self) {
        self.inner.lock().clear();
        debug!(cache = %self.name, "cache_cleared");
    }

    /// Remove every expired entry and return how many were removed
    pub fn perform_maintenance(&self) -> usize {
        let now = self.clock.now();
        let removed = self.inner.lock().purge_expired(now);
        if removed > 0 {
            self.counters.record_expirations(removed as u64);
            info!(cache = %self.name, removed, "cache_maintenance_sweep");
        }
        removed
    }

    /// Whether a valid entry exists, without touching recency or metrics
    pub fn contains_key(&self, key: &K) -> bool {
        let now = self.clock.now();
        self.inner.lock().storage.get(key).is_some_and(|entry| entry.is_valid(now))
    }

    /// Copy of the stored entry, including expired ones not yet swept
    pub fn peek_entry(&self, key: &K) -> Option<CacheEntry<V>> {
        self.inner.lock().storage.get(key).cloned()
    }

    /// Get the current number of entries (expired entries count until swept)
    pub fn len(&self) -> usize {
        self.inner.lock().storage.len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let max_entries = match self.config.eviction_policy {
            EvictionPolicy::TimeOnly => None,
            _ => Some(self.config.max_entries),
        };
        self.counters.snapshot(self.len(), max_entries)
    }

    /// Zero the lifetime counters
    pub fn reset_stats(&self) {
        self.counters.reset();
    }

    /// Get or insert with a generator function
    ///
    /// ```
    /// use std::sync::Arc;
    ///
    /// use bulwark_runtime::cache::{CacheConfig, CacheEngine};
    /// use bulwark_runtime::metrics::MetricsRegistry;
    ///
    /// let cache: CacheEngine<&str, u64> =
    ///     CacheEngine::new("fib", CacheConfig::lru(8), Arc::new(MetricsRegistry::new())).unwrap();
    /// assert_eq!(cache.get_or_insert_with("f30", || 832_040), 832_040);
    /// assert_eq!(cache.get_or_insert_with("f30", || unreachable!()), 832_040);
    /// ```
    pub fn get_or_insert_with<F>(&self, key: K, f: F) -> V
    where
        F: FnOnce() -> V,
    {
        if let Some(value) = self.get(&key) {
            return value;
        }

        let value = f();
        self.set(key, value.clone());
        value
    }

    /// Memoise a fallible async operation
    ///
    /// On a miss `f` runs without any cache lock held. Successful values are
    /// stored; errors are returned to the caller and never cached.
    pub async fn get_or_try_insert_with<F, Fut, E>(&self, key: K, f: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }

        let value = f().await?;
        self.set(key, value.clone());
        Ok(value)
    }
}
