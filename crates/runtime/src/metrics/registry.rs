//! Shared, thread-safe outcome store.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::outcome::{Outcome, OutcomeRecord};
use super::report;
use super::stats::Stats;
use crate::collections::RingBuffer;
use crate::error::{ConfigError, ConfigResult};
use crate::time::{Clock, SystemClock};

/// Default per-key history length.
pub const DEFAULT_BUFFER_CAPACITY: usize = 1000;
/// Default cap on distinct keys.
pub const DEFAULT_MAX_KEYS: usize = 10_000;

/// Metrics registry sizing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Records kept per key before the oldest is overwritten.
    pub buffer_capacity: usize,
    /// Distinct keys tracked; records for further keys are dropped.
    pub max_keys: usize,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { buffer_capacity: DEFAULT_BUFFER_CAPACITY, max_keys: DEFAULT_MAX_KEYS }
    }
}

impl MetricsConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.buffer_capacity == 0 {
            return Err(ConfigError::invalid("buffer_capacity must be greater than 0"));
        }
        if self.max_keys == 0 {
            return Err(ConfigError::invalid("max_keys must be greater than 0"));
        }
        Ok(())
    }
}

type KeyBuffer = Arc<RwLock<RingBuffer<OutcomeRecord>>>;

/// Per-key circular history of outcomes with on-demand aggregation.
///
/// Constructed once by the caller and shared with every engine as an `Arc`.
/// The key map sits behind a read/write lock with double-checked creation;
/// each key's buffer has its own lock so keys never contend with each other.
///
/// ```rust
/// use std::time::Duration;
///
/// use bulwark_runtime::metrics::{MetricsRegistry, Outcome};
///
/// let registry = MetricsRegistry::new();
/// registry.record("Inventory.lookup", Outcome::success(Duration::from_millis(12)));
/// registry.record("Inventory.lookup", Outcome::failure(Duration::from_millis(40)));
///
/// let stats = registry.stats_for("Inventory.lookup").unwrap();
/// assert_eq!(stats.count, 2);
/// assert_eq!(stats.success_count, 1);
/// ```
pub struct MetricsRegistry {
    config: MetricsConfig,
    buffers: RwLock<HashMap<String, KeyBuffer>>,
    dropped_records: AtomicU64,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricsRegistry")
            .field("config", &self.config)
            .field("keys", &self.key_count())
            .field("dropped_records", &self.dropped_records())
            .finish_non_exhaustive()
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRegistry {
    /// Registry with default sizing and the system clock.
    pub fn new() -> Self {
        Self::build(MetricsConfig::default(), Arc::new(SystemClock))
    }

    /// Registry with custom sizing.
    pub fn with_config(config: MetricsConfig) -> ConfigResult<Self> {
        Self::with_config_and_clock(config, SystemClock)
    }

    /// Registry with custom sizing and clock (useful for testing).
    pub fn with_config_and_clock<C: Clock>(config: MetricsConfig, clock: C) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self::build(config, Arc::new(clock)))
    }

    fn build(config: MetricsConfig, clock: Arc<dyn Clock>) -> Self {
        Self { config, buffers: RwLock::new(HashMap::new()), dropped_records: AtomicU64::new(0), clock }
    }

    pub fn config(&self) -> &MetricsConfig {
        &self.config
    }

    /// Appends `outcome` to `key`'s history, overwriting the oldest record
    /// when the buffer is full.
    ///
    /// When the key limit is reached the record is dropped and counted in
    /// [`dropped_records`](Self::dropped_records); the caller is never
    /// failed.
    pub fn record(&self, key: &str, outcome: Outcome) {
        let Some(buffer) = self.buffer_for(key) else {
            let dropped = self.dropped_records.fetch_add(1, Ordering::Relaxed) + 1;
            if dropped.is_power_of_two() {
                warn!(key, max_keys = self.config.max_keys, dropped, "metrics_key_limit_reached");
            }
            return;
        };

        let record = OutcomeRecord::new(outcome, self.clock.now());
        buffer.write().push(record);
    }

    fn buffer_for(&self, key: &str) -> Option<KeyBuffer> {
        if let Some(buffer) = self.buffers.read().get(key) {
            return Some(Arc::clone(buffer));
        }

        let mut buffers = self.buffers.write();
        if let Some(buffer) = buffers.get(key) {
            return Some(Arc::clone(buffer));
        }
        if buffers.len() >= self.config.max_keys {
            return None;
        }

        debug!(key, capacity = self.config.buffer_capacity, "metrics_key_created");
        let buffer = Arc::new(RwLock::new(RingBuffer::new(self.config.buffer_capacity)));
        buffers.insert(key.to_owned(), Arc::clone(&buffer));
        Some(buffer)
    }

    /// Copy of `key`'s records, oldest first.
    pub fn records_for(&self, key: &str) -> Option<Vec<OutcomeRecord>> {
        let buffer = self.buffers.read().get(key).map(Arc::clone)?;
        let records = buffer.read().to_vec();
        Some(records)
    }

    /// Aggregates for `key`, or `None` when nothing was recorded under it.
    pub fn stats_for(&self, key: &str) -> Option<Stats> {
        let buffer = self.buffers.read().get(key).map(Arc::clone)?;
        let (records, overwritten) = {
            let guard = buffer.read();
            (guard.to_vec(), guard.dropped())
        };
        Some(Stats::from_records(&records, overwritten))
    }

    /// Aggregates for every key, ordered by key.
    pub fn all_stats(&self) -> BTreeMap<String, Stats> {
        let buffers: Vec<(String, KeyBuffer)> = self
            .buffers
            .read()
            .iter()
            .map(|(key, buffer)| (key.clone(), Arc::clone(buffer)))
            .collect();

        buffers
            .into_iter()
            .map(|(key, buffer)| {
                let (records, overwritten) = {
                    let guard = buffer.read();
                    (guard.to_vec(), guard.dropped())
                };
                (key, Stats::from_records(&records, overwritten))
            })
            .collect()
    }

    /// Forgets `key` entirely, freeing its slot under the key limit.
    pub fn reset(&self, key: &str) -> bool {
        self.buffers.write().remove(key).is_some()
    }

    /// Forgets every key and the dropped-record counter.
    pub fn reset_all(&self) {
        self.buffers.write().clear();
        self.dropped_records.store(0, Ordering::Relaxed);
    }

    /// Tracked keys in sorted order.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.buffers.read().keys().cloned().collect();
        keys.sort_unstable();
        keys
    }

    pub fn key_count(&self) -> usize {
        self.buffers.read().len()
    }

    /// Records discarded because the key limit was reached.
    pub fn dropped_records(&self) -> u64 {
        self.dropped_records.load(Ordering::Relaxed)
    }

    /// Fixed-width report, worst key first.
    pub fn render_report(&self) -> String {
        report::render(&self.all_stats())
    }

    /// Writes [`render_report`](Self::render_report) to stdout.
    #[allow(clippy::print_stdout)]
    pub fn print_report(&self) {
        println!("{}", self.render_report());
    }
}
