//! Reliability runtime
//!
//! [`ReliabilityRuntime`] owns one shared [`MetricsRegistry`], a
//! [`CacheRegistry`] of [`CachedValue`] caches, a [`CircuitBreakerRegistry`]
//! and the [`RuntimeSettings`] they are configured from. Engines are handed
//! out by name; each name gets its override from settings or the default.
//!
//! ## Lifecycle
//! - Construct explicitly with [`ReliabilityRuntime::new`]; nothing is global
//! - [`start_maintenance`](ReliabilityRuntime::start_maintenance) spawns the
//!   cache sweep task
//! - [`shutdown`](ReliabilityRuntime::shutdown) cancels it and awaits the
//!   join handle with a timeout
//! - Dropping a runtime with a live task cancels the task

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cache::{spawn_maintenance, CacheRegistry, CachedValue, SharedCache};
use crate::error::{ConfigError, ConfigResult};
use crate::metrics::MetricsRegistry;
use crate::resilience::{CircuitBreakerRegistry, RetryController, SharedBreaker};
use crate::settings::RuntimeSettings;
use crate::time::{Clock, SystemClock};

/// How long [`ReliabilityRuntime::shutdown`] waits for the sweep task.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors from runtime construction and lifecycle management
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("cache maintenance task is already running")]
    MaintenanceAlreadyRunning,

    #[error("cache maintenance task did not stop within {timeout:?}")]
    ShutdownTimeout { timeout: Duration },

    #[error("cache maintenance task failed: {message}")]
    TaskFailed { message: String },
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;

struct MaintenanceTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owner of the shared registries and their settings
///
/// ```no_run
/// use bulwark_runtime::resilience::policies::AlwaysRetry;
/// use bulwark_runtime::runtime::ReliabilityRuntime;
/// use bulwark_runtime::settings::RuntimeSettings;
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let runtime = ReliabilityRuntime::new(RuntimeSettings::default())?;
/// runtime.start_maintenance()?;
///
/// let profiles = runtime.cache("UserService.profile")?;
/// let breaker = runtime.circuit_breaker("profile-db")?;
/// let retry = runtime.retry_controller("profile-db", AlwaysRetry)?;
/// # let _ = (profiles, breaker, retry);
///
/// println!("{}", runtime.report());
/// runtime.shutdown().await?;
/// # Ok(())
/// # }
/// ```
pub struct ReliabilityRuntime<C: Clock = SystemClock> {
    settings: RuntimeSettings,
    metrics: Arc<MetricsRegistry>,
    caches: Arc<CacheRegistry<CachedValue, C>>,
    breakers: CircuitBreakerRegistry<C>,
    maintenance: Mutex<Option<MaintenanceTask>>,
}

impl ReliabilityRuntime<SystemClock> {
    pub fn new(settings: RuntimeSettings) -> RuntimeResult<Self> {
        Self::with_clock(settings, SystemClock)
    }
}

impl<C: Clock + Clone> ReliabilityRuntime<C> {
    /// Runtime whose engines all read time from `clock`
    pub fn with_clock(settings: RuntimeSettings, clock: C) -> RuntimeResult<Self> {
        settings.validate()?;
        let metrics = MetricsRegistry::with_config_and_clock(settings.metrics.clone(), clock.clone())?;
        let metrics = Arc::new(metrics);
        let caches = CacheRegistry::with_clock(Arc::clone(&metrics), clock.clone())
            .with_default_config(settings.cache.clone())
            .with_size_estimator(CachedValue::estimated_size);
        let breakers = CircuitBreakerRegistry::with_clock(Arc::clone(&metrics), clock)
            .with_default_config(settings.circuit_breaker.clone());

        info!(
            metrics_capacity = settings.metrics.buffer_capacity,
            cache_overrides = settings.caches.len(),
            breaker_overrides = settings.circuit_breakers.len(),
            retry_overrides = settings.retries.len(),
            "reliability_runtime_created"
        );

        Ok(Self {
            settings,
            metrics,
            caches: Arc::new(caches),
            breakers,
            maintenance: Mutex::new(None),
        })
    }

    pub fn settings(&self) -> &RuntimeSettings {
        &self.settings
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    pub fn caches(&self) -> &Arc<CacheRegistry<CachedValue, C>> {
        &self.caches
    }

    pub fn circuit_breakers(&self) -> &CircuitBreakerRegistry<C> {
        &self.breakers
    }

    /// Cache `name`, configured from its settings override or the default
    pub fn cache(&self, name: &str) -> ConfigResult<SharedCache<CachedValue, C>> {
        self.caches.get_or_create_with(name, self.settings.cache_config(name))
    }

    /// Breaker `key`, configured from its settings override or the default
    pub fn circuit_breaker(&self, key: &str) -> ConfigResult<SharedBreaker<C>> {
        self.breakers.get_or_create_with(key, self.settings.circuit_breaker_config(key))
    }

    /// New retry controller for `key` reporting to the shared metrics
    pub fn retry_controller<P>(&self, key: &str, policy: P) -> ConfigResult<RetryController<P>> {
        RetryController::new(
            key,
            self.settings.retry_config(key),
            policy,
            Arc::clone(&self.metrics),
        )
    }

    /// Fixed-width outcome table for every metrics key
    pub fn report(&self) -> String {
        self.metrics.render_report()
    }

    /// Start the cache sweep at the configured `maintenance_interval`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_maintenance(&self) -> RuntimeResult<()> {
        self.start_maintenance_every(self.settings.maintenance_interval)
    }

    /// Start the cache sweep at a custom interval.
    pub fn start_maintenance_every(&self, interval: Duration) -> RuntimeResult<()> {
        let mut slot = self.maintenance.lock();
        if slot.as_ref().is_some_and(|task| !task.handle.is_finished()) {
            return Err(RuntimeError::MaintenanceAlreadyRunning);
        }

        let cancel = CancellationToken::new();
        let handle = spawn_maintenance(Arc::clone(&self.caches), interval, cancel.clone());
        *slot = Some(MaintenanceTask { cancel, handle });
        Ok(())
    }

    pub fn is_maintenance_running(&self) -> bool {
        self.maintenance.lock().as_ref().is_some_and(|task| !task.handle.is_finished())
    }

    /// Stop the sweep task and wait for it to finish.
    ///
    /// Returns `Ok(())` when no task was running.
    pub async fn shutdown(&self) -> RuntimeResult<()> {
        let Some(task) = self.maintenance.lock().take() else {
            return Ok(());
        };

        task.cancel.cancel();
        match tokio::time::timeout(SHUTDOWN_TIMEOUT, task.handle).await {
            Ok(Ok(())) => {
                info!("reliability_runtime_stopped");
                Ok(())
            }
            Ok(Err(join_error)) => {
                warn!(error = %join_error, "cache_maintenance_task_failed");
                Err(RuntimeError::TaskFailed { message: join_error.to_string() })
            }
            Err(_) => {
                let timeout_ms = SHUTDOWN_TIMEOUT.as_millis() as u64;
                warn!(timeout_ms, "cache_maintenance_stop_timed_out");
                Err(RuntimeError::ShutdownTimeout { timeout: SHUTDOWN_TIMEOUT })
            }
        }
    }
}

impl<C: Clock> Drop for ReliabilityRuntime<C> {
    fn drop(&mut self) {
        if let Some(task) = self.maintenance.get_mut().take() {
            warn!("reliability_runtime_dropped_while_running");
            task.cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheKey;
    use crate::resilience::policies::NeverRetry;
    use crate::resilience::CircuitState;
    use crate::time::MockClock;

    fn settings() -> RuntimeSettings {
        RuntimeSettings::from_toml_str(
            r#"
            maintenance_interval = 1000

            [caches.short]
            ttl = 500
            eviction_policy = "time_only"

            [circuit_breakers.fragile]
            failure_threshold = 1
            "#,
        )
        .unwrap()
    }

    /// Validates that engines pick up their named overrides.
    ///
    /// Assertions:
    /// - Confirms the override and default cache configs are applied.
    /// - Confirms the breaker override is used for its key.
    /// - Confirms repeated lookups share one instance.
    #[test]
    fn engines_use_settings_overrides() {
        let runtime = ReliabilityRuntime::with_clock(settings(), MockClock::new()).unwrap();

        let short = runtime.cache("short").unwrap();
        assert_eq!(short.config().ttl, Duration::from_millis(500));
        assert_eq!(runtime.cache("other").unwrap().config().ttl, Duration::from_secs(300));
        assert!(Arc::ptr_eq(&short, &runtime.cache("short").unwrap()));

        let fragile = runtime.circuit_breaker("fragile").unwrap();
        fragile.record_call(false);
        assert_eq!(fragile.state(), CircuitState::Open);
        assert_eq!(runtime.circuit_breaker("sturdy").unwrap().config().failure_threshold, 5);

        let retry = runtime.retry_controller("fragile", NeverRetry).unwrap();
        assert_eq!(retry.config().max_attempts, 3);
    }

    #[test]
    fn cached_values_report_estimated_size() {
        let runtime = ReliabilityRuntime::with_clock(settings(), MockClock::new()).unwrap();
        let cache = runtime.cache("names").unwrap();
        cache.set(CacheKey::new("k"), CachedValue::Text("hello".into()));

        let records = runtime.metrics().records_for("names").unwrap();
        assert_eq!(records[0].size_bytes(), Some(CachedValue::Text("hello".into()).estimated_size()));
    }

    /// Validates the maintenance lifecycle.
    ///
    /// Assertions:
    /// - Confirms a second start is rejected while running.
    /// - Confirms the sweep removes expired entries.
    /// - Confirms shutdown stops the task and can be repeated.
    #[tokio::test(start_paused = true)]
    async fn maintenance_starts_sweeps_and_stops() {
        let clock = MockClock::new();
        let runtime = ReliabilityRuntime::with_clock(settings(), clock.clone()).unwrap();
        let short = runtime.cache("short").unwrap();
        short.set(CacheKey::new("a"), CachedValue::Integer(1));

        runtime.start_maintenance().unwrap();
        assert!(runtime.is_maintenance_running());
        assert!(matches!(runtime.start_maintenance(), Err(RuntimeError::MaintenanceAlreadyRunning)));

        clock.advance(Duration::from_secs(1));
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(short.len(), 0);
        assert_eq!(short.stats().expirations, 1);

        runtime.shutdown().await.unwrap();
        assert!(!runtime.is_maintenance_running());
        runtime.shutdown().await.unwrap();
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let mut settings = RuntimeSettings::default();
        settings.metrics.max_keys = 0;
        assert!(matches!(ReliabilityRuntime::new(settings), Err(RuntimeError::Config(_))));
    }
}
