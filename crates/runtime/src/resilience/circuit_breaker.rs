//! Circuit breaker engine for protecting calls to failing dependencies
//!
//! A breaker is a small state machine keyed by name:
//!
//! - **Closed**: every call is allowed. Consecutive failures are counted and
//!   reaching `failure_threshold` opens the circuit.
//! - **Open**: calls are rejected until `timeout` has elapsed since the last
//!   failure. The first call after that moves the breaker to half-open.
//! - **Half-open**: probing calls are allowed. `success_threshold`
//!   consecutive successes close the circuit; any failure re-opens it.
//!
//! Gating (`should_allow_call`) and reporting (`record_call`) are separate so
//! callers can wrap work the engine never sees. The [`call`], [`execute`] and
//! [`execute_with_fallback`] wrappers do both around a closure.
//!
//! [`call`]: CircuitBreakerEngine::call
//! [`execute`]: CircuitBreakerEngine::execute
//! [`execute_with_fallback`]: CircuitBreakerEngine::execute_with_fallback

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::error::{ConfigError, ConfigResult};
use crate::metrics::{MetricsRegistry, Outcome, RecordDetail};
use crate::time::{Clock, SystemClock};
use crate::utils::duration_millis;

/// Errors surfaced by the breaker's call wrappers
#[derive(Debug, Error)]
pub enum CircuitBreakerError<E> {
    /// The circuit is open and no call was attempted
    #[error("circuit breaker '{key}' is open; retry in {retry_after:?}")]
    CircuitOpen {
        key: String,
        /// Wall-clock time of the failure that opened (or kept open) the
        /// circuit
        last_failure: Option<SystemTime>,
        /// Time left until the breaker lets a probe through
        retry_after: Duration,
    },

    /// A half-open probe failed and the circuit re-opened
    #[error("circuit breaker '{key}' half-open probe failed: {source}")]
    HalfOpenTestFailed {
        key: String,
        #[source]
        source: E,
    },

    /// The circuit is open and the fallback provider had nothing to offer
    #[error("circuit breaker '{key}' is open and no fallback is available")]
    NoFallbackAvailable { key: String },

    /// The wrapped operation failed while the circuit was closed
    #[error("operation behind circuit breaker '{key}' failed: {source}")]
    OperationFailed {
        key: String,
        #[source]
        source: E,
    },
}

impl<E> CircuitBreakerError<E> {
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. } | Self::NoFallbackAvailable { .. })
    }

    /// Returns the wrapped operation error, if the operation ran at all.
    pub fn into_source(self) -> Option<E> {
        match self {
            Self::HalfOpenTestFailed { source, .. } | Self::OperationFailed { source, .. } => {
                Some(source)
            }
            Self::CircuitOpen { .. } | Self::NoFallbackAvailable { .. } => None,
        }
    }
}

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Normal operation - all calls allowed
    Closed,
    /// Circuit is open - calls are rejected
    Open,
    /// Probing recovery - calls allowed, one failure re-opens
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "CLOSED",
            Self::Open => "OPEN",
            Self::HalfOpen => "HALF_OPEN",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening the circuit
    pub failure_threshold: u64,
    /// Time to wait after the last failure before probing
    #[serde(with = "duration_millis")]
    pub timeout: Duration,
    /// Number of consecutive half-open successes needed to close the circuit
    pub success_threshold: u64,
    /// A closed-state failure further apart than this from the previous one
    /// starts a new streak
    #[serde(with = "duration_millis")]
    pub monitoring_window: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout: Duration::from_secs(60),
            success_threshold: 2,
            monitoring_window: Duration::from_secs(60),
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a new configuration builder
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::invalid("failure_threshold must be greater than 0"));
        }
        if self.success_threshold == 0 {
            return Err(ConfigError::invalid("success_threshold must be greater than 0"));
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::invalid("timeout must be greater than 0"));
        }
        if self.monitoring_window.is_zero() {
            return Err(ConfigError::invalid("monitoring_window must be greater than 0"));
        }
        Ok(())
    }
}

/// Builder for [`CircuitBreakerConfig`]
#[derive(Debug, Clone, Default)]
pub struct CircuitBreakerConfigBuilder {
    config: CircuitBreakerConfig,
}

impl CircuitBreakerConfigBuilder {
    pub fn failure_threshold(mut self, threshold: u64) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn success_threshold(mut self, threshold: u64) -> Self {
        self.config.success_threshold = threshold;
        self
    }

    pub fn monitoring_window(mut self, window: Duration) -> Self {
        self.config.monitoring_window = window;
        self
    }

    /// Validates and returns the configuration.
    pub fn build(self) -> ConfigResult<CircuitBreakerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Supplies a substitute value while the circuit is open
///
/// Implemented for any `Fn(&str) -> Option<T>` so a closure over the breaker
/// key works directly.
pub trait FallbackProvider<T> {
    fn fallback(&self, key: &str) -> Option<T>;
}

impl<T, F> FallbackProvider<T> for F
where
    F: Fn(&str) -> Option<T>,
{
    fn fallback(&self, key: &str) -> Option<T> {
        self(key)
    }
}

/// Fallback that always yields a clone of the same value
#[derive(Debug, Clone)]
pub struct StaticFallback<T>(pub T);

impl<T: Clone> FallbackProvider<T> for StaticFallback<T> {
    fn fallback(&self, _key: &str) -> Option<T> {
        Some(self.0.clone())
    }
}

/// Point-in-time view of a breaker's state and counters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerSnapshot {
    pub key: String,
    pub state: CircuitState,
    pub consecutive_failures: u64,
    pub consecutive_successes: u64,
    pub last_failure_time: Option<Instant>,
    pub last_opened_time: Option<Instant>,
    pub last_closed_time: Option<Instant>,
    pub state_transitions: u64,
    pub allowed_calls: u64,
    pub rejected_calls: u64,
}

#[derive(Debug)]
struct BreakerState {
    current: CircuitState,
    consecutive_failures: u64,
    consecutive_successes: u64,
    last_failure_time: Option<Instant>,
    last_failure_wall: Option<SystemTime>,
    last_opened_time: Option<Instant>,
    last_closed_time: Option<Instant>,
    state_transitions: u64,
    allowed_calls: u64,
    rejected_calls: u64,
}

impl BreakerState {
    fn new() -> Self {
        Self {
            current: CircuitState::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            last_failure_time: None,
            last_failure_wall: None,
            last_opened_time: None,
            last_closed_time: None,
            state_transitions: 0,
            allowed_calls: 0,
            rejected_calls: 0,
        }
    }

    fn transition(&mut self, to: CircuitState, now: Instant) {
        self.current = to;
        self.state_transitions += 1;
        match to {
            CircuitState::Open => {
                self.consecutive_failures = 0;
                self.consecutive_successes = 0;
                self.last_opened_time = Some(now);
            }
            CircuitState::HalfOpen => {
                self.consecutive_failures = 0;
                self.consecutive_successes = 0;
            }
            CircuitState::Closed => {
                self.consecutive_failures = 0;
                self.consecutive_successes = 0;
                self.last_closed_time = Some(now);
            }
        }
    }
}

/// Result of the gate check, taken under one lock acquisition.
enum Admission {
    Allowed { probing: bool },
    Rejected { last_failure: Option<SystemTime>, retry_after: Duration },
}

/// Thread-safe circuit breaker for one key
///
/// # Type Parameters
/// - `C`: Clock type for time-based operations (defaults to `SystemClock`)
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// use bulwark_runtime::metrics::MetricsRegistry;
/// use bulwark_runtime::resilience::{CircuitBreakerConfig, CircuitBreakerEngine, CircuitState};
///
/// let config = CircuitBreakerConfig::new()
///     .failure_threshold(1)
///     .timeout(Duration::from_secs(30))
///     .build()
///     .unwrap();
/// let breaker =
///     CircuitBreakerEngine::new("payments", config, Arc::new(MetricsRegistry::new())).unwrap();
///
/// assert!(breaker.should_allow_call());
/// breaker.record_call(false);
/// assert_eq!(breaker.state(), CircuitState::Open);
/// assert!(!breaker.should_allow_call());
/// ```
pub struct CircuitBreakerEngine<C: Clock = SystemClock> {
    key: String,
    config: CircuitBreakerConfig,
    state: Mutex<BreakerState>,
    clock: C,
    metrics: Arc<MetricsRegistry>,
}

impl<C: Clock> fmt::Debug for CircuitBreakerEngine<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreakerEngine")
            .field("key", &self.key)
            .field("config", &self.config)
            .field("state", &self.state.lock().current)
            .finish_non_exhaustive()
    }
}

impl CircuitBreakerEngine<SystemClock> {
    /// Create a breaker on the system clock
    pub fn new(
        key: impl Into<String>,
        config: CircuitBreakerConfig,
        metrics: Arc<MetricsRegistry>,
    ) -> ConfigResult<Self> {
        Self::with_clock(key, config, metrics, SystemClock)
    }
}

impl<C: Clock> CircuitBreakerEngine<C> {
    /// Create a breaker with a custom clock
    pub fn with_clock(
        key: impl Into<String>,
        config: CircuitBreakerConfig,
        metrics: Arc<MetricsRegistry>,
        clock: C,
    ) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self { key: key.into(), config, state: Mutex::new(BreakerState::new()), clock, metrics })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current state without side effects.
    ///
    /// An open breaker whose timeout has elapsed still reports `Open` until
    /// the next [`should_allow_call`](Self::should_allow_call).
    pub fn state(&self) -> CircuitState {
        self.state.lock().current
    }

    /// Decides whether a call may proceed, moving Open to HalfOpen once the
    /// timeout has elapsed. A rejection is recorded as a blocked outcome.
    pub fn should_allow_call(&self) -> bool {
        matches!(self.admit(), Admission::Allowed { .. })
    }

    fn admit(&self) -> Admission {
        let now = self.clock.now();
        let admission = {
            let mut state = self.state.lock();
            let admission = match state.current {
                CircuitState::Closed => Admission::Allowed { probing: false },
                CircuitState::HalfOpen => Admission::Allowed { probing: true },
                CircuitState::Open => {
                    let since_failure = state
                        .last_failure_time
                        .map(|at| now.saturating_duration_since(at))
                        .unwrap_or(self.config.timeout);
                    if since_failure >= self.config.timeout {
                        state.transition(CircuitState::HalfOpen, now);
                        info!(
                            key = %self.key,
                            from = CircuitState::Open.as_str(),
                            to = CircuitState::HalfOpen.as_str(),
                            "circuit_breaker_state_changed"
                        );
                        Admission::Allowed { probing: true }
                    } else {
                        Admission::Rejected {
                            last_failure: state.last_failure_wall,
                            retry_after: self.config.timeout - since_failure,
                        }
                    }
                }
            };
            match admission {
                Admission::Allowed { .. } => state.allowed_calls += 1,
                Admission::Rejected { .. } => state.rejected_calls += 1,
            }
            admission
        };

        if let Admission::Rejected { retry_after, .. } = &admission {
            debug!(key = %self.key, ?retry_after, "circuit_breaker_rejected_call");
            self.metrics.record(
                &self.key,
                Outcome::blocked()
                    .with_detail(RecordDetail::Breaker { state: CircuitState::Open.as_str() }),
            );
        }
        admission
    }

    /// Reports the result of an allowed call with no latency information.
    pub fn record_call(&self, succeeded: bool) {
        self.record_outcome(succeeded, Duration::ZERO);
    }

    /// Reports the result of an allowed call and how long it took.
    pub fn record_outcome(&self, succeeded: bool, latency: Duration) {
        let now = self.clock.now();
        let state_after = {
            let mut state = self.state.lock();
            if succeeded {
                self.on_success(&mut state, now);
            } else {
                self.on_failure(&mut state, now);
            }
            state.current
        };

        let outcome = if succeeded { Outcome::success(latency) } else { Outcome::failure(latency) };
        self.metrics.record(
            &self.key,
            outcome.with_detail(RecordDetail::Breaker { state: state_after.as_str() }),
        );
    }

    fn on_success(&self, state: &mut BreakerState, now: Instant) {
        match state.current {
            CircuitState::Closed => state.consecutive_failures = 0,
            CircuitState::HalfOpen => {
                state.consecutive_successes += 1;
                if state.consecutive_successes >= self.config.success_threshold {
                    state.transition(CircuitState::Closed, now);
                    info!(
                        key = %self.key,
                        from = CircuitState::HalfOpen.as_str(),
                        to = CircuitState::Closed.as_str(),
                        "circuit_breaker_state_changed"
                    );
                }
            }
            CircuitState::Open => {
                debug!(key = %self.key, "circuit_breaker_success_while_open");
            }
        }
    }

    fn on_failure(&self, state: &mut BreakerState, now: Instant) {
        let previous_failure = state.last_failure_time;
        state.last_failure_time = Some(now);
        state.last_failure_wall = Some(self.clock.system_time());

        match state.current {
            CircuitState::Closed => {
                let stale = previous_failure.is_some_and(|at| {
                    now.saturating_duration_since(at) >= self.config.monitoring_window
                });
                state.consecutive_failures =
                    if stale { 1 } else { state.consecutive_failures + 1 };

                if state.consecutive_failures >= self.config.failure_threshold {
                    let failures = state.consecutive_failures;
                    state.transition(CircuitState::Open, now);
                    warn!(key = %self.key, failures, "circuit_breaker_opened");
                }
            }
            CircuitState::HalfOpen => {
                state.transition(CircuitState::Open, now);
                warn!(key = %self.key, "circuit_breaker_half_open_probe_failed");
            }
            CircuitState::Open => {
                debug!(key = %self.key, "circuit_breaker_failure_while_open");
            }
        }
    }

    /// Forces the breaker back to Closed with every counter and timestamp
    /// cleared, whatever its current state.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        let from = state.current;
        *state = BreakerState::new();
        drop(state);
        info!(key = %self.key, from = from.as_str(), "circuit_breaker_reset");
    }

    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        let state = self.state.lock();
        CircuitBreakerSnapshot {
            key: self.key.clone(),
            state: state.current,
            consecutive_failures: state.consecutive_failures,
            consecutive_successes: state.consecutive_successes,
            last_failure_time: state.last_failure_time,
            last_opened_time: state.last_opened_time,
            last_closed_time: state.last_closed_time,
            state_transitions: state.state_transitions,
            allowed_calls: state.allowed_calls,
            rejected_calls: state.rejected_calls,
        }
    }

    fn open_error<E>(
        &self,
        last_failure: Option<SystemTime>,
        retry_after: Duration,
    ) -> CircuitBreakerError<E> {
        CircuitBreakerError::CircuitOpen { key: self.key.clone(), last_failure, retry_after }
    }

    fn failed<E>(&self, probing: bool, source: E) -> CircuitBreakerError<E> {
        let key = self.key.clone();
        if probing {
            CircuitBreakerError::HalfOpenTestFailed { key, source }
        } else {
            CircuitBreakerError::OperationFailed { key, source }
        }
    }

    /// Runs a synchronous operation behind the breaker.
    pub fn call<F, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Result<T, E>,
    {
        let probing = match self.admit() {
            Admission::Allowed { probing } => probing,
            Admission::Rejected { last_failure, retry_after } => {
                return Err(self.open_error(last_failure, retry_after));
            }
        };

        let started = Instant::now();
        let result = operation();
        self.record_outcome(result.is_ok(), started.elapsed());
        result.map_err(|source| self.failed(probing, source))
    }

    /// Runs an async operation behind the breaker.
    #[instrument(skip(self, operation), fields(key = %self.key))]
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let probing = match self.admit() {
            Admission::Allowed { probing } => probing,
            Admission::Rejected { last_failure, retry_after } => {
                return Err(self.open_error(last_failure, retry_after));
            }
        };

        let started = Instant::now();
        let result = operation().await;
        self.record_outcome(result.is_ok(), started.elapsed());
        result.map_err(|source| self.failed(probing, source))
    }

    /// Runs an async operation, answering from `fallback` while the circuit
    /// is open.
    ///
    /// Operation failures on an allowed call are returned as errors; the
    /// fallback only stands in for calls that were never attempted.
    pub async fn execute_with_fallback<F, Fut, T, E, P>(
        &self,
        operation: F,
        fallback: &P,
    ) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: FallbackProvider<T> + ?Sized,
    {
        let probing = match self.admit() {
            Admission::Allowed { probing } => probing,
            Admission::Rejected { .. } => {
                return match fallback.fallback(&self.key) {
                    Some(value) => {
                        debug!(key = %self.key, "circuit_breaker_fallback_served");
                        Ok(value)
                    }
                    None => Err(CircuitBreakerError::NoFallbackAvailable { key: self.key.clone() }),
                };
            }
        };

        let started = Instant::now();
        let result = operation().await;
        self.record_outcome(result.is_ok(), started.elapsed());
        result.map_err(|source| self.failed(probing, source))
    }
}
