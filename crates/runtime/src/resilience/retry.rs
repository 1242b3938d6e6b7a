//! Retry controller with pluggable backoff and retry predicates
//!
//! [`RetryController`] re-runs an async operation until it succeeds, the
//! [`RetryPolicy`] declares the error fatal, `max_attempts` is reached, or the
//! optional `timeout_budget` runs out. Delays come from a
//! [`BackoffStrategy`], are clamped to `max_delay` and then optionally
//! jittered by +/-25%.
//!
//! Every attempt is reported to the metrics registry under `"<key>#attempt"`
//! and each call produces one summary record under `<key>`.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::{ConfigError, ConfigResult};
use crate::metrics::{MetricsRegistry, Outcome, RecordDetail};
use crate::utils::{duration_millis, option_duration_millis};

/// Lower bound of the jitter multiplier
pub const JITTER_MIN: f64 = 0.75;
/// Upper bound of the jitter multiplier
pub const JITTER_MAX: f64 = 1.25;

/// Errors returned once the controller stops retrying
///
/// The last operation error is kept intact and can be taken back with
/// [`RetryError::into_source`].
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// Every allowed attempt failed
    #[error("retry attempts exhausted after {attempts} tries: {source}")]
    MaxAttemptsExceeded {
        attempts: u32,
        #[source]
        source: E,
    },

    /// The policy classified the error as fatal
    #[error("operation failed with non-retryable error after {attempts} tries: {source}")]
    NonRetryable {
        attempts: u32,
        #[source]
        source: E,
    },

    /// The overall time budget ran out
    #[error("retry timeout budget exceeded after {elapsed:?} ({attempts} attempts)")]
    TimeoutExceeded {
        elapsed: Duration,
        attempts: u32,
        #[source]
        last_error: Option<E>,
    },

    /// The caller cancelled while the controller was waiting
    #[error("retry cancelled after {attempts} attempts")]
    Cancelled { attempts: u32 },
}

impl<E> RetryError<E> {
    /// Number of attempts started before giving up
    pub fn attempts(&self) -> u32 {
        match self {
            Self::MaxAttemptsExceeded { attempts, .. }
            | Self::NonRetryable { attempts, .. }
            | Self::TimeoutExceeded { attempts, .. }
            | Self::Cancelled { attempts } => *attempts,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimeoutExceeded { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// The last error produced by the operation, unchanged.
    pub fn into_source(self) -> Option<E> {
        match self {
            Self::MaxAttemptsExceeded { source, .. } | Self::NonRetryable { source, .. } => {
                Some(source)
            }
            Self::TimeoutExceeded { last_error, .. } => last_error,
            Self::Cancelled { .. } => None,
        }
    }
}

/// Result type for retry operations
pub type RetryResult<T, E> = Result<T, RetryError<E>>;

/// One failed attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryAttempt {
    /// 1-based attempt number
    pub attempt_number: u32,
    /// Rendered error message
    pub error: String,
    /// Wait scheduled after this attempt (zero when no retry followed)
    pub delay: Duration,
    pub timestamp: SystemTime,
}

/// Result of a retried call together with its attempt history.
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    pub result: RetryResult<T, E>,
    pub attempts: u32,
    pub total_delay: Duration,
    pub elapsed: Duration,
    pub attempt_log: Vec<RetryAttempt>,
}

impl<T, E> RetryOutcome<T, E> {
    /// Consume the outcome and return only the result.
    pub fn into_result(self) -> RetryResult<T, E> {
        self.result
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// Succeeded, but not on the first attempt.
    pub fn is_eventual_success(&self) -> bool {
        self.result.is_ok() && self.attempts > 1
    }

    /// Get the average delay between attempts (excludes operation execution
    /// time).
    pub fn average_delay(&self) -> Duration {
        if self.attempts <= 1 {
            return Duration::ZERO;
        }
        self.total_delay / (self.attempts - 1)
    }
}

/// Trait for determining whether an error should be retried
pub trait RetryPolicy<E> {
    /// Decide what to do after `attempt` (1-based) failed with `error`.
    fn should_retry(&self, error: &E, attempt: u32) -> RetryDecision;
}

impl<E, P: RetryPolicy<E> + ?Sized> RetryPolicy<E> for Arc<P> {
    fn should_retry(&self, error: &E, attempt: u32) -> RetryDecision {
        (**self).should_retry(error, attempt)
    }
}

/// Decision for whether to retry an operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the configured backoff delay
    Retry,
    /// Retry after the given delay (still clamped to `max_delay`)
    RetryAfter(Duration),
    /// Don't retry the operation
    Stop,
}

/// Caller-supplied delay function, attempt number in, delay out.
#[derive(Clone)]
pub struct CustomBackoff(Arc<dyn Fn(u32) -> Duration + Send + Sync>);

impl fmt::Debug for CustomBackoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CustomBackoff(..)")
    }
}

/// How long to wait after a failed attempt (1-based)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// `base_delay * multiplier^(attempt-1)`
    Exponential {
        #[serde(with = "duration_millis")]
        base_delay: Duration,
        multiplier: f64,
    },
    /// `base_delay + increment * (attempt-1)`
    Linear {
        #[serde(with = "duration_millis")]
        base_delay: Duration,
        #[serde(with = "duration_millis")]
        increment: Duration,
    },
    /// The same delay every time
    Fixed {
        #[serde(with = "duration_millis")]
        delay: Duration,
    },
    /// Computed by a caller-supplied function; not serializable
    #[serde(skip)]
    Custom(CustomBackoff),
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        Self::Exponential { base_delay: Duration::from_millis(100), multiplier: 2.0 }
    }
}

impl BackoffStrategy {
    pub fn exponential(base_delay: Duration, multiplier: f64) -> Self {
        Self::Exponential { base_delay, multiplier }
    }

    pub fn linear(base_delay: Duration, increment: Duration) -> Self {
        Self::Linear { base_delay, increment }
    }

    pub fn fixed(delay: Duration) -> Self {
        Self::Fixed { delay }
    }

    pub fn custom<F>(delay_fn: F) -> Self
    where
        F: Fn(u32) -> Duration + Send + Sync + 'static,
    {
        Self::Custom(CustomBackoff(Arc::new(delay_fn)))
    }

    /// Unclamped delay after the given 1-based attempt
    pub fn delay(&self, attempt: u32) -> Duration {
        let step = attempt.saturating_sub(1);
        match self {
            Self::Exponential { base_delay, multiplier } => {
                let exponent = i32::try_from(step).unwrap_or(i32::MAX);
                let nanos = base_delay.as_nanos() as f64 * multiplier.powi(exponent);
                saturating_from_nanos(nanos)
            }
            Self::Linear { base_delay, increment } => {
                base_delay.saturating_add(increment.saturating_mul(step))
            }
            Self::Fixed { delay } => *delay,
            Self::Custom(CustomBackoff(delay_fn)) => delay_fn(attempt),
        }
    }

    fn validate(&self) -> ConfigResult<()> {
        if let Self::Exponential { multiplier, .. } = self {
            if !multiplier.is_finite() || *multiplier < 1.0 {
                return Err(ConfigError::invalid(
                    "exponential backoff multiplier must be a finite value >= 1.0",
                ));
            }
        }
        Ok(())
    }
}

fn saturating_from_nanos(nanos: f64) -> Duration {
    if nanos.is_nan() || nanos <= 0.0 {
        Duration::ZERO
    } else if nanos >= u64::MAX as f64 {
        Duration::from_nanos(u64::MAX)
    } else {
        Duration::from_nanos(nanos as u64)
    }
}

/// Configuration for retry behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts including the first one
    pub max_attempts: u32,
    pub backoff: BackoffStrategy,
    /// Multiply each delay by a uniform factor in `[0.75, 1.25]`
    pub jitter: bool,
    /// Upper bound applied before jitter
    #[serde(with = "duration_millis")]
    pub max_delay: Duration,
    /// Wall-clock limit across all attempts and waits
    #[serde(with = "option_duration_millis")]
    pub timeout_budget: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffStrategy::default(),
            jitter: true,
            max_delay: Duration::from_secs(30),
            timeout_budget: None,
        }
    }
}

impl RetryConfig {
    /// Create a new configuration builder
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> RetryConfigBuilder {
        RetryConfigBuilder::default()
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_attempts == 0 {
            return Err(ConfigError::invalid("max_attempts must be greater than 0"));
        }
        if self.max_delay.is_zero() {
            return Err(ConfigError::invalid("max_delay must be greater than 0"));
        }
        if self.timeout_budget.is_some_and(|budget| budget.is_zero()) {
            return Err(ConfigError::invalid("timeout_budget must be greater than 0 when set"));
        }
        self.backoff.validate()
    }

    /// Backoff delay after `attempt`, clamped to `max_delay`, before jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff.delay(attempt).min(self.max_delay)
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if !self.jitter || delay.is_zero() {
            return delay;
        }
        let factor = rand::thread_rng().gen_range(JITTER_MIN..=JITTER_MAX);
        Duration::try_from_secs_f64(delay.as_secs_f64() * factor).unwrap_or(delay)
    }
}

/// Builder for [`RetryConfig`]
#[derive(Debug, Clone, Default)]
pub struct RetryConfigBuilder {
    config: RetryConfig,
}

impl RetryConfigBuilder {
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.max_attempts = attempts;
        self
    }

    pub fn backoff(mut self, backoff: BackoffStrategy) -> Self {
        self.config.backoff = backoff;
        self
    }

    pub fn exponential_backoff(self, base_delay: Duration, multiplier: f64) -> Self {
        self.backoff(BackoffStrategy::exponential(base_delay, multiplier))
    }

    pub fn linear_backoff(self, base_delay: Duration, increment: Duration) -> Self {
        self.backoff(BackoffStrategy::linear(base_delay, increment))
    }

    pub fn fixed_backoff(self, delay: Duration) -> Self {
        self.backoff(BackoffStrategy::fixed(delay))
    }

    pub fn custom_backoff<F>(self, delay_fn: F) -> Self
    where
        F: Fn(u32) -> Duration + Send + Sync + 'static,
    {
        self.backoff(BackoffStrategy::custom(delay_fn))
    }

    pub fn jitter(mut self, enabled: bool) -> Self {
        self.config.jitter = enabled;
        self
    }

    pub fn no_jitter(self) -> Self {
        self.jitter(false)
    }

    pub fn max_delay(mut self, max_delay: Duration) -> Self {
        self.config.max_delay = max_delay;
        self
    }

    pub fn timeout_budget(mut self, budget: Duration) -> Self {
        self.config.timeout_budget = Some(budget);
        self
    }

    pub fn build(self) -> ConfigResult<RetryConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Runs operations with retries under one metrics key
///
/// ```no_run
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// use bulwark_runtime::metrics::MetricsRegistry;
/// use bulwark_runtime::resilience::{policies::AlwaysRetry, RetryConfig, RetryController};
///
/// # async fn fetch() -> Result<String, std::io::Error> { Ok(String::new()) }
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let config = RetryConfig::new()
///     .max_attempts(4)
///     .exponential_backoff(Duration::from_millis(50), 2.0)
///     .build()?;
/// let retry = RetryController::new("inventory.fetch", config, AlwaysRetry, Arc::new(MetricsRegistry::new()))?;
/// let body = retry.execute(|| fetch()).await?;
/// # drop(body);
/// # Ok(())
/// # }
/// ```
pub struct RetryController<P> {
    key: String,
    attempt_key: String,
    config: RetryConfig,
    policy: P,
    metrics: Arc<MetricsRegistry>,
}

impl<P> fmt::Debug for RetryController<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryController")
            .field("key", &self.key)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Bookkeeping for one `execute` call.
struct RunState<E> {
    started: Instant,
    attempt: u32,
    total_delay: Duration,
    log: Vec<RetryAttempt>,
    last_error: Option<E>,
}

impl<P> RetryController<P> {
    pub fn new(
        key: impl Into<String>,
        config: RetryConfig,
        policy: P,
        metrics: Arc<MetricsRegistry>,
    ) -> ConfigResult<Self> {
        config.validate()?;
        let key = key.into();
        let attempt_key = format!("{key}#attempt");
        Ok(Self { key, attempt_key, config, policy, metrics })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    /// Execute an operation with retry logic
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> RetryResult<T, E>
    where
        P: RetryPolicy<E>,
        E: fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.run(operation, None).await.into_result()
    }

    /// Execute an operation with retry logic and return the attempt history.
    pub async fn execute_with_outcome<F, Fut, T, E>(&self, operation: F) -> RetryOutcome<T, E>
    where
        P: RetryPolicy<E>,
        E: fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.run(operation, None).await
    }

    /// Like [`execute`](Self::execute), but gives up with
    /// [`RetryError::Cancelled`] when `cancel` fires before an attempt or
    /// during a backoff wait.
    pub async fn execute_with_cancellation<F, Fut, T, E>(
        &self,
        operation: F,
        cancel: &CancellationToken,
    ) -> RetryResult<T, E>
    where
        P: RetryPolicy<E>,
        E: fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.run(operation, Some(cancel)).await.into_result()
    }

    #[instrument(skip(self, operation, cancel), fields(key = %self.key))]
    async fn run<F, Fut, T, E>(
        &self,
        mut operation: F,
        cancel: Option<&CancellationToken>,
    ) -> RetryOutcome<T, E>
    where
        P: RetryPolicy<E>,
        E: fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut run = RunState {
            started: Instant::now(),
            attempt: 0,
            total_delay: Duration::ZERO,
            log: Vec::new(),
            last_error: None,
        };

        loop {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                return self.finish(run, Err(Ending::Cancelled));
            }

            let remaining = match self.config.timeout_budget {
                Some(budget) => match budget.checked_sub(run.started.elapsed()) {
                    Some(left) if !left.is_zero() => Some(left),
                    _ => return self.finish(run, Err(Ending::Timeout)),
                },
                None => None,
            };

            run.attempt += 1;
            let attempt = run.attempt;
            debug!(
                key = %self.key,
                attempt,
                max_attempts = self.config.max_attempts,
                "retry_attempt_started"
            );

            let attempt_started = Instant::now();
            let result = match remaining {
                Some(left) => match tokio::time::timeout(left, operation()).await {
                    Ok(result) => result,
                    Err(_) => {
                        let latency = attempt_started.elapsed();
                        self.record_attempt(false, attempt, latency, Duration::ZERO);
                        run.log.push(RetryAttempt {
                            attempt_number: attempt,
                            error: "timeout budget exhausted during attempt".to_string(),
                            delay: Duration::ZERO,
                            timestamp: SystemTime::now(),
                        });
                        return self.finish(run, Err(Ending::Timeout));
                    }
                },
                None => operation().await,
            };
            let latency = attempt_started.elapsed();

            let error = match result {
                Ok(value) => {
                    self.record_attempt(true, attempt, latency, Duration::ZERO);
                    return self.finish(run, Ok(value));
                }
                Err(error) => error,
            };

            let decision = self.policy.should_retry(&error, attempt);
            let stop = match decision {
                RetryDecision::Stop => Some(Stopped::Fatal),
                _ if attempt >= self.config.max_attempts => Some(Stopped::Exhausted),
                _ => None,
            };
            let delay = match (&stop, decision) {
                (Some(_), _) | (None, RetryDecision::Stop) => Duration::ZERO,
                (None, RetryDecision::Retry) => {
                    self.config.jittered(self.config.delay_for(attempt))
                }
                (None, RetryDecision::RetryAfter(hint)) => hint.min(self.config.max_delay),
            };

            self.record_attempt(false, attempt, latency, delay);
            run.log.push(RetryAttempt {
                attempt_number: attempt,
                error: error.to_string(),
                delay,
                timestamp: SystemTime::now(),
            });

            if let Some(stopped) = stop {
                return self.finish(run, Err(Ending::Failed(stopped, error)));
            }

            if let Some(budget) = self.config.timeout_budget {
                if run.started.elapsed().saturating_add(delay) >= budget {
                    run.last_error = Some(error);
                    return self.finish(run, Err(Ending::Timeout));
                }
            }

            warn!(
                key = %self.key,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "retry_attempt_failed"
            );
            run.last_error = Some(error);

            match cancel {
                Some(token) => {
                    tokio::select! {
                        _ = token.cancelled() => return self.finish(run, Err(Ending::Cancelled)),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                None => tokio::time::sleep(delay).await,
            }
            run.total_delay = run.total_delay.saturating_add(delay);
        }
    }

    fn record_attempt(&self, succeeded: bool, attempt: u32, latency: Duration, delay: Duration) {
        let outcome = if succeeded { Outcome::success(latency) } else { Outcome::failure(latency) };
        let detail = RecordDetail::RetryAttempt { attempt, delay };
        self.metrics.record(&self.attempt_key, outcome.with_detail(detail));
    }

    /// Records the call summary and assembles the outcome.
    fn finish<T, E: fmt::Display>(
        &self,
        run: RunState<E>,
        end: Result<T, Ending<E>>,
    ) -> RetryOutcome<T, E> {
        let elapsed = run.started.elapsed();
        let attempts = run.attempt;
        let detail = RecordDetail::RetrySummary {
            attempts,
            total_delay: run.total_delay,
            eventual: attempts > 1,
        };

        let result = match end {
            Ok(value) => {
                if attempts > 1 {
                    info!(key = %self.key, attempts, "retry_eventual_success");
                }
                self.metrics.record(&self.key, Outcome::success(elapsed).with_detail(detail));
                Ok(value)
            }
            Err(ending) => {
                let error = match ending {
                    Ending::Failed(Stopped::Exhausted, source) => {
                        warn!(key = %self.key, attempts, error = %source, "retry_attempts_exhausted");
                        RetryError::MaxAttemptsExceeded { attempts, source }
                    }
                    Ending::Failed(Stopped::Fatal, source) => {
                        debug!(key = %self.key, attempts, error = %source, "retry_non_retryable_error");
                        RetryError::NonRetryable { attempts, source }
                    }
                    Ending::Timeout => {
                        warn!(
                            key = %self.key,
                            attempts,
                            elapsed_ms = elapsed.as_millis() as u64,
                            "retry_timeout_budget_exceeded"
                        );
                        RetryError::TimeoutExceeded { elapsed, attempts, last_error: run.last_error }
                    }
                    Ending::Cancelled => {
                        debug!(key = %self.key, attempts, "retry_cancelled");
                        RetryError::Cancelled { attempts }
                    }
                };
                self.metrics.record(&self.key, Outcome::failure(elapsed).with_detail(detail));
                Err(error)
            }
        };

        RetryOutcome {
            result,
            attempts,
            total_delay: run.total_delay,
            elapsed,
            attempt_log: run.log,
        }
    }
}

enum Stopped {
    Fatal,
    Exhausted,
}

enum Ending<E> {
    Failed(Stopped, E),
    Timeout,
    Cancelled,
}

/// Pre-defined retry policies for common scenarios
pub mod policies {
    use super::*;
    use crate::error::ErrorClassification;

    /// Always retry policy - retries on any error
    #[derive(Debug, Clone, Copy, Default)]
    pub struct AlwaysRetry;

    impl<E> RetryPolicy<E> for AlwaysRetry {
        fn should_retry(&self, _error: &E, _attempt: u32) -> RetryDecision {
            RetryDecision::Retry
        }
    }

    /// Never retry policy - never retries
    #[derive(Debug, Clone, Copy, Default)]
    pub struct NeverRetry;

    impl<E> RetryPolicy<E> for NeverRetry {
        fn should_retry(&self, _error: &E, _attempt: u32) -> RetryDecision {
            RetryDecision::Stop
        }
    }

    /// Retries while the predicate returns `true`
    #[derive(Debug, Clone)]
    pub struct PredicateRetry<F> {
        predicate: F,
    }

    impl<F> PredicateRetry<F> {
        pub fn new(predicate: F) -> Self {
            Self { predicate }
        }
    }

    impl<F, E> RetryPolicy<E> for PredicateRetry<F>
    where
        F: Fn(&E, u32) -> bool,
    {
        fn should_retry(&self, error: &E, attempt: u32) -> RetryDecision {
            if (self.predicate)(error, attempt) {
                RetryDecision::Retry
            } else {
                RetryDecision::Stop
            }
        }
    }

    /// Defers to the error's own [`ErrorClassification`], honouring its
    /// `retry_after` hint. Critical errors are never retried.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct Classified;

    impl<E: ErrorClassification> RetryPolicy<E> for Classified {
        fn should_retry(&self, error: &E, attempt: u32) -> RetryDecision {
            if error.is_critical() {
                warn!(attempt, severity = %error.severity(), "retry_stopped_on_critical_error");
                return RetryDecision::Stop;
            }
            if !error.is_retryable() {
                return RetryDecision::Stop;
            }
            match error.retry_after() {
                Some(delay) => RetryDecision::RetryAfter(delay),
                None => RetryDecision::Retry,
            }
        }
    }
}
