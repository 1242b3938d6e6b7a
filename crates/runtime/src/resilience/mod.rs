//! Resilience engines for calls to unreliable dependencies
//!
//! - **Circuit breaker**: per-key Closed / Open / HalfOpen state machine that
//!   stops calling a dependency after repeated failures and probes it again
//!   after a timeout
//! - **Retry**: re-runs an async operation with exponential, linear, fixed or
//!   custom backoff, clamped and optionally jittered, under an attempt limit
//!   and an optional wall-clock budget
//!
//! Both report to the shared [`MetricsRegistry`](crate::metrics::MetricsRegistry)
//! and are generic over the caller's error type.
//!
//! ## Composition
//!
//! The engines do not know about each other. A typical stack puts the cache
//! in front, the breaker around the remote call and the retry controller
//! around the breaker, so an open circuit is classified by the retry policy
//! like any other error:
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use bulwark_runtime::metrics::MetricsRegistry;
//! use bulwark_runtime::resilience::{
//!     policies::PredicateRetry, CircuitBreakerConfig, CircuitBreakerEngine, CircuitBreakerError,
//!     RetryConfig, RetryController,
//! };
//!
//! # async fn remote() -> Result<u32, std::io::Error> { Ok(1) }
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let metrics = Arc::new(MetricsRegistry::new());
//! let breaker = CircuitBreakerEngine::new("quotes", CircuitBreakerConfig::default(), metrics.clone())?;
//! let retry = RetryController::new(
//!     "quotes",
//!     RetryConfig::default(),
//!     PredicateRetry::new(|e: &CircuitBreakerError<std::io::Error>, _| !e.is_circuit_open()),
//!     metrics,
//! )?;
//!
//! let value = retry.execute(|| breaker.execute(remote)).await?;
//! # drop(value);
//! # Ok(())
//! # }
//! ```

pub mod circuit_breaker;
pub mod registry;
pub mod retry;

pub use circuit_breaker::{
    CircuitBreakerConfig, CircuitBreakerConfigBuilder, CircuitBreakerEngine, CircuitBreakerError,
    CircuitBreakerSnapshot, CircuitState, FallbackProvider, StaticFallback,
};
pub use registry::{CircuitBreakerRegistry, SharedBreaker};
pub use retry::{
    policies, BackoffStrategy, CustomBackoff, RetryAttempt, RetryConfig, RetryConfigBuilder,
    RetryController, RetryDecision, RetryError, RetryOutcome, RetryPolicy, RetryResult,
};
