//! Runtime reliability engines: caching, retries, circuit breaking and
//! outcome metrics.
//!
//! Every engine reports to one explicitly constructed
//! [`MetricsRegistry`](metrics::MetricsRegistry) shared through an `Arc`;
//! there is no process-wide state. [`ReliabilityRuntime`](runtime::ReliabilityRuntime)
//! wires the registries together from [`RuntimeSettings`](settings::RuntimeSettings)
//! for callers that want one owner.
//!
//! # Feature Tiers
//!
//! Enable cargo features to opt into the tiers you need:
//! - `foundation`: errors, collections, serde helpers
//! - `observability`: `tracing` instrumentation
//! - `runtime` (default): clocks, metrics, cache, resilience, settings and
//!   the runtime facade
//! - `test-utils`: test helpers in [`testing`]

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

// Foundation tier
// -----------------------------------------------------------------
#[cfg(feature = "foundation")]
pub mod collections;
#[cfg(feature = "foundation")]
pub mod error;
#[cfg(feature = "foundation")]
pub mod utils;

// Runtime tier
// --------------------------------------------------------------------
#[cfg(feature = "runtime")]
pub mod cache;
#[cfg(feature = "runtime")]
pub mod metrics;
#[cfg(feature = "runtime")]
pub mod resilience;
#[cfg(feature = "runtime")]
pub mod runtime;
#[cfg(feature = "runtime")]
pub mod settings;
#[cfg(feature = "runtime")]
pub mod time;

// Testing utilities
// ---------------------------------------------------------------
#[cfg(all(feature = "runtime", any(test, feature = "test-utils")))]
pub mod testing;

// Re-export commonly used types and traits for convenience
// ------------------------
#[cfg(feature = "runtime")]
pub use cache::{
    CacheConfig, CacheEngine, CacheError, CacheKey, CacheRegistry, CachedValue, EvictionPolicy,
};
#[cfg(feature = "foundation")]
pub use error::{ConfigError, ConfigResult, ErrorClassification, ErrorSeverity};
#[cfg(feature = "runtime")]
pub use metrics::{MetricsConfig, MetricsRegistry, Outcome, OutcomeKind, Stats};
#[cfg(feature = "runtime")]
pub use resilience::{
    policies, BackoffStrategy, CircuitBreakerConfig, CircuitBreakerEngine, CircuitBreakerError,
    CircuitBreakerRegistry, CircuitState, FallbackProvider, RetryConfig, RetryController,
    RetryDecision, RetryError, RetryPolicy,
};
#[cfg(feature = "runtime")]
pub use runtime::{ReliabilityRuntime, RuntimeError};
#[cfg(feature = "runtime")]
pub use settings::RuntimeSettings;
#[cfg(feature = "runtime")]
pub use time::{Clock, MockClock, SystemClock};
#[cfg(feature = "foundation")]
pub use utils::serde::duration_millis;
