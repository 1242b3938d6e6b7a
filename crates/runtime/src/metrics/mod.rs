//! Shared outcome metrics for every engine.
//!
//! Engines report one [`Outcome`] per event under a string key (a cache name,
//! a breaker key, a retry key). The [`MetricsRegistry`] keeps a bounded
//! history per key and computes [`Stats`] from a snapshot on demand.
//!
//! - **[`outcome`]**: event kinds and engine-specific record details
//! - **[`registry`]**: the thread-safe store and its sizing config
//! - **[`stats`]**: aggregation and percentile math
//! - **[`report`]**: fixed-width text rendering

pub mod outcome;
pub mod registry;
pub mod report;
pub mod stats;

pub use outcome::{Outcome, OutcomeKind, OutcomeRecord, RecordDetail};
pub use registry::{MetricsConfig, MetricsRegistry, DEFAULT_BUFFER_CAPACITY, DEFAULT_MAX_KEYS};
pub use stats::{percentile, Stats};
