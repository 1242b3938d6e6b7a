//! Custom assertions for engine tests
//!
//! Provides assertion macros and functions for latency, rate and error checks.

// These helpers panic on failure by design of an assertion.
#![allow(clippy::missing_panics_doc)]

use std::time::Duration;

use crate::metrics::Stats;

/// Assert that an error's `Display` output contains a substring
///
/// # Examples
///
/// ```
/// # #[cfg(feature = "test-utils")]
/// # {
/// let result: Result<(), String> = Err("circuit breaker 'db' is open".to_string());
/// bulwark_runtime::assert_error_contains!(result, "is open");
/// # }
/// ```
#[macro_export]
macro_rules! assert_error_contains {
    ($result:expr, $substring:expr) => {
        match &$result {
            Ok(_) => panic!("Expected error but got Ok"),
            Err(e) => {
                let error_msg = format!("{}", e);
                assert!(
                    error_msg.contains($substring),
                    "Error message '{}' does not contain '{}'",
                    error_msg,
                    $substring
                );
            }
        }
    };
}

/// Assert that two values are approximately equal (for floats)
///
/// # Examples
///
/// ```
/// # #[cfg(feature = "test-utils")]
/// # {
/// use bulwark_runtime::testing::assert_approx_eq;
///
/// assert_approx_eq(0.6667, 2.0 / 3.0, 0.001);
/// # }
/// ```
pub fn assert_approx_eq(actual: f64, expected: f64, epsilon: f64) {
    let diff = (actual - expected).abs();
    assert!(
        diff < epsilon,
        "Values not approximately equal: {} vs {} (diff: {})",
        actual,
        expected,
        diff
    );
}

/// Assert that a duration is within `tolerance` of `expected`
///
/// # Examples
///
/// ```
/// # #[cfg(feature = "test-utils")]
/// # {
/// use std::time::Duration;
///
/// use bulwark_runtime::testing::assert_duration_in_range;
///
/// let actual = Duration::from_millis(105);
/// assert_duration_in_range(actual, Duration::from_millis(100), Duration::from_millis(10));
/// # }
/// ```
pub fn assert_duration_in_range(actual: Duration, expected: Duration, tolerance: Duration) {
    let min = expected.saturating_sub(tolerance);
    let max = expected + tolerance;

    assert!(
        actual >= min && actual <= max,
        "Duration {:?} not in range [{:?}, {:?}]",
        actual,
        min,
        max
    );
}

/// Assert the outcome counts of a [`Stats`] snapshot
pub fn assert_outcome_counts(stats: &Stats, success: usize, failure: usize, blocked: usize) {
    assert_eq!(
        (stats.success_count, stats.failure_count, stats.blocked_count),
        (success, failure, blocked),
        "unexpected (success, failure, blocked) counts in {stats:?}"
    );
}
