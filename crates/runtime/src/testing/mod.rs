//! Testing utilities and helpers
//!
//! - **[`assertions`]**: assertion helpers for latencies, rates and metrics
//! - **[`flaky`]**: scripted operations that fail a set number of times
//! - [`init_test_tracing`]: one-time `tracing` subscriber writing to the test
//!   harness
//!
//! ## Usage
//!
//! ```rust
//! # #[cfg(feature = "test-utils")]
//! # {
//! use bulwark_runtime::testing::{init_test_tracing, FlakyOperation, MockClock};
//!
//! init_test_tracing();
//! let clock = MockClock::new();
//! clock.advance(std::time::Duration::from_secs(5));
//! let op = FlakyOperation::failing_times(2);
//! assert!(op.call_sync().is_err());
//! # }
//! ```

pub mod assertions;
pub mod flaky;

use std::sync::Once;

pub use assertions::{assert_approx_eq, assert_duration_in_range, assert_outcome_counts};
pub use flaky::{FlakyError, FlakyOperation};

pub use crate::time::{Clock, MockClock, SystemClock};

static TRACING: Once = Once::new();

/// Install a `tracing` subscriber once per process.
///
/// Honours `RUST_LOG` and defaults to `bulwark_runtime=debug`. Output goes
/// through the test writer so it is captured per test.
pub fn init_test_tracing() {
    TRACING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("bulwark_runtime=debug"));
        let _ = tracing_subscriber::fmt().with_env_filter(filter).with_test_writer().try_init();
    });
}
