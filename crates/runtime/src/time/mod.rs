//! Time abstractions shared by every engine.
//!
//! Engines never call `Instant::now()` directly; they read time through a
//! [`Clock`] so tests can drive TTL expiry and breaker timeouts with a
//! [`MockClock`] instead of sleeping.
//!
//! ```rust
//! use std::time::Duration;
//!
//! use bulwark_runtime::time::{Clock, MockClock};
//!
//! let clock = MockClock::new();
//! let start = clock.now();
//! clock.advance(Duration::from_secs(5));
//! assert_eq!(clock.now() - start, Duration::from_secs(5));
//! ```

pub mod clock;

pub use clock::{Clock, MockClock, SystemClock};
