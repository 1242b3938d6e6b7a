//! Scripted operations for retry and breaker tests.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::{ErrorClassification, ErrorSeverity};

/// Error produced by a [`FlakyOperation`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlakyError {
    pub call: u32,
    pub retryable: bool,
}

impl fmt::Display for FlakyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.retryable { "transient" } else { "permanent" };
        write!(f, "{kind} failure on call {}", self.call)
    }
}

impl std::error::Error for FlakyError {}

impl ErrorClassification for FlakyError {
    fn is_retryable(&self) -> bool {
        self.retryable
    }

    fn severity(&self) -> ErrorSeverity {
        if self.retryable {
            ErrorSeverity::Warning
        } else {
            ErrorSeverity::Error
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Succeed,
    Transient,
    Permanent,
}

/// Operation that plays back a script of results, then keeps succeeding
///
/// Clones share the script and the call counter.
///
/// ```
/// # #[cfg(feature = "test-utils")]
/// # {
/// use bulwark_runtime::testing::FlakyOperation;
///
/// let op = FlakyOperation::failing_times(2);
/// assert!(op.call_sync().is_err());
/// assert!(op.call_sync().is_err());
/// assert_eq!(op.call_sync(), Ok(3));
/// assert_eq!(op.calls(), 3);
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct FlakyOperation {
    script: Arc<Mutex<VecDeque<Step>>>,
    calls: Arc<AtomicU32>,
    latency: Duration,
}

impl FlakyOperation {
    /// Fails with a retryable error `failures` times, then succeeds.
    pub fn failing_times(failures: usize) -> Self {
        Self::default().then_transient(failures)
    }

    /// Always fails with a non-retryable error.
    pub fn permanent() -> Self {
        let op = Self::default();
        op.script.lock().push_back(Step::Permanent);
        op
    }

    /// Appends `count` retryable failures to the script.
    #[must_use]
    pub fn then_transient(self, count: usize) -> Self {
        self.script.lock().extend(std::iter::repeat(Step::Transient).take(count));
        self
    }

    /// Appends `count` successes to the script.
    #[must_use]
    pub fn then_succeed(self, count: usize) -> Self {
        self.script.lock().extend(std::iter::repeat(Step::Succeed).take(count));
        self
    }

    /// Each async call sleeps this long before answering.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Calls made so far.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Plays the next step synchronously, returning the 1-based call number
    /// on success.
    pub fn call_sync(&self) -> Result<u32, FlakyError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let step = {
            let mut script = self.script.lock();
            match script.front().copied() {
                // a permanent failure repeats forever
                Some(Step::Permanent) => Step::Permanent,
                Some(_) => script.pop_front().unwrap_or(Step::Succeed),
                None => Step::Succeed,
            }
        };
        match step {
            Step::Succeed => Ok(call),
            Step::Transient => Err(FlakyError { call, retryable: true }),
            Step::Permanent => Err(FlakyError { call, retryable: false }),
        }
    }

    /// Async variant of [`call_sync`](Self::call_sync) honouring the
    /// configured latency.
    pub async fn call(&self) -> Result<u32, FlakyError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.call_sync()
    }
}
