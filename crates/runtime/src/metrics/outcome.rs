//! Outcome records appended to the metrics registry.

use std::fmt;
use std::time::{Duration, Instant};

/// Classification of a single recorded event.
///
/// Cache engines report `Hit` / `Miss` / `Write`, circuit breakers and retry
/// controllers report `Success` / `Failure` / `Blocked`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeKind {
    Hit,
    Miss,
    Write,
    Success,
    Failure,
    Blocked,
}

impl OutcomeKind {
    /// `Hit` and `Success`.
    pub fn is_success(self) -> bool {
        matches!(self, Self::Hit | Self::Success)
    }

    /// `Miss` and `Failure`.
    pub fn is_failure(self) -> bool {
        matches!(self, Self::Miss | Self::Failure)
    }

    pub fn is_blocked(self) -> bool {
        self == Self::Blocked
    }

    /// Whether the outcome counts towards success/failure rates. Writes do
    /// not.
    pub fn is_decisive(self) -> bool {
        !matches!(self, Self::Write)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hit => "hit",
            Self::Miss => "miss",
            Self::Write => "write",
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Blocked => "blocked",
        }
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Engine-specific payload carried by a record.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordDetail {
    None,
    /// Estimated size of the cached value involved.
    Cache { size_bytes: usize },
    /// Breaker state observed when the call was gated or completed.
    Breaker { state: &'static str },
    /// One failed retry attempt and the wait scheduled after it.
    RetryAttempt { attempt: u32, delay: Duration },
    /// Call-level retry summary.
    RetrySummary { attempts: u32, total_delay: Duration, eventual: bool },
}

/// What an engine reports for one event; the registry stamps the time.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub kind: OutcomeKind,
    pub latency: Duration,
    pub detail: RecordDetail,
}

impl Outcome {
    pub fn new(kind: OutcomeKind, latency: Duration) -> Self {
        Self { kind, latency, detail: RecordDetail::None }
    }

    #[must_use]
    pub fn with_detail(mut self, detail: RecordDetail) -> Self {
        self.detail = detail;
        self
    }

    pub fn hit(latency: Duration, size_bytes: usize) -> Self {
        Self::new(OutcomeKind::Hit, latency).with_detail(RecordDetail::Cache { size_bytes })
    }

    pub fn miss(latency: Duration) -> Self {
        Self::new(OutcomeKind::Miss, latency)
    }

    pub fn write(latency: Duration, size_bytes: usize) -> Self {
        Self::new(OutcomeKind::Write, latency).with_detail(RecordDetail::Cache { size_bytes })
    }

    pub fn success(latency: Duration) -> Self {
        Self::new(OutcomeKind::Success, latency)
    }

    pub fn failure(latency: Duration) -> Self {
        Self::new(OutcomeKind::Failure, latency)
    }

    pub fn blocked() -> Self {
        Self::new(OutcomeKind::Blocked, Duration::ZERO)
    }
}

/// A stored [`Outcome`] with the instant it was recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct OutcomeRecord {
    pub kind: OutcomeKind,
    pub latency: Duration,
    pub detail: RecordDetail,
    pub recorded_at: Instant,
}

impl OutcomeRecord {
    pub fn new(outcome: Outcome, recorded_at: Instant) -> Self {
        let Outcome { kind, latency, detail } = outcome;
        Self { kind, latency, detail, recorded_at }
    }

    /// Size carried by cache records.
    pub fn size_bytes(&self) -> Option<usize> {
        match self.detail {
            RecordDetail::Cache { size_bytes } => Some(size_bytes),
            _ => None,
        }
    }
}
