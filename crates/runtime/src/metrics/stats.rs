//! On-demand aggregation over a snapshot of outcome records.

use std::time::Duration;

use super::outcome::{OutcomeKind, OutcomeRecord};

/// Aggregate view of one metrics key.
///
/// Computed from a buffer snapshot every time it is requested; nothing here is
/// maintained incrementally.
#[derive(Debug, Clone, PartialEq)]
pub struct Stats {
    /// Records currently in the buffer.
    pub count: usize,
    /// `Hit` + `Success` records.
    pub success_count: usize,
    /// `Miss` + `Failure` records.
    pub failure_count: usize,
    pub blocked_count: usize,
    /// `Write` records, excluded from every rate.
    pub neutral_count: usize,
    /// Share of decisive records that succeeded, `1.0` when there are none.
    pub success_rate: f64,
    pub failure_rate: f64,
    pub blocked_rate: f64,
    /// Latency aggregates over records that actually executed (blocked calls
    /// are excluded).
    pub avg_latency: Duration,
    pub min_latency: Duration,
    pub max_latency: Duration,
    pub p50: Duration,
    pub p95: Duration,
    pub p99: Duration,
    /// Records per second across the buffer's time span.
    pub rate_per_second: f64,
    /// Mean estimated value size over records that carry one.
    pub avg_size_bytes: Option<f64>,
    /// Records evicted from this key's buffer by overflow.
    pub overwritten: u64,
}

impl Stats {
    /// Aggregates `records`, which must be in recording order.
    pub fn from_records(records: &[OutcomeRecord], overwritten: u64) -> Self {
        let count = records.len();
        let mut success_count = 0;
        let mut failure_count = 0;
        let mut blocked_count = 0;
        let mut neutral_count = 0;
        let mut latencies = Vec::with_capacity(count);
        let mut size_total = 0usize;
        let mut size_samples = 0usize;

        for record in records {
            match record.kind {
                OutcomeKind::Hit | OutcomeKind::Success => success_count += 1,
                OutcomeKind::Miss | OutcomeKind::Failure => failure_count += 1,
                OutcomeKind::Blocked => blocked_count += 1,
                OutcomeKind::Write => neutral_count += 1,
            }
            if !record.kind.is_blocked() {
                latencies.push(record.latency);
            }
            if let Some(size) = record.size_bytes() {
                size_total = size_total.saturating_add(size);
                size_samples += 1;
            }
        }

        let decisive = success_count + failure_count + blocked_count;
        let ratio = |part: usize| if decisive == 0 { 0.0 } else { part as f64 / decisive as f64 };
        let success_rate = if decisive == 0 { 1.0 } else { ratio(success_count) };

        latencies.sort_unstable();
        let total_latency: Duration = latencies.iter().sum();
        let avg_latency = u32::try_from(latencies.len())
            .ok()
            .filter(|n| *n > 0)
            .map_or(Duration::ZERO, |n| total_latency / n);

        Self {
            count,
            success_count,
            failure_count,
            blocked_count,
            neutral_count,
            success_rate,
            failure_rate: ratio(failure_count),
            blocked_rate: ratio(blocked_count),
            avg_latency,
            min_latency: latencies.first().copied().unwrap_or_default(),
            max_latency: latencies.last().copied().unwrap_or_default(),
            p50: percentile(&latencies, 0.50),
            p95: percentile(&latencies, 0.95),
            p99: percentile(&latencies, 0.99),
            rate_per_second: rate_per_second(records),
            avg_size_bytes: (size_samples > 0).then(|| size_total as f64 / size_samples as f64),
            overwritten,
        }
    }

    /// Success rate as a percentage.
    pub fn success_percent(&self) -> f64 {
        self.success_rate * 100.0
    }

    /// One-line human readable summary.
    pub fn summary(&self) -> String {
        format!(
            "count={} success={:.1}% avg={:.2?} p50={:.2?} p95={:.2?} p99={:.2?}",
            self.count,
            self.success_percent(),
            self.avg_latency,
            self.p50,
            self.p95,
            self.p99
        )
    }
}

/// Percentile `p` (a fraction in `0.0..=1.0`) of an ascending slice.
///
/// Uses `index = p * (n - 1)` and interpolates linearly between the two
/// bracketing values. Empty input yields zero; `p` is clamped.
pub fn percentile(sorted: &[Duration], p: f64) -> Duration {
    let Some(last) = sorted.len().checked_sub(1) else {
        return Duration::ZERO;
    };
    let p = if p.is_nan() { 0.0 } else { p.clamp(0.0, 1.0) };
    let rank = p * last as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        return sorted[lower];
    }

    let low = sorted[lower].as_nanos() as f64;
    let high = sorted[upper].as_nanos() as f64;
    let fraction = rank - lower as f64;
    Duration::from_nanos((low + (high - low) * fraction).round() as u64)
}

/// Records per second between the first and last record.
///
/// A buffer whose records all share one instant reports its count.
fn rate_per_second(records: &[OutcomeRecord]) -> f64 {
    let (Some(first), Some(last)) = (records.first(), records.last()) else {
        return 0.0;
    };
    let span = last.recorded_at.saturating_duration_since(first.recorded_at).as_secs_f64();
    if span > 0.0 {
        records.len() as f64 / span
    } else {
        records.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::metrics::outcome::Outcome;

    fn ms(values: &[u64]) -> Vec<Duration> {
        values.iter().copied().map(Duration::from_millis).collect()
    }

    /// Validates `percentile` on the five-sample latency set.
    ///
    /// Assertions:
    /// - Confirms p0 = 10ms, p50 = 30ms, p100 = 50ms.
    /// - Confirms p95 interpolates to 48ms between 40ms and 50ms.
    #[test]
    fn percentile_interpolates_between_ranks() {
        let sorted = ms(&[10, 20, 30, 40, 50]);
        assert_eq!(percentile(&sorted, 0.0), Duration::from_millis(10));
        assert_eq!(percentile(&sorted, 0.5), Duration::from_millis(30));
        assert_eq!(percentile(&sorted, 1.0), Duration::from_millis(50));
        assert_eq!(percentile(&sorted, 0.95), Duration::from_millis(48));
        assert_eq!(percentile(&sorted, 0.25), Duration::from_millis(20));
    }

    #[test]
    fn percentile_edge_inputs() {
        assert_eq!(percentile(&[], 0.5), Duration::ZERO);
        let single = ms(&[7]);
        assert_eq!(percentile(&single, 0.99), Duration::from_millis(7));
        let sorted = ms(&[10, 20]);
        assert_eq!(percentile(&sorted, 2.0), Duration::from_millis(20));
        assert_eq!(percentile(&sorted, -1.0), Duration::from_millis(10));
    }

    /// Validates `Stats::from_records` for a mixed cache key.
    ///
    /// Assertions:
    /// - Confirms writes are excluded from the success rate.
    /// - Confirms `avg_size_bytes` averages hit and write sizes.
    /// - Confirms blocked records do not contribute latency.
    #[test]
    fn stats_treat_writes_as_neutral() {
        let now = Instant::now();
        let records: Vec<_> = [
            Outcome::write(Duration::from_millis(4), 100),
            Outcome::hit(Duration::from_millis(2), 100),
            Outcome::hit(Duration::from_millis(2), 300),
            Outcome::miss(Duration::from_millis(1)),
            Outcome::blocked(),
        ]
        .into_iter()
        .map(|outcome| OutcomeRecord::new(outcome, now))
        .collect();

        let stats = Stats::from_records(&records, 0);
        assert_eq!(stats.count, 5);
        assert_eq!(stats.success_count, 2);
        assert_eq!(stats.failure_count, 1);
        assert_eq!(stats.blocked_count, 1);
        assert_eq!(stats.neutral_count, 1);
        assert!((stats.success_rate - 0.5).abs() < f64::EPSILON);
        assert!((stats.blocked_rate - 0.25).abs() < f64::EPSILON);
        assert_eq!(stats.min_latency, Duration::from_millis(1));
        assert_eq!(stats.max_latency, Duration::from_millis(4));
        assert_eq!(stats.avg_latency, Duration::from_micros(2_250));
        assert_eq!(stats.avg_size_bytes, Some(500.0 / 3.0));
        assert!((stats.rate_per_second - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rate_spans_first_to_last_record() {
        let start = Instant::now();
        let records: Vec<_> = (0..5u64)
            .map(|i| {
                OutcomeRecord::new(
                    Outcome::success(Duration::from_millis(1)),
                    start + Duration::from_millis(500 * i),
                )
            })
            .collect();

        let stats = Stats::from_records(&records, 0);
        assert!((stats.rate_per_second - 2.5).abs() < 1e-9);
        assert!((stats.success_rate - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_snapshot_yields_zeroes() {
        let stats = Stats::from_records(&[], 3);
        assert_eq!(stats.count, 0);
        assert_eq!(stats.p99, Duration::ZERO);
        assert_eq!(stats.avg_size_bytes, None);
        assert_eq!(stats.overwritten, 3);
        assert!(stats.summary().starts_with("count=0"));
    }
}
