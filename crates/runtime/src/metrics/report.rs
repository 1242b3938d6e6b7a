//! Fixed-width text report over all metrics keys.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::time::Duration;

use super::stats::Stats;

const HEADERS: [&str; 6] = ["Key", "Count", "SuccessRate%", "AvgLatency", "P95", "P99"];
const NUMERIC_WIDTH: usize = 12;

/// Renders `stats` as a table, worst key first.
///
/// Rows are ordered by ascending success rate, then descending P99, then key.
pub fn render(stats: &BTreeMap<String, Stats>) -> String {
    let mut rows: Vec<(&String, &Stats)> = stats.iter().collect();
    rows.sort_by(|(key_a, a), (key_b, b)| worst_first(key_a, a, key_b, b));

    let key_width = rows.iter().map(|(key, _)| key.len()).max().unwrap_or(0).max(HEADERS[0].len());

    let mut out = String::new();
    out.push_str(&format!("{:<key_width$}", HEADERS[0]));
    for header in &HEADERS[1..] {
        out.push_str(&format!(" | {header:>width$}", width = NUMERIC_WIDTH));
    }
    out.push('\n');
    out.push_str(&"-".repeat(key_width));
    for _ in &HEADERS[1..] {
        out.push_str("-+-");
        out.push_str(&"-".repeat(NUMERIC_WIDTH));
    }

    for (key, stat) in rows {
        out.push('\n');
        out.push_str(&format!(
            "{key:<key_width$} | {count:>w$} | {rate:>w$.2} | {avg:>w$} | {p95:>w$} | {p99:>w$}",
            count = stat.count,
            rate = stat.success_percent(),
            avg = format_latency(stat.avg_latency),
            p95 = format_latency(stat.p95),
            p99 = format_latency(stat.p99),
            w = NUMERIC_WIDTH,
        ));
    }
    out
}

fn worst_first(key_a: &str, a: &Stats, key_b: &str, b: &Stats) -> Ordering {
    a.success_rate
        .partial_cmp(&b.success_rate)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.p99.cmp(&a.p99))
        .then_with(|| key_a.cmp(key_b))
}

/// Milliseconds with two decimals, e.g. `12.50ms`.
fn format_latency(latency: Duration) -> String {
    format!("{:.2}ms", latency.as_secs_f64() * 1000.0)
}
