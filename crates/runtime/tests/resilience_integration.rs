//! Integration tests for the resilience engines
//!
//! Drives the circuit breaker through its full lifecycle with a mock clock,
//! checks backoff schedules, and composes retry around a breaker.

#![cfg(feature = "test-utils")]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bulwark_runtime::metrics::{MetricsRegistry, OutcomeKind};
use bulwark_runtime::resilience::policies::{self, PredicateRetry};
use bulwark_runtime::resilience::{
    BackoffStrategy, CircuitBreakerConfig, CircuitBreakerEngine, CircuitBreakerError,
    CircuitBreakerRegistry, CircuitState, RetryConfig, RetryController, RetryError,
};
use bulwark_runtime::assert_error_contains;
use bulwark_runtime::testing::{
    assert_duration_in_range, assert_outcome_counts, init_test_tracing, FlakyError,
    FlakyOperation, MockClock,
};

fn breaker_with(
    config: CircuitBreakerConfig,
) -> (CircuitBreakerEngine<MockClock>, MockClock, Arc<MetricsRegistry>) {
    let clock = MockClock::new();
    let metrics = Arc::new(MetricsRegistry::new());
    let breaker = CircuitBreakerEngine::with_clock("payments", config, Arc::clone(&metrics), clock.clone())
        .expect("valid breaker config");
    (breaker, clock, metrics)
}

/// Validates the full Closed -> Open -> HalfOpen -> Closed lifecycle.
///
/// # Test Steps
/// 1. Threshold 2, timeout 1s, two successes to close
/// 2. Fail at t=0 and t=0.1s; the circuit opens on the second failure
/// 3. A call at t=0.5s is rejected with the remaining wait
/// 4. At t=1.2s a call is admitted and the circuit is HalfOpen
/// 5. Two successful probes close the circuit
/// 6. Metrics hold two failures, one blocked call and two successes
#[test]
fn test_breaker_lifecycle_with_mock_clock() {
    init_test_tracing();
    let config = CircuitBreakerConfig::new()
        .failure_threshold(2)
        .timeout(Duration::from_secs(1))
        .success_threshold(2)
        .build()
        .expect("valid config");
    let (breaker, clock, metrics) = breaker_with(config);

    let failing = || Err::<(), _>("upstream unavailable");
    assert!(matches!(breaker.call(failing), Err(CircuitBreakerError::OperationFailed { .. })));
    assert_eq!(breaker.state(), CircuitState::Closed);

    clock.advance(Duration::from_millis(100));
    assert!(breaker.call(failing).is_err());
    assert_eq!(breaker.state(), CircuitState::Open);

    clock.advance(Duration::from_millis(400));
    let rejected = breaker.call(|| Ok::<_, &str>(()));
    assert_error_contains!(rejected, "circuit breaker 'payments' is open");
    match rejected {
        Err(CircuitBreakerError::CircuitOpen { key, retry_after, last_failure }) => {
            assert_eq!(key, "payments");
            assert_eq!(retry_after, Duration::from_millis(600));
            assert!(last_failure.is_some());
        }
        other => panic!("expected CircuitOpen, got {other:?}"),
    }

    clock.advance(Duration::from_millis(700));
    assert!(breaker.should_allow_call());
    assert_eq!(breaker.state(), CircuitState::HalfOpen);

    breaker.record_call(true);
    assert_eq!(breaker.state(), CircuitState::HalfOpen);
    assert_eq!(breaker.call(|| Ok::<_, &str>(7)).unwrap(), 7);
    assert_eq!(breaker.state(), CircuitState::Closed);

    let snapshot = breaker.snapshot();
    assert_eq!(snapshot.state_transitions, 3);
    assert_eq!(snapshot.rejected_calls, 1);
    assert_eq!(snapshot.consecutive_failures, 0);
    assert!(snapshot.last_closed_time.is_some());

    let stats = metrics.stats_for("payments").expect("breaker records outcomes");
    assert_outcome_counts(&stats, 2, 2, 1);
}

/// Validates that a failed half-open probe reopens the circuit and restarts
/// the timeout from the probe failure.
#[test]
fn test_half_open_probe_failure_reopens() {
    let config = CircuitBreakerConfig::new()
        .failure_threshold(1)
        .timeout(Duration::from_secs(2))
        .build()
        .expect("valid config");
    let (breaker, clock, _metrics) = breaker_with(config);

    breaker.record_call(false);
    clock.advance(Duration::from_secs(2));

    let probe = breaker.call(|| Err::<(), _>("still down"));
    assert!(matches!(probe, Err(CircuitBreakerError::HalfOpenTestFailed { .. })));
    assert_eq!(breaker.state(), CircuitState::Open);

    clock.advance(Duration::from_secs(1));
    assert!(!breaker.should_allow_call());
    clock.advance(Duration::from_secs(1));
    assert!(breaker.should_allow_call());
}

/// Validates that the state only moves along legal transitions under a
/// random mix of outcomes and clock advances.
///
/// # Test Steps
/// 1. Drive 500 pseudo-random steps through the breaker
/// 2. After each step compare the state with the previous one
/// 3. Closed never jumps straight to HalfOpen and Open never closes
///    without a probe
#[test]
fn test_state_transitions_stay_legal() {
    let config = CircuitBreakerConfig::new()
        .failure_threshold(3)
        .timeout(Duration::from_millis(250))
        .success_threshold(2)
        .build()
        .expect("valid config");
    let (breaker, clock, _metrics) = breaker_with(config);

    // xorshift keeps the sequence reproducible without a seeded rng
    let mut seed: u32 = 0x9E37_79B9;
    let mut next = move || {
        seed ^= seed << 13;
        seed ^= seed >> 17;
        seed ^= seed << 5;
        seed
    };

    let mut previous = breaker.state();
    for _ in 0..500 {
        match next() % 3 {
            0 => clock.advance(Duration::from_millis(u64::from(next() % 200))),
            1 => {
                if breaker.should_allow_call() {
                    breaker.record_call(next() % 2 == 0);
                }
            }
            _ => {
                let _ = breaker.call(|| if next() % 4 == 0 { Ok(()) } else { Err("boom") });
            }
        }

        let current = breaker.state();
        let legal = previous == current
            || matches!(
                (previous, current),
                (CircuitState::Closed, CircuitState::Open)
                    | (CircuitState::Open, CircuitState::HalfOpen)
                    | (CircuitState::HalfOpen, CircuitState::Open)
                    | (CircuitState::HalfOpen, CircuitState::Closed)
            );
        assert!(legal, "illegal transition {previous} -> {current}");
        previous = current;
    }
}

/// Validates that a single half-open failure wins over any number of earlier
/// half-open successes.
#[test]
fn test_half_open_is_fragile() {
    let config = CircuitBreakerConfig::new()
        .failure_threshold(1)
        .timeout(Duration::from_millis(100))
        .success_threshold(5)
        .build()
        .expect("valid config");
    let (breaker, clock, _metrics) = breaker_with(config);

    breaker.record_call(false);
    clock.advance(Duration::from_millis(100));
    assert!(breaker.should_allow_call());
    for _ in 0..4 {
        breaker.record_call(true);
    }
    assert_eq!(breaker.state(), CircuitState::HalfOpen);

    breaker.record_call(false);
    assert_eq!(breaker.state(), CircuitState::Open);
    assert_eq!(breaker.snapshot().consecutive_successes, 0);
}

#[test]
fn test_registry_isolates_keys() {
    let metrics = Arc::new(MetricsRegistry::new());
    let registry = CircuitBreakerRegistry::with_clock(Arc::clone(&metrics), MockClock::new())
        .with_default_config(
            CircuitBreakerConfig::new().failure_threshold(1).build().expect("valid config"),
        );

    let orders = registry.get_or_create("orders").unwrap();
    let users = registry.get_or_create("users").unwrap();
    orders.record_call(false);

    assert_eq!(orders.state(), CircuitState::Open);
    assert_eq!(users.state(), CircuitState::Closed);
    assert!(Arc::ptr_eq(&orders, &registry.get_or_create("orders").unwrap()));

    let snapshots = registry.snapshot_all();
    assert_eq!(snapshots.keys().collect::<Vec<_>>(), vec!["orders", "users"]);
    assert_eq!(snapshots["orders"].state, CircuitState::Open);

    registry.reset_all();
    assert_eq!(orders.state(), CircuitState::Closed);
}

/// Validates the exponential schedule and its clamp.
///
/// # Test Steps
/// 1. Base 1s, multiplier 2, max delay 5s, no jitter
/// 2. Attempts 1..=4 yield 1s, 2s, 4s, 5s
/// 3. Very large attempt numbers stay clamped
#[test]
fn test_exponential_backoff_schedule_is_clamped() {
    let config = RetryConfig::new()
        .exponential_backoff(Duration::from_secs(1), 2.0)
        .max_delay(Duration::from_secs(5))
        .no_jitter()
        .build()
        .expect("valid config");

    let schedule: Vec<_> = (1..=4).map(|attempt| config.delay_for(attempt)).collect();
    assert_eq!(
        schedule,
        vec![
            Duration::from_secs(1),
            Duration::from_secs(2),
            Duration::from_secs(4),
            Duration::from_secs(5)
        ]
    );
    assert_eq!(config.delay_for(200), Duration::from_secs(5));
}

#[test]
fn test_backoff_is_monotonic_before_clamp() {
    let strategies = [
        BackoffStrategy::exponential(Duration::from_millis(50), 1.5),
        BackoffStrategy::linear(Duration::from_millis(50), Duration::from_millis(25)),
        BackoffStrategy::fixed(Duration::from_millis(50)),
    ];

    for strategy in &strategies {
        let delays: Vec<_> = (1..=10).map(|attempt| strategy.delay(attempt)).collect();
        assert!(delays.windows(2).all(|pair| pair[0] <= pair[1]), "{strategy:?} not monotonic");
    }
}

/// Validates that retry recovers from scripted transient failures and
/// records one summary plus one record per attempt.
///
/// # Test Steps
/// 1. Operation fails twice with retryable errors, then succeeds
/// 2. Retry with the classifying policy and fixed 100ms backoff
/// 3. Verify three calls, two waits and the recorded metrics
#[tokio::test(start_paused = true)]
async fn test_retry_recovers_from_transient_failures() {
    let metrics = Arc::new(MetricsRegistry::new());
    let config = RetryConfig::new()
        .max_attempts(4)
        .fixed_backoff(Duration::from_millis(100))
        .no_jitter()
        .build()
        .unwrap();
    let retry =
        RetryController::new("inventory", config, policies::Classified, Arc::clone(&metrics))
            .unwrap();
    let op = FlakyOperation::failing_times(2);

    let outcome = retry.execute_with_outcome(|| op.call()).await;

    assert!(outcome.is_eventual_success());
    assert_eq!(outcome.attempts, 3);
    assert_eq!(outcome.total_delay, Duration::from_millis(200));
    assert_eq!(outcome.attempt_log.len(), 2);
    assert_eq!(outcome.into_result().unwrap(), 3);
    assert_eq!(op.calls(), 3);

    let summary = metrics.stats_for("inventory").unwrap();
    assert_outcome_counts(&summary, 1, 0, 0);
    let attempts = metrics.stats_for("inventory#attempt").unwrap();
    assert_outcome_counts(&attempts, 1, 2, 0);
}

#[tokio::test(start_paused = true)]
async fn test_retry_stops_on_permanent_failure() {
    let metrics = Arc::new(MetricsRegistry::new());
    let retry = RetryController::new(
        "ledger",
        RetryConfig::default(),
        policies::Classified,
        Arc::clone(&metrics),
    )
    .unwrap();
    let op = FlakyOperation::permanent();

    let result = retry.execute(|| op.call()).await;

    match result {
        Err(RetryError::NonRetryable { attempts, source }) => {
            assert_eq!(attempts, 1);
            assert!(!source.retryable);
        }
        other => panic!("expected NonRetryable, got {other:?}"),
    }
    assert_eq!(op.calls(), 1);
    let records = metrics.records_for("ledger").unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].kind, OutcomeKind::Failure);
}

/// Validates retry wrapped around a circuit breaker.
///
/// # Test Steps
/// 1. Breaker opens after three failures; retry allows five attempts and
///    stops on circuit-open errors
/// 2. The operation always fails transiently
/// 3. Retry stops on the fourth attempt, which the open breaker rejects
/// 4. The operation itself ran only three times
#[tokio::test(start_paused = true)]
async fn test_retry_stops_when_breaker_opens() {
    let clock = MockClock::new();
    let metrics = Arc::new(MetricsRegistry::new());
    let breaker = CircuitBreakerEngine::with_clock(
        "search",
        CircuitBreakerConfig::new().failure_threshold(3).build().unwrap(),
        Arc::clone(&metrics),
        clock,
    )
    .unwrap();
    let retry = RetryController::new(
        "search",
        RetryConfig::new()
            .max_attempts(5)
            .fixed_backoff(Duration::from_millis(10))
            .no_jitter()
            .build()
            .unwrap(),
        PredicateRetry::new(|error: &CircuitBreakerError<FlakyError>, _attempt: u32| {
            !error.is_circuit_open()
        }),
        Arc::clone(&metrics),
    )
    .unwrap();
    let op = FlakyOperation::failing_times(10);

    let result = retry.execute(|| breaker.execute(|| op.call())).await;

    match result {
        Err(RetryError::NonRetryable { attempts, source }) => {
            assert_eq!(attempts, 4);
            assert!(source.is_circuit_open());
        }
        other => panic!("expected NonRetryable, got {other:?}"),
    }
    assert_eq!(op.calls(), 3);
    assert_eq!(breaker.state(), CircuitState::Open);

    let breaker_stats = metrics.stats_for("search").unwrap();
    // three breaker failures, one block, one retry summary failure
    assert_eq!(breaker_stats.blocked_count, 1);
    assert_eq!(breaker_stats.failure_count, 4);
}

#[tokio::test(start_paused = true)]
async fn test_retry_respects_timeout_budget_across_attempts() {
    let metrics = Arc::new(MetricsRegistry::new());
    let retry = RetryController::new(
        "slow",
        RetryConfig::new()
            .max_attempts(10)
            .fixed_backoff(Duration::from_millis(100))
            .no_jitter()
            .timeout_budget(Duration::from_millis(380))
            .build()
            .unwrap(),
        policies::AlwaysRetry,
        metrics,
    )
    .unwrap();
    let calls = AtomicU32::new(0);
    let counter = &calls;

    let result = retry
        .execute(|| async move {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Err::<(), _>("slow failure")
        })
        .await;

    assert_error_contains!(result, "timeout budget exceeded");
    let error = result.unwrap_err();
    assert!(error.is_timeout());
    // attempts end at 50, 200 and 350ms; the third wait would overrun
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(error.attempts(), 3);
    match error {
        RetryError::TimeoutExceeded { elapsed, last_error, .. } => {
            assert_duration_in_range(elapsed, Duration::from_millis(350), Duration::from_millis(5));
            assert_eq!(last_error, Some("slow failure"));
        }
        other => panic!("expected TimeoutExceeded, got {other:?}"),
    }
}
