//! End-to-end scoring scenarios against the health scorer.

use simurgh::HealthScorer;
use std::time::{Duration, Instant};

/// Organic-looking completion instants: monotone, uneven spacing.
fn organic_instants(count: usize) -> Vec<Instant> {
    let base = Instant::now();
    let mut offset_ms = 0u64;
    (0..count)
        .map(|i| {
            offset_ms += 140 + (i as u64 * i as u64 * 31) % 260;
            base + Duration::from_millis(offset_ms)
        })
        .collect()
}

#[test]
fn clean_cloudflare_endpoint_scores_high() {
    // Five successful probes at 40-48 ms, zero errors, Iran mode.
    let mut scorer = HealthScorer::new(true);
    let instants = organic_instants(5);
    for (latency, at) in [40u64, 45, 42, 48, 41].into_iter().zip(instants) {
        scorer.record_latency(latency, at);
    }
    scorer.record_timings(12, 18, 95, 60);

    let score = scorer.health_score();
    assert!(score >= 95, "expected >= 95, got {score}");
    assert!(!scorer.dpi_suspected());
    // Provider-whitelisted endpoints over this threshold are Iran-optimized.
    assert!(score >= 70);
}

#[test]
fn flaky_endpoint_loses_the_reliability_multiplier() {
    // ok 100ms, timeout, ok 110ms, timeout, ok 105ms.
    let mut scorer = HealthScorer::new(false);
    let instants = organic_instants(3);
    for (latency, at) in [100u64, 110, 105].into_iter().zip(instants) {
        scorer.record_latency(latency, at);
    }
    scorer.record_error();
    scorer.record_error();

    assert!((scorer.error_rate() - 0.4).abs() < 1e-9);
    let score = scorer.health_score();
    // The 0.7 reliability multiplier keeps this out of the optimized band.
    assert!(score < 70, "expected < 70, got {score}");
}

#[test]
fn metronomic_arrivals_read_as_rate_limiting() {
    // Near-constant latencies (CV ~ 0.003) on a fixed 250 ms cadence.
    let latencies = [
        100u64, 100, 100, 100, 100, 100, 100, 100, 100, 100, 100, 101, 99, 100, 100, 100, 100,
        100, 100, 100,
    ];
    let base = Instant::now();

    let mut suspected = HealthScorer::new(true);
    for (i, &latency) in latencies.iter().enumerate() {
        suspected.record_latency(latency, base + Duration::from_millis(250 * i as u64));
    }
    let with_suspicion = suspected.health_score();
    assert!(suspected.dpi_suspected());

    // The same samples on an organic cadence keep the full score; the gap
    // is the 0.8 Iran-mode multiplier (plus the lost clean-path bonus).
    let mut clean = HealthScorer::new(true);
    for (&latency, at) in latencies.iter().zip(organic_instants(latencies.len())) {
        clean.record_latency(latency, at);
    }
    let without_suspicion = clean.health_score();
    assert!(!clean.dpi_suspected());
    assert!(with_suspicion < without_suspicion);
}

#[test]
fn composite_weights_sum_to_one() {
    // Both weight tables must be convex combinations; a scorer fed a
    // uniform perfect signal lands on 100 after rounding in either mode.
    for iran in [false, true] {
        let mut scorer = HealthScorer::new(iran);
        for (latency, at) in [20u64, 22, 21, 23, 20].into_iter().zip(organic_instants(5)) {
            scorer.record_latency(latency, at);
        }
        let score = scorer.health_score();
        assert!(score <= 100);
        assert!(score >= 95, "uniform fast signal should score near-perfect, got {score}");
    }
}

#[test]
fn score_is_always_in_bounds() {
    let cases: [&[u64]; 4] = [
        &[1],
        &[5000, 5000, 5000],
        &[10, 9000, 12, 8000, 11, 7000, 10, 6000, 12, 9000],
        &[100; 30],
    ];
    for latencies in cases {
        for iran in [false, true] {
            let mut scorer = HealthScorer::new(iran);
            for (&latency, at) in latencies.iter().zip(organic_instants(latencies.len())) {
                scorer.record_latency(latency, at);
            }
            for _ in 0..latencies.len() {
                scorer.record_error();
            }
            let score = scorer.health_score();
            assert!(score <= 100);
        }
    }
}

#[test]
fn sample_and_timestamp_sequences_stay_parallel() {
    let mut scorer = HealthScorer::new(false);
    for (i, at) in organic_instants(7).into_iter().enumerate() {
        scorer.record_latency(50 + i as u64, at);
        if i % 2 == 0 {
            scorer.record_error();
        }
    }
    assert_eq!(scorer.sample_count(), 7);
    assert_eq!(scorer.error_count(), 4);
    assert_eq!(scorer.attempt_count(), 11);
    assert!(scorer.error_count() <= scorer.attempt_count());
}
