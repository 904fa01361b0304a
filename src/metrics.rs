//! Streaming metrics aggregation
//!
//! All state lives in one `MetricsState` behind a single `parking_lot::Mutex`.
//! Workers call `record*` concurrently; each call is a short critical section
//! with no await points. Latency goes into an HDR histogram (microseconds,
//! 3 significant digits), so memory stays fixed no matter how long the run is
//! and quantiles are within 0.1% of the exact value.

use hdrhistogram::Histogram;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::validator::{ContractBreach, Outcome, OutcomeKind};

/// Highest trackable latency (60s); slower samples saturate to it
const HIGHEST_TRACKABLE_US: u64 = 60_000_000;
const SIGNIFICANT_DIGITS: u8 = 3;

struct MetricsState {
    by_kind: [u64; 4],
    latency_us: Histogram<u64>,
    latency_sum_us: u128,
    latency_min_us: u64,
    latency_max_us: u64,
    check_failures: BTreeMap<&'static str, u64>,
    items_sent: u64,
    duplicate_skus_skipped: u64,
}

impl MetricsState {
    fn new() -> Self {
        let latency_us =
            Histogram::new_with_bounds(1, HIGHEST_TRACKABLE_US, SIGNIFICANT_DIGITS)
                .expect("constant histogram bounds are valid");
        Self {
            by_kind: [0; 4],
            latency_us,
            latency_sum_us: 0,
            latency_min_us: u64::MAX,
            latency_max_us: 0,
            check_failures: BTreeMap::new(),
            items_sent: 0,
            duplicate_skus_skipped: 0,
        }
    }
}

/// Thread-safe accumulator shared by all workers
pub struct MetricsAggregator {
    state: Mutex<MetricsState>,
}

impl std::fmt::Debug for MetricsAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MetricsAggregator")
            .field("by_kind", &state.by_kind)
            .field("latency_samples", &state.latency_us.len())
            .finish()
    }
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MetricsState::new()),
        }
    }

    /// Record one completed attempt
    pub fn record(&self, outcome: &Outcome) {
        let latency_us = (outcome.latency().as_micros() as u64).max(1);
        let mut state = self.state.lock();
        state.by_kind[outcome.kind().index()] += 1;
        state.latency_us.saturating_record(latency_us);
        state.latency_sum_us += latency_us as u128;
        state.latency_min_us = state.latency_min_us.min(latency_us);
        state.latency_max_us = state.latency_max_us.max(latency_us);
    }

    /// Count which success-path check failed
    pub fn record_breach(&self, breach: &ContractBreach) {
        *self.state.lock().check_failures.entry(breach.label()).or_insert(0) += 1;
    }

    /// Payload bookkeeping for one synthesized order
    pub fn record_payload(&self, items_sent: usize, duplicate_skus_skipped: usize) {
        let mut state = self.state.lock();
        state.items_sent += items_sent as u64;
        state.duplicate_skus_skipped += duplicate_skus_skipped as u64;
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let state = self.state.lock();
        let total: u64 = state.by_kind.iter().sum();
        let count = |kind: OutcomeKind| state.by_kind[kind.index()];

        let latency = if total == 0 {
            LatencySummary::default()
        } else {
            let hist = &state.latency_us;
            let q = |quantile: f64| us_to_ms(hist.value_at_quantile(quantile));
            LatencySummary {
                count: total,
                min_ms: us_to_ms(state.latency_min_us),
                mean_ms: state.latency_sum_us as f64 / total as f64 / 1_000.0,
                p50_ms: q(0.50),
                p90_ms: q(0.90),
                p95_ms: q(0.95),
                p99_ms: q(0.99),
                max_ms: us_to_ms(state.latency_max_us),
            }
        };

        MetricsSnapshot {
            total_attempts: total,
            successes: count(OutcomeKind::Success),
            validation_failures: count(OutcomeKind::ValidationFailure),
            duplicate_conflicts: count(OutcomeKind::DuplicateConflict),
            transport_failures: count(OutcomeKind::TransportFailure),
            success_rate: ratio(count(OutcomeKind::Success), total),
            latency,
            check_failures: state
                .check_failures
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
            items_sent: state.items_sent,
            duplicate_skus_skipped: state.duplicate_skus_skipped,
        }
    }
}

fn us_to_ms(us: u64) -> f64 {
    us as f64 / 1_000.0
}

fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

/// Latency distribution in milliseconds
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LatencySummary {
    pub count: u64,
    pub min_ms: f64,
    pub mean_ms: f64,
    pub p50_ms: f64,
    pub p90_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub max_ms: f64,
}

/// Frozen view of the aggregator
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub total_attempts: u64,
    pub successes: u64,
    pub validation_failures: u64,
    pub duplicate_conflicts: u64,
    pub transport_failures: u64,
    pub success_rate: f64,
    pub latency: LatencySummary,
    /// Failed success-path checks keyed by check name
    pub check_failures: BTreeMap<String, u64>,
    pub items_sent: u64,
    pub duplicate_skus_skipped: u64,
}

impl MetricsSnapshot {
    pub fn count(&self, kind: OutcomeKind) -> u64 {
        match kind {
            OutcomeKind::Success => self.successes,
            OutcomeKind::ValidationFailure => self.validation_failures,
            OutcomeKind::DuplicateConflict => self.duplicate_conflicts,
            OutcomeKind::TransportFailure => self.transport_failures,
        }
    }

    pub fn rate(&self, kind: OutcomeKind) -> f64 {
        ratio(self.count(kind), self.total_attempts)
    }

    /// Attempts per second over `elapsed`
    pub fn throughput(&self, elapsed: Duration) -> f64 {
        let secs = elapsed.as_secs_f64();
        if secs <= 0.0 {
            0.0
        } else {
            self.total_attempts as f64 / secs
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;
    use std::sync::Arc;

    fn outcome(i: u64, latency_ms: u64) -> Outcome {
        let latency = Duration::from_millis(latency_ms);
        match i % 10 {
            0 => Outcome::ValidationFailure { latency },
            1 => Outcome::DuplicateConflict { latency },
            2 => Outcome::TransportFailure { latency },
            _ => Outcome::Success { latency },
        }
    }

    fn exact_quantile(sorted: &[u64], q: f64) -> f64 {
        let rank = ((q * sorted.len() as f64).ceil() as usize).max(1);
        sorted[rank - 1] as f64
    }

    #[test]
    fn test_empty_snapshot() {
        let snap = MetricsAggregator::new().snapshot();
        assert_eq!(snap.total_attempts, 0);
        assert_eq!(snap.success_rate, 0.0);
        assert_eq!(snap.latency, LatencySummary::default());
        assert_eq!(snap.throughput(Duration::from_secs(1)), 0.0);
    }

    #[test]
    fn test_counts_and_rates() {
        let metrics = MetricsAggregator::new();
        for i in 0..100 {
            metrics.record(&outcome(i, 10 + i));
        }
        let snap = metrics.snapshot();
        assert_eq!(snap.total_attempts, 100);
        assert_eq!(snap.successes, 70);
        assert_eq!(snap.validation_failures, 10);
        assert_eq!(snap.duplicate_conflicts, 10);
        assert_eq!(snap.transport_failures, 10);
        assert!((snap.success_rate - 0.7).abs() < 1e-12);
        assert!((snap.rate(OutcomeKind::TransportFailure) - 0.1).abs() < 1e-12);
        assert_eq!(snap.latency.min_ms, 10.0);
        assert_eq!(snap.latency.max_ms, 109.0);
        assert!((snap.latency.mean_ms - 59.5).abs() < 1e-9);
        assert_eq!(snap.throughput(Duration::from_secs(50)), 2.0);
    }

    #[test]
    fn test_concurrent_recording_matches_sequential() {
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        let latencies: Vec<u64> = (0..1_000).map(|_| rng.gen_range(5..3_000)).collect();

        let concurrent = Arc::new(MetricsAggregator::new());
        std::thread::scope(|scope| {
            for worker in 0..50 {
                let metrics = Arc::clone(&concurrent);
                let latencies = &latencies;
                scope.spawn(move || {
                    for i in (worker..1_000).step_by(50) {
                        metrics.record(&outcome(i as u64, latencies[i]));
                        if i % 7 == 0 {
                            metrics.record_breach(&ContractBreach::MissingOrderId);
                        }
                    }
                });
            }
        });

        let sequential = MetricsAggregator::new();
        for (i, latency) in latencies.iter().enumerate() {
            sequential.record(&outcome(i as u64, *latency));
            if i % 7 == 0 {
                sequential.record_breach(&ContractBreach::MissingOrderId);
            }
        }

        let got = concurrent.snapshot();
        assert_eq!(got.total_attempts, 1_000);
        assert_eq!(got, sequential.snapshot());
        assert_eq!(got.check_failures["has_order_id"], 143);
    }

    #[test]
    fn test_p95_accuracy_against_exact() {
        let metrics = MetricsAggregator::new();
        let mut rng = ChaCha8Rng::seed_from_u64(95);
        let mut samples_us: Vec<u64> = Vec::with_capacity(200_000);
        for _ in 0..200_000 {
            // Long-tailed: mostly fast, occasional slow
            let us = if rng.gen_bool(0.9) {
                rng.gen_range(20_000..200_000)
            } else {
                rng.gen_range(200_000..5_000_000)
            };
            samples_us.push(us);
            metrics.record(&Outcome::Success {
                latency: Duration::from_micros(us),
            });
        }
        samples_us.sort_unstable();

        let snap = metrics.snapshot();
        for (q, got_ms) in [
            (0.50, snap.latency.p50_ms),
            (0.95, snap.latency.p95_ms),
            (0.99, snap.latency.p99_ms),
        ] {
            let exact_ms = exact_quantile(&samples_us, q) / 1_000.0;
            let err = (got_ms - exact_ms).abs() / exact_ms;
            assert!(err < 0.01, "q={} got={} exact={}", q, got_ms, exact_ms);
        }
        let exact_max_ms = *samples_us.last().unwrap() as f64 / 1_000.0;
        assert_eq!(snap.latency.max_ms, exact_max_ms);
    }

    #[test]
    fn test_latency_above_range_saturates() {
        let metrics = MetricsAggregator::new();
        metrics.record(&Outcome::TransportFailure {
            latency: Duration::from_secs(120),
        });
        let snap = metrics.snapshot();
        assert_eq!(snap.latency.max_ms, 120_000.0);
        assert!(snap.latency.p95_ms < 60_100.0);
    }

    #[test]
    fn test_payload_counters() {
        let metrics = MetricsAggregator::new();
        metrics.record_payload(5, 0);
        metrics.record_payload(3, 2);
        let snap = metrics.snapshot();
        assert_eq!(snap.items_sent, 8);
        assert_eq!(snap.duplicate_skus_skipped, 2);
    }
}
