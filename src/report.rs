//! End-of-run report
//!
//! Text summary for stdout plus a JSON document for `summary_path`.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;

use crate::config::ThresholdConfig;
use crate::metrics::MetricsSnapshot;
use crate::runner::RunSummary;
use crate::validator::OutcomeKind;

/// One pass/fail criterion evaluated against the final metrics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdResult {
    pub name: String,
    pub limit: f64,
    pub observed: f64,
    pub passed: bool,
}

impl ThresholdResult {
    fn at_least(name: &str, observed: f64, limit: f64) -> Self {
        Self {
            name: name.to_string(),
            limit,
            observed,
            passed: observed > limit,
        }
    }

    fn below(name: &str, observed: f64, limit: f64) -> Self {
        Self {
            name: name.to_string(),
            limit,
            observed,
            passed: observed < limit,
        }
    }
}

/// Evaluate the configured thresholds
pub fn evaluate_thresholds(
    metrics: &MetricsSnapshot,
    thresholds: &ThresholdConfig,
) -> Vec<ThresholdResult> {
    vec![
        ThresholdResult::at_least(
            "success_rate",
            metrics.success_rate,
            thresholds.min_success_rate,
        ),
        ThresholdResult::below("p95_latency_ms", metrics.latency.p95_ms, thresholds.max_p95_ms),
        ThresholdResult::below(
            "transport_failure_rate",
            metrics.rate(OutcomeKind::TransportFailure),
            thresholds.max_transport_failure_rate,
        ),
    ]
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadTestReport {
    pub started_at: DateTime<Utc>,
    pub target_url: String,
    pub elapsed_secs: f64,
    pub throughput_per_sec: f64,
    pub planned_dispatches: u64,
    pub dispatched: u64,
    pub peak_workers: usize,
    pub max_dispatch_lag_ms: f64,
    pub stopped_early: bool,
    pub metrics: MetricsSnapshot,
    pub thresholds: Vec<ThresholdResult>,
    pub passed: bool,
}

impl LoadTestReport {
    pub fn new(summary: &RunSummary, target_url: &str, thresholds: &ThresholdConfig) -> Self {
        let results = evaluate_thresholds(&summary.metrics, thresholds);
        let passed = results.iter().all(|t| t.passed);
        Self {
            started_at: summary.started_at,
            target_url: target_url.to_string(),
            elapsed_secs: summary.elapsed.as_secs_f64(),
            throughput_per_sec: summary.metrics.throughput(summary.elapsed),
            planned_dispatches: summary.schedule.planned,
            dispatched: summary.schedule.dispatched,
            peak_workers: summary.schedule.peak_workers,
            max_dispatch_lag_ms: summary.schedule.max_lag.as_secs_f64() * 1_000.0,
            stopped_early: summary.schedule.stopped_early,
            metrics: summary.metrics.clone(),
            thresholds: results,
            passed,
        }
    }

    pub fn passed(&self) -> bool {
        self.passed
    }

    /// Human-readable summary (text)
    pub fn executive_summary(&self) -> String {
        let m = &self.metrics;
        let mut summary = String::new();

        summary.push_str(&format!(
            "=== Order Creation Load Test ===\n\
             Started: {}\n\
             Target: {}\n\
             Elapsed: {:.1}s\n",
            self.started_at.to_rfc3339(),
            self.target_url,
            self.elapsed_secs,
        ));
        if self.stopped_early {
            summary.push_str("Run stopped early; results are partial\n");
        }

        summary.push_str(&format!(
            "\nLOAD:\n\
             - Dispatched: {} of {} planned\n\
             - Throughput: {:.2} req/s\n\
             - Peak workers: {}\n\
             - Max dispatch lag: {:.1}ms\n",
            self.dispatched,
            self.planned_dispatches,
            self.throughput_per_sec,
            self.peak_workers,
            self.max_dispatch_lag_ms,
        ));

        summary.push_str(&format!("\nOUTCOMES ({} attempts):\n", m.total_attempts));
        for kind in OutcomeKind::ALL {
            summary.push_str(&format!(
                "  - {}: {} ({:.2}%)\n",
                kind.label(),
                m.count(kind),
                m.rate(kind) * 100.0,
            ));
        }

        summary.push_str(&format!(
            "\nLATENCY:\n\
             - min: {:.1}ms, mean: {:.1}ms, max: {:.1}ms\n\
             - p50: {:.1}ms, p90: {:.1}ms, p95: {:.1}ms, p99: {:.1}ms\n",
            m.latency.min_ms,
            m.latency.mean_ms,
            m.latency.max_ms,
            m.latency.p50_ms,
            m.latency.p90_ms,
            m.latency.p95_ms,
            m.latency.p99_ms,
        ));

        summary.push_str(&format!(
            "\nPAYLOAD:\n\
             - Items sent: {}\n\
             - Duplicate skus skipped: {}\n",
            m.items_sent, m.duplicate_skus_skipped,
        ));

        if !m.check_failures.is_empty() {
            summary.push_str("\nFailed Checks:\n");
            for (check, count) in &m.check_failures {
                summary.push_str(&format!("  - {}: {}\n", check, count));
            }
        }

        summary.push_str("\nTHRESHOLDS:\n");
        for t in &self.thresholds {
            summary.push_str(&format!(
                "  [{}] {}: {:.4} (limit {})\n",
                if t.passed { "PASS" } else { "FAIL" },
                t.name,
                t.observed,
                t.limit,
            ));
        }
        summary.push_str(&format!(
            "\nRESULT: {}\n",
            if self.passed { "PASSED" } else { "FAILED" }
        ));

        summary
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = self.to_json().context("Failed to serialize report")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Wrote JSON summary");
        Ok(())
    }
}
