//! Load test runner
//!
//! Wires the scheduler to one order-creation cycle per dispatch:
//! synthesize payload, submit with a fresh idempotency key, classify the
//! response, record metrics.

use chrono::{DateTime, Utc};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::catalog::Catalog;
use crate::client::{truncate, ApiResponse, OrderSubmitter};
use crate::config::LoadTestConfig;
use crate::error::SetupError;
use crate::metrics::{MetricsAggregator, MetricsSnapshot};
use crate::order::IdempotencyKey;
use crate::scheduler::{ArrivalScheduler, Dispatch, ScheduleSummary, SchedulerConfig, StopSignal};
use crate::synth::PayloadSynthesizer;
use crate::validator::{ResponseValidator, Verdict};

/// Response bodies are cut to this many characters in failure logs
const LOGGED_BODY_CHARS: usize = 500;
const SUCCESS_LOG_EVERY: u64 = 50;

/// Everything a worker needs for one attempt
struct AttemptContext {
    catalog: Arc<Catalog>,
    synth: PayloadSynthesizer,
    submitter: Arc<dyn OrderSubmitter>,
    validator: ResponseValidator,
    metrics: Arc<MetricsAggregator>,
    seed: Option<u64>,
    first_payload_logged: AtomicBool,
    successes: AtomicU64,
}

impl AttemptContext {
    fn rng_for(&self, seq: u64) -> ChaCha8Rng {
        match self.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed.wrapping_add(seq)),
            None => ChaCha8Rng::from_entropy(),
        }
    }

    async fn attempt(&self, dispatch: Dispatch) {
        let mut rng = self.rng_for(dispatch.seq);
        let (request, stats) = self.synth.synthesize_with_stats(&self.catalog, &mut rng);
        let key = IdempotencyKey::generate(&mut rng);
        self.metrics
            .record_payload(request.item_count(), stats.duplicate_skus_skipped);

        if !self.first_payload_logged.swap(true, Ordering::Relaxed) {
            match serde_json::to_string(&request) {
                Ok(payload) => debug!(
                    payload = truncate(&payload, LOGGED_BODY_CHARS),
                    idempotency_key = %key,
                    "First order payload"
                ),
                Err(e) => debug!(error = %e, "Could not serialize first payload"),
            }
        }

        let started = Instant::now();
        let response = self.submitter.submit(&request, &key).await;
        let latency = started.elapsed();

        let verdict = match &response {
            Ok(response) => self.validator.validate(&request, response, latency),
            Err(e) => {
                let verdict = self.validator.no_response(latency);
                log_no_response(&verdict, e, &key, &request.seller_order_id);
                verdict
            }
        };

        self.metrics.record(&verdict.outcome);
        if let Some(breach) = &verdict.breach {
            self.metrics.record_breach(breach);
        }

        if verdict.outcome.is_success() {
            let n = self.successes.fetch_add(1, Ordering::Relaxed) + 1;
            if n % SUCCESS_LOG_EVERY == 0 {
                info!(
                    successes = n,
                    display_order_id = %request.display_order_id,
                    items = request.item_count(),
                    latency_ms = latency.as_secs_f64() * 1_000.0,
                    "Orders accepted"
                );
            }
        } else if let Ok(response) = &response {
            log_failure(&verdict, response, &key, &request.seller_order_id);
        }
    }
}

fn log_no_response(
    verdict: &Verdict,
    error: &anyhow::Error,
    key: &IdempotencyKey,
    seller_order_id: &str,
) {
    warn!(
        kind = verdict.outcome.kind().label(),
        idempotency_key = %key,
        seller_order_id,
        error = %format!("{:#}", error),
        "Order request got no response"
    );
}

fn log_failure(verdict: &Verdict, response: &ApiResponse, key: &IdempotencyKey, seller_order_id: &str) {
    let reason = verdict
        .breach
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_default();
    warn!(
        kind = verdict.outcome.kind().label(),
        status = response.status,
        idempotency_key = %key,
        seller_order_id,
        reason = %reason,
        body = response.truncated_body(LOGGED_BODY_CHARS),
        "Order request failed"
    );
}

/// Result of a completed (or stopped) run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub schedule: ScheduleSummary,
    pub metrics: MetricsSnapshot,
}

pub struct LoadTest {
    context: Arc<AttemptContext>,
    scheduler: ArrivalScheduler,
}

impl LoadTest {
    pub fn new(
        config: &LoadTestConfig,
        catalog: Arc<Catalog>,
        submitter: Arc<dyn OrderSubmitter>,
    ) -> Result<Self, SetupError> {
        let scheduler = ArrivalScheduler::new(SchedulerConfig::from_load_test(config)?)?;
        let synth = PayloadSynthesizer::new(config.payload.clone())?;

        let context = AttemptContext {
            catalog,
            synth,
            submitter,
            validator: ResponseValidator::default(),
            metrics: Arc::new(MetricsAggregator::new()),
            seed: config.seed,
            first_payload_logged: AtomicBool::new(false),
            successes: AtomicU64::new(0),
        };

        Ok(Self {
            context: Arc::new(context),
            scheduler,
        })
    }

    /// Handle for stopping the run from another task (e.g. on Ctrl-C)
    pub fn stop_signal(&self) -> StopSignal {
        self.scheduler.stop_signal()
    }

    pub async fn run(&self) -> RunSummary {
        let started_at = Utc::now();
        let started = Instant::now();
        info!(
            catalog_size = self.context.catalog.len(),
            seeded = self.context.seed.is_some(),
            "Starting load test"
        );

        let context = Arc::clone(&self.context);
        let schedule = self
            .scheduler
            .run(move |dispatch| {
                let context = Arc::clone(&context);
                async move { context.attempt(dispatch).await }
            })
            .await;

        let metrics = self.context.metrics.snapshot();
        info!(
            attempts = metrics.total_attempts,
            success_rate = metrics.success_rate,
            p95_ms = metrics.latency.p95_ms,
            "Load test finished"
        );

        RunSummary {
            started_at,
            elapsed: started.elapsed(),
            schedule,
            metrics,
        }
    }
}
