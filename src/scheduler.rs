//! Constant arrival-rate scheduler
//!
//! Issues `floor(rate * duration)` dispatches at fixed offsets
//! `seq / rate` from the start, independent of how long earlier work takes.
//!
//! Concurrency model:
//! - `min_workers` worker tasks are started up front and pull jobs from a
//!   shared channel.
//! - A tick that finds no idle worker spawns a new one, up to `max_workers`.
//! - Every in-flight job holds a semaphore permit (`max_workers` total). When
//!   all permits are out the tick waits for one: delayed, never dropped.
//!   Delayed ticks keep their nominal time, so later ticks catch up.
//! - After the last tick the channel closes and in-flight work drains.
//!
//! A `StopSignal` ends dispatching early; running jobs are left to finish.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::config::LoadTestConfig;
use crate::error::SetupError;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub rate_per_sec: f64,
    pub duration: Duration,
    pub min_workers: usize,
    pub max_workers: usize,
    /// Advisory pause a worker takes after each job
    pub pacing: Duration,
}

impl SchedulerConfig {
    pub fn from_load_test(config: &LoadTestConfig) -> Result<Self, SetupError> {
        config.validate()?;
        Ok(Self {
            rate_per_sec: config.rate_per_sec,
            duration: config.run_duration()?,
            min_workers: config.min_workers,
            max_workers: config.max_workers,
            pacing: config.pacing(),
        })
    }

    fn validate(&self) -> Result<(), SetupError> {
        if !self.rate_per_sec.is_finite() || self.rate_per_sec <= 0.0 {
            return Err(SetupError::invalid_config("rate_per_sec must be positive"));
        }
        if self.min_workers == 0 || self.min_workers > self.max_workers {
            return Err(SetupError::invalid_config(format!(
                "worker bounds [{}, {}] are invalid",
                self.min_workers, self.max_workers
            )));
        }
        Ok(())
    }

    /// floor(rate * duration)
    pub fn planned_ticks(&self) -> u64 {
        // Epsilon absorbs float error such as 2.3 * 10 = 22.999...
        (self.rate_per_sec * self.duration.as_secs_f64() + 1e-9).floor() as u64
    }

    /// Offset of tick `seq` from the start of the run
    pub fn tick_offset(&self, seq: u64) -> Duration {
        Duration::from_nanos((seq as f64 * 1e9 / self.rate_per_sec).round() as u64)
    }
}

/// One unit of dispatched work
#[derive(Debug, Clone, Copy)]
pub struct Dispatch {
    pub seq: u64,
    /// Nominal tick time
    pub scheduled_at: Instant,
    /// When a worker slot was secured (later than `scheduled_at` under backpressure)
    pub dispatched_at: Instant,
}

impl Dispatch {
    pub fn lag(&self) -> Duration {
        self.dispatched_at.saturating_duration_since(self.scheduled_at)
    }
}

#[derive(Debug, Clone)]
pub struct ScheduleSummary {
    pub planned: u64,
    pub dispatched: u64,
    pub peak_workers: usize,
    /// Largest delay between a tick's nominal time and its dispatch
    pub max_lag: Duration,
    /// Start to last in-flight job drained
    pub elapsed: Duration,
    pub stopped_early: bool,
}

/// Global stop; cloneable and usable from any task
#[derive(Debug, Clone)]
pub struct StopSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl StopSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

async fn stopped(rx: &mut watch::Receiver<bool>) {
    let closed = rx.wait_for(|stop| *stop).await.is_err();
    if closed {
        std::future::pending::<()>().await;
    }
}

#[derive(Debug, Default)]
struct PoolState {
    live: AtomicUsize,
    /// Workers waiting for a job that no tick has claimed yet
    idle: AtomicUsize,
    peak: AtomicUsize,
}

impl PoolState {
    fn add_worker(&self) -> usize {
        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(live, Ordering::SeqCst);
        live
    }

    /// Reserve an idle worker for the next job, if any
    fn claim_idle(&self) -> bool {
        self.idle
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

struct LiveGuard(Arc<PoolState>);

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.live.fetch_sub(1, Ordering::SeqCst);
    }
}

struct Job {
    dispatch: Dispatch,
    _permit: OwnedSemaphorePermit,
}

pub struct ArrivalScheduler {
    config: SchedulerConfig,
    stop: StopSignal,
}

impl ArrivalScheduler {
    pub fn new(config: SchedulerConfig) -> Result<Self, SetupError> {
        config.validate()?;
        Ok(Self {
            config,
            stop: StopSignal::new(),
        })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Drive the schedule, calling `work` once per dispatch
    pub async fn run<F, Fut>(&self, work: F) -> ScheduleSummary
    where
        F: Fn(Dispatch) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let planned = self.config.planned_ticks();
        let work = Arc::new(work);
        let slots = Arc::new(Semaphore::new(self.config.max_workers));
        let pool = Arc::new(PoolState::default());
        let (job_tx, job_rx) = mpsc::channel::<Job>(self.config.max_workers);
        let job_rx = Arc::new(Mutex::new(job_rx));
        let mut workers = JoinSet::new();

        for _ in 0..self.config.min_workers {
            pool.idle.fetch_add(1, Ordering::SeqCst);
            self.spawn_worker(&mut workers, &job_rx, &work, &pool);
        }

        info!(
            planned,
            rate_per_sec = self.config.rate_per_sec,
            duration_secs = self.config.duration.as_secs_f64(),
            min_workers = self.config.min_workers,
            max_workers = self.config.max_workers,
            "Arrival scheduler started"
        );

        let mut stop_rx = self.stop.subscribe();
        let start = Instant::now();
        let mut dispatched = 0u64;
        let mut max_lag = Duration::ZERO;
        let mut stopped_early = false;

        for seq in 0..planned {
            let scheduled_at = start + self.config.tick_offset(seq);

            tokio::select! {
                biased;
                _ = stopped(&mut stop_rx) => {
                    stopped_early = true;
                    break;
                }
                _ = sleep_until(scheduled_at) => {}
            }

            // Backpressure: wait for a slot once max_workers jobs are in flight
            let permit = tokio::select! {
                biased;
                _ = stopped(&mut stop_rx) => {
                    stopped_early = true;
                    break;
                }
                permit = Arc::clone(&slots).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            if !pool.claim_idle() {
                self.spawn_worker(&mut workers, &job_rx, &work, &pool);
                debug!(
                    live = pool.live.load(Ordering::SeqCst),
                    seq, "All workers busy, scaled up pool"
                );
            }

            let dispatch = Dispatch {
                seq,
                scheduled_at,
                dispatched_at: Instant::now(),
            };
            max_lag = max_lag.max(dispatch.lag());

            if job_tx
                .send(Job {
                    dispatch,
                    _permit: permit,
                })
                .await
                .is_err()
            {
                warn!(seq, "Worker channel closed, ending schedule");
                break;
            }
            dispatched += 1;
        }

        if stopped_early {
            info!(dispatched, planned, "Stop requested, draining in-flight work");
        }

        drop(job_tx);
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "Worker task failed");
            }
        }

        let summary = ScheduleSummary {
            planned,
            dispatched,
            peak_workers: pool.peak.load(Ordering::SeqCst),
            max_lag,
            elapsed: start.elapsed(),
            stopped_early,
        };
        info!(
            dispatched = summary.dispatched,
            peak_workers = summary.peak_workers,
            max_lag_ms = summary.max_lag.as_secs_f64() * 1_000.0,
            elapsed_secs = summary.elapsed.as_secs_f64(),
            "Arrival scheduler finished"
        );
        summary
    }

    fn spawn_worker<F, Fut>(
        &self,
        workers: &mut JoinSet<()>,
        job_rx: &Arc<Mutex<mpsc::Receiver<Job>>>,
        work: &Arc<F>,
        pool: &Arc<PoolState>,
    ) where
        F: Fn(Dispatch) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        pool.add_worker();
        let guard = LiveGuard(Arc::clone(pool));
        let job_rx = Arc::clone(job_rx);
        let work = Arc::clone(work);
        let pool = Arc::clone(pool);
        let pacing = self.config.pacing;

        workers.spawn(async move {
            let _guard = guard;
            loop {
                let job = {
                    let mut rx = job_rx.lock().await;
                    rx.recv().await
                };
                let Some(job) = job else { break };

                work(job.dispatch).await;
                if !pacing.is_zero() {
                    sleep(pacing).await;
                }

                // Become claimable before the slot is released
                pool.idle.fetch_add(1, Ordering::SeqCst);
                drop(job);
            }
        });
    }
}
