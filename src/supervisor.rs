//! Supervised, paced execution of long-running background jobs.
//!
//! Each job runs in its own task. A failed cycle is logged and followed by a
//! bounded exponential backoff; it never terminates the process or touches
//! any other job. All jobs stop when the shared shutdown signal fires.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{interval, sleep, Interval, MissedTickBehavior};

// ---

/// Receiving side of the process-wide shutdown signal.
pub type Shutdown = watch::Receiver<bool>;

/// Create a shutdown signal pair. Send `true` to stop every job.
pub fn shutdown_channel() -> (watch::Sender<bool>, Shutdown) {
    watch::channel(false)
}

/// A unit of periodic background work.
#[async_trait]
pub trait Job: Send + Sync {
    /// Name used in log fields.
    fn name(&self) -> &'static str;

    /// Run one cycle, returning the number of rows it wrote.
    async fn run_cycle(&self) -> anyhow::Result<usize>;
}

/// How often a job starts a new cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pacing {
    /// Start the next cycle as soon as the previous one ends.
    FreeRunning,
    /// Start cycles at most once per period.
    Every(Duration),
}

impl Pacing {
    /// A zero period means free-running.
    pub fn from_period(period: Duration) -> Self {
        if period.is_zero() {
            Self::FreeRunning
        } else {
            Self::Every(period)
        }
    }
}

/// Tick source for a paced job.
enum Ticker {
    Free,
    Timed(Interval),
}

impl Ticker {
    fn new(pacing: Pacing) -> Self {
        // ---
        match pacing {
            Pacing::FreeRunning => Self::Free,
            Pacing::Every(period) => {
                let mut timer = interval(period);
                timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
                Self::Timed(timer)
            }
        }
    }

    async fn tick(&mut self) {
        // ---
        match self {
            Self::Free => tokio::task::yield_now().await,
            Self::Timed(timer) => {
                timer.tick().await;
            }
        }
    }
}

/// Bounded exponential backoff. Unlike a retry budget it never gives up:
/// the delay saturates at `max` and resets after the next success.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            attempt: 0,
        }
    }

    /// Delay before the next retry; advances the attempt counter.
    pub fn next_delay(&mut self) -> Duration {
        // ---
        let factor = 2u32.saturating_pow(self.attempt);
        let delay = self.initial.saturating_mul(factor).min(self.max);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

/// Resolve when shutdown is requested.
pub async fn wait_for_shutdown(shutdown: &mut Shutdown) {
    // ---
    loop {
        let requested = *shutdown.borrow_and_update();
        if requested || shutdown.changed().await.is_err() {
            return;
        }
    }
}

/// Wait for `signal` or for `task` to end, whichever comes first, then
/// request shutdown of everything else.
///
/// Returns the task's outcome if it ended first. Otherwise the task is still
/// running and should be awaited after shutdown.
pub async fn stop_on_first<S, T>(
    signal: S,
    task: &mut JoinHandle<T>,
    shutdown: &watch::Sender<bool>,
) -> Option<Result<T, JoinError>>
where
    S: Future<Output = ()>,
{
    // ---
    let ended = tokio::select! {
        _ = signal => None,
        outcome = task => Some(outcome),
    };
    if ended.is_some() {
        tracing::error!("Server task ended unexpectedly, shutting down");
    }
    shutdown.send(true).ok();
    ended
}

/// Drive `job` until shutdown, pacing cycles and backing off after failures.
///
/// Returns the number of successful cycles, mostly for tests.
pub async fn run_job<J>(job: &J, pacing: Pacing, mut backoff: Backoff, mut shutdown: Shutdown) -> u64
where
    J: Job + ?Sized,
{
    // ---
    let name = job.name();
    let mut ticker = Ticker::new(pacing);
    let mut completed: u64 = 0;

    tracing::info!(job = name, ?pacing, "Job started");

    loop {
        tokio::select! {
            biased;
            _ = wait_for_shutdown(&mut shutdown) => break,
            _ = ticker.tick() => {}
        }

        let outcome = tokio::select! {
            biased;
            _ = wait_for_shutdown(&mut shutdown) => break,
            outcome = job.run_cycle() => outcome,
        };

        match outcome {
            Ok(rows) => {
                completed += 1;
                if backoff.attempt() > 0 {
                    tracing::info!(job = name, "Job recovered after {} failed cycles", backoff.attempt());
                }
                backoff.reset();
                tracing::debug!(job = name, rows, cycle = completed, "Cycle complete");
            }
            Err(e) => {
                let delay = backoff.next_delay();
                tracing::warn!(
                    job = name,
                    attempt = backoff.attempt(),
                    delay_ms = delay.as_millis() as u64,
                    "Cycle failed: {:#}",
                    e
                );
                tokio::select! {
                    biased;
                    _ = wait_for_shutdown(&mut shutdown) => break,
                    _ = sleep(delay) => {}
                }
            }
        }
    }

    tracing::info!(job = name, cycles = completed, "Job stopped");
    completed
}
