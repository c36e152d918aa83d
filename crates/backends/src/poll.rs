//! Bounded exponential-backoff polling protocol for asynchronous jobs.
//!
//! The schedule is an explicit value type (attempt counter, current delay,
//! cap) rather than recursive delayed calls, so it can be unit-tested without
//! touching the wall clock. The async driver waits through an injected
//! [`Sleep`] implementation for the same reason.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

use chatforge_config::PollConfig;
use chatforge_core::{ImageBackend, ImageJob, PollStatus};

/// The backoff state machine: at most `max_attempts` attempts, delay applied
/// *before* each next attempt (never after the last), growing by
/// `backoff_factor` up to `max_delay`.
#[derive(Debug, Clone)]
pub struct PollSchedule {
    max_attempts: u32,
    attempt: u32,
    delay: Duration,
    factor: f64,
    max_delay: Duration,
}

impl PollSchedule {
    pub fn new(config: &PollConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            attempt: 1,
            delay: Duration::from_millis(config.initial_delay_ms),
            factor: config.backoff_factor,
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }

    /// The attempt currently being made (1-based).
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Advance to the next attempt, returning the delay to wait first.
    /// `None` when all attempts are exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= self.max_attempts {
            return None;
        }
        self.attempt += 1;
        let delay = self.delay;
        self.delay = self.delay.mul_f64(self.factor).min(self.max_delay);
        Some(delay)
    }
}

/// Suspension seam for the poll loop.
#[async_trait]
pub trait Sleep: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real waiting via the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleep;

#[async_trait]
impl Sleep for TokioSleep {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Drive the schedule against the backend until the job is ready or the
/// attempts are exhausted.
///
/// A transport error during a poll does not terminate the loop: the job may
/// still complete, so the error is treated as "not yet ready" and consumes
/// one attempt. Exhaustion returns `None`, which callers treat identically to
/// a submission failure.
pub async fn poll_until_ready<B, S>(
    backend: &B,
    job: &ImageJob,
    config: &PollConfig,
    sleeper: &S,
) -> Option<String>
where
    B: ImageBackend + ?Sized,
    S: Sleep + ?Sized,
{
    let mut schedule = PollSchedule::new(config);

    loop {
        match backend.check(job).await {
            Ok(PollStatus::Ready(url)) => {
                debug!(attempt = schedule.attempt(), url = %url, "Image ready");
                return Some(url);
            }
            Ok(PollStatus::Pending) => {
                debug!(attempt = schedule.attempt(), "Image not ready yet");
            }
            Err(e) => {
                // Transient by assumption; counts as an unready attempt.
                warn!(attempt = schedule.attempt(), error = %e, "Poll attempt failed");
            }
        }

        match schedule.next_delay() {
            Some(delay) => sleeper.sleep(delay).await,
            None => {
                warn!(
                    attempts = schedule.attempt(),
                    "Image polling exhausted all attempts"
                );
                return None;
            }
        }
    }
}
