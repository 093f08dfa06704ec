//! Backoff policy and retry executor.
//!
//! Every retried operation builds a fresh [`Backoff`] from the handle's
//! [`RetryConfig`](crate::config::RetryConfig) and runs through [`retry`]. Waits grow
//! exponentially from `initial_interval` by `multiplier` (capped at `max_interval`, with
//! uniform jitter of `randomization_factor`), and retrying stops once the next wait would
//! push the total past `max_elapsed_time`.
//!
//! By default every driver error is reattempted, including non-transient ones such as
//! constraint violations. Setting `classify_errors` restricts reattempts to
//! [`DbError::Transient`] errors. Errors raised by the layer itself (see
//! [`DbError::is_permanent`]) are never reattempted.

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::config::RetryConfig;
use crate::db::context::Context;
use crate::db::errors::{DbError, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    pub(crate) initial_interval: Duration,
    pub(crate) multiplier: f64,
    pub(crate) randomization_factor: f64,
    pub(crate) max_interval: Duration,
    pub(crate) max_elapsed_time: Duration,
    pub(crate) classify_errors: bool,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for Backoff {
    fn from(config: &RetryConfig) -> Self {
        Backoff {
            initial_interval: config.initial_interval,
            multiplier: config.multiplier,
            randomization_factor: config.randomization_factor,
            max_interval: config.max_interval,
            max_elapsed_time: config.max_elapsed_time,
            classify_errors: config.classify_errors,
        }
    }
}

impl Backoff {
    pub fn max_elapsed_time(&self) -> Duration {
        self.max_elapsed_time
    }

    /// Un-jittered wait after the given (zero-based) failed attempt:
    /// `initial_interval * multiplier ^ attempt`, capped at `max_interval`
    pub fn interval(&self, attempt: u32) -> Duration {
        let exponential = self.initial_interval.as_secs_f64() * self.multiplier.powi(attempt.min(i32::MAX as u32) as i32);
        let capped = exponential.min(self.max_interval.as_secs_f64());
        if capped.is_finite() && capped > 0.0 {
            Duration::from_secs_f64(capped)
        } else {
            self.max_interval
        }
    }

    /// Spread `interval` uniformly over `interval * (1 ± randomization_factor)`
    pub fn jittered(&self, interval: Duration) -> Duration {
        if self.randomization_factor <= 0.0 {
            return interval;
        }
        let secs = interval.as_secs_f64();
        let delta = secs * self.randomization_factor.min(1.0);
        let jittered = (secs - delta) + rand::random::<f64>() * (2.0 * delta);
        Duration::from_secs_f64(jittered.max(0.0))
    }

    pub fn should_retry(&self, err: &DbError) -> bool {
        if err.is_permanent() {
            false
        } else if self.classify_errors {
            err.is_transient()
        } else {
            true
        }
    }
}

/// Run `op` until it succeeds, the backoff ceiling is reached, or `ctx` fires.
///
/// A fired context aborts both an in-flight attempt and a backoff sleep. Exhaustion returns
/// [`DbError::RetriesExhausted`] wrapping the last attempt's error; a non-retryable error is
/// returned as-is.
pub async fn retry<T, F, Fut>(ctx: &Context, backoff: &Backoff, operation: &'static str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let started = Instant::now();
    let mut attempts: u32 = 0;

    loop {
        if let Some(err) = ctx.err() {
            return Err(err);
        }

        attempts += 1;
        let outcome = tokio::select! {
            biased;
            err = ctx.done() => return Err(err),
            outcome = op() => outcome,
        };

        let err = match outcome {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !backoff.should_retry(&err) {
            return Err(err);
        }

        let wait = backoff.jittered(backoff.interval(attempts - 1));
        let elapsed = started.elapsed();
        if elapsed + wait > backoff.max_elapsed_time {
            return Err(DbError::RetriesExhausted {
                operation,
                attempts,
                elapsed,
                source: Box::new(err),
            });
        }

        debug!(
            operation,
            attempt = attempts,
            wait_ms = wait.as_millis() as u64,
            error = %err,
            "Attempt failed, backing off"
        );

        tokio::select! {
            biased;
            err = ctx.done() => return Err(err),
            _ = tokio::time::sleep(wait) => {}
        }
    }
}

/// Single attempt of `fut`, abandoned if `ctx` fires first
pub async fn once<T, Fut>(ctx: &Context, fut: Fut) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    if let Some(err) = ctx.err() {
        return Err(err);
    }
    tokio::select! {
        biased;
        err = ctx.done() => Err(err),
        outcome = fut => outcome,
    }
}
