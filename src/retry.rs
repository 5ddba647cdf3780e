//! Retry policy applied at the vendor-call boundary
//!
//! Reads are retried while the failure is transient. Writes are retried at most
//! once, and only when the failure proves the vendor did not apply the write.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use metrics::counter;
use rand::{Rng, thread_rng};
use tracing::warn;

/// Failure classification consulted by [`RetryPolicy::run`].
pub trait Retryable {
    /// Transient failure of an idempotent call.
    fn is_retryable(&self) -> bool;

    /// The call certainly had no effect on the remote side.
    fn confirmed_not_applied(&self) -> bool;

    /// Minimum wait requested by the remote side.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Read,
    Write,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Upper bound of the random extra delay, as a fraction of the backoff
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(4),
            jitter_factor: 0.1,
        }
    }
}

impl RetryPolicy {
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        max_delay: Duration,
        jitter_factor: f64,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            jitter_factor: jitter_factor.clamp(0.0, 1.0),
        }
    }

    /// Single attempt, no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (0-based): `base * 2^attempt`, capped, plus jitter.
    ///
    /// A remote `retry_after` raises the backoff but never past `max_delay`.
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let base = self.base_delay.as_secs_f64();
        let cap = self.max_delay.as_secs_f64();
        let mut backoff = (base * 2_f64.powi(attempt.min(30) as i32)).min(cap);

        if let Some(retry_after) = retry_after {
            backoff = backoff.max(retry_after.min(self.max_delay).as_secs_f64());
        }

        let jitter_span = self.jitter_factor * backoff;
        let jitter = if jitter_span > 0.0 {
            thread_rng().gen_range(0.0..jitter_span)
        } else {
            0.0
        };

        Duration::try_from_secs_f64(backoff + jitter).unwrap_or(self.max_delay)
    }

    fn attempts_for(&self, kind: CallKind) -> u32 {
        match kind {
            CallKind::Read => self.max_attempts,
            CallKind::Write => self.max_attempts.min(2),
        }
    }

    /// Run `call` under this policy.
    ///
    /// A failure whose `retry_after` exceeds `max_delay` is returned at once
    /// rather than waited out.
    pub async fn run<T, E, F, Fut>(
        &self,
        operation: &'static str,
        kind: CallKind,
        mut call: F,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + Display,
    {
        let max_attempts = self.attempts_for(kind);
        let mut attempt = 0;

        loop {
            let err = match call().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            attempt += 1;

            let may_retry = match kind {
                CallKind::Read => err.is_retryable(),
                CallKind::Write => err.confirmed_not_applied(),
            };
            if !may_retry || attempt >= max_attempts {
                return Err(err);
            }
            if let Some(retry_after) = err.retry_after()
                && retry_after > self.max_delay
            {
                warn!(
                    operation,
                    attempt,
                    retry_after_secs = retry_after.as_secs(),
                    max_delay_ms = self.max_delay.as_millis() as u64,
                    error = %err,
                    "Vendor asked to wait longer than the retry budget, giving up"
                );
                return Err(err);
            }

            let delay = self.delay_for(attempt - 1, err.retry_after());
            counter!("vendor_retries_total", "operation" => operation).increment(1);
            warn!(
                operation,
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Vendor call failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
