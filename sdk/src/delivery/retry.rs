//! Bounded retry with exponential backoff and jitter
//!
//! Only transport errors and outcomes the collector flagged as retryable are
//! attempted again. Success, partial failure and client-side total failure
//! return on the first attempt: those events already have a final verdict.

use crate::config::Config;
use crate::error::TransportError;
use crate::metrics;
use crate::transport::DeliveryOutcome;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Backoff configuration
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Total attempts per batch, including the first (min 1)
    pub max_attempts: u32,
    /// Delay after the first failed attempt
    pub initial_delay: Duration,
    /// Cap for any single delay
    pub max_delay: Duration,
    /// Delay is scaled by a random factor in `[1 - jitter, 1 + jitter]`
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter: 0.5,
        }
    }
}

impl From<&Config> for BackoffConfig {
    fn from(config: &Config) -> Self {
        Self {
            max_attempts: config.max_retries,
            initial_delay: config.backoff_base,
            max_delay: config.backoff_max,
            jitter: config.jitter,
        }
    }
}

impl BackoffConfig {
    /// Delay before attempt `attempt + 1`, without jitter
    ///
    /// `initial_delay * 2^(attempt - 1)`, capped at `max_delay`.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.initial_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    /// Delay before attempt `attempt + 1`, with jitter applied
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        let jitter = self.jitter.clamp(0.0, 1.0);
        if jitter == 0.0 || base.is_zero() {
            return base;
        }

        let factor = rand::thread_rng().gen_range((1.0 - jitter)..=(1.0 + jitter));
        // Out of range for a Duration only when far past the cap
        Duration::try_from_secs_f64(base.as_secs_f64() * factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Final result of a retried send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryOutcome {
    /// Last outcome observed
    pub outcome: DeliveryOutcome,
    /// Number of times the operation ran
    pub attempts: u32,
}

/// Runs one send operation until it succeeds, fails terminally, or runs
/// out of attempts
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    config: BackoffConfig,
}

impl RetryExecutor {
    pub fn new(config: BackoffConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BackoffConfig {
        &self.config
    }

    /// Run `operation` with retries
    ///
    /// Attempt numbering starts at 1. On a retryable result at the last
    /// attempt, the result is returned as is; a transport error becomes
    /// `DeliveryOutcome::TransportError`.
    pub async fn execute<F, Fut>(&self, mut operation: F) -> RetryOutcome
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<DeliveryOutcome, TransportError>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            metrics::try_record_attempt();

            let outcome = match operation().await {
                Ok(outcome) => outcome,
                Err(cause) => DeliveryOutcome::TransportError { cause },
            };

            if !outcome.is_retryable() || attempt >= max_attempts {
                return RetryOutcome {
                    outcome,
                    attempts: attempt,
                };
            }

            let delay = self.config.delay_for(attempt);
            warn!(
                attempt = attempt,
                max_attempts = max_attempts,
                delay_ms = delay.as_millis() as u64,
                outcome = outcome.label(),
                "send failed, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
