//! Retry policy with capped exponential backoff

use crate::config::PipelineConfig;
use crate::crawler::FailureKind;
use std::time::Duration;

/// What to do after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep for `delay`, then try again
    Retry { delay: Duration },
    /// Stop and report the failure
    GiveUp,
}

/// Decides whether and when a failed item is retried
///
/// An item gets at most `max_retries + 1` attempts. Only retryable failure
/// kinds are retried. The delay before retry `n` (counting from 0) is
/// `base * 2^n`, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base: Duration,
    pub max: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base: Duration, max: Duration) -> Self {
        Self {
            max_retries,
            base,
            max,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            config.max_retries,
            config.backoff_base(),
            config.backoff_max(),
        )
    }

    /// Delay before the retry that follows `retries_so_far` earlier retries
    pub fn backoff_delay(&self, retries_so_far: u32) -> Duration {
        let factor = 2u32.saturating_pow(retries_so_far.min(31));
        self.base.saturating_mul(factor).min(self.max)
    }

    /// Decides the fate of an item whose latest attempt failed with `kind`
    pub fn decide(&self, kind: FailureKind, retries_so_far: u32) -> RetryDecision {
        if !kind.is_retryable() || retries_so_far >= self.max_retries {
            return RetryDecision::GiveUp;
        }
        RetryDecision::Retry {
            delay: self.backoff_delay(retries_so_far),
        }
    }
}
