// Retry policy and circuit breaker for per-video load attempts.
//
// Exponential backoff with jitter and a max-delay cap; attempts are capped,
// and once the cap is reached the video goes permanently failed until an
// explicit user retry resets it.

use crate::config::RetryBackoffConfig;
use rand::RngExt;
use std::time::Duration;

/// Decides whether a failed load may be retried and with what delay.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum failed attempts before the circuit opens permanently.
    pub max_retries: u32,
    /// Base delay between attempts. Actual delay = base * 2^attempt + jitter.
    pub base_delay: Duration,
    /// Hard cap on the computed delay.
    pub max_delay: Duration,
    /// When true, adds random jitter of [0, base_delay/2) to avoid hammering
    /// a recovering source in lockstep.
    pub jitter: bool,
}

/// Outcome of applying the policy to one failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDecision {
    /// Record the failure as retriable with the updated attempt count.
    Retriable { retry_count: u32 },
    /// Open the circuit: no automatic retries from here on.
    Permanent,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff: &RetryBackoffConfig) -> Self {
        Self {
            max_retries,
            base_delay: backoff.base_delay,
            max_delay: backoff.max_delay,
            jitter: backoff.jitter,
        }
    }

    /// Compute the backoff delay preceding a re-attempt (0-indexed by the
    /// number of failures already recorded).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        // 2^attempt via checked shift so misconfigured attempts saturate
        // instead of overflowing.
        let multiplier = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        let exp_delay = self
            .base_delay
            .checked_mul(multiplier)
            .unwrap_or(self.max_delay);
        let capped = exp_delay.min(self.max_delay);

        if !self.jitter {
            return capped;
        }

        let jitter_range_ms = u64::try_from(self.base_delay.as_millis()).unwrap_or(u64::MAX) / 2;
        if jitter_range_ms == 0 {
            return capped;
        }

        let remaining_ms =
            u64::try_from(self.max_delay.saturating_sub(capped).as_millis()).unwrap_or(0);
        let jitter_limit_ms = jitter_range_ms.min(remaining_ms);
        if jitter_limit_ms == 0 {
            return capped;
        }

        let jitter_ms = rand::rng().random_range(0..jitter_limit_ms);
        (capped + Duration::from_millis(jitter_ms)).min(self.max_delay)
    }

    /// Apply the circuit-breaker rule to a failure.
    ///
    /// Retriable failures increment the count until `max_retries` is
    /// reached; the failure that finds the count already at the cap goes
    /// permanent with the count unchanged. Non-retryable errors open the
    /// circuit immediately.
    pub fn on_failure(&self, retryable: bool, retry_count: u32) -> FailureDecision {
        if retryable && retry_count < self.max_retries {
            FailureDecision::Retriable {
                retry_count: retry_count + 1,
            }
        } else {
            FailureDecision::Permanent
        }
    }
}
